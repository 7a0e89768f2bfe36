//! Gapless scheduling of synthesized audio chunks.
//!
//! Chunks arrive from the network out of lockstep with the output device, so
//! each one is scheduled to start at the later of "now" and the end of the
//! previous chunk. A running clock plus a set of tracked sources is all the
//! state needed to keep playback ordered and interruptible.

use nexspice_utils::audio::AudioBuffer;
use tracing::debug;

pub type SourceId = u64;

/// An output device that can play buffers at absolute clock times. The demo
/// binaries back this with a real device; tests use in-memory fakes.
pub trait PlaybackSink: Send {
    /// Seconds elapsed on the sink's monotonic playback clock.
    fn now(&self) -> f64;

    /// Begins playing `buffer` at clock time `at`, returning a stop handle.
    fn start(&mut self, buffer: AudioBuffer, at: f64) -> SourceId;

    /// Stops one source immediately. Unknown ids are ignored.
    fn stop(&mut self, id: SourceId);
}

struct ScheduledSource {
    id: SourceId,
    ends_at: f64,
}

/// Owns the "next start time" clock and every source still worth stopping.
pub struct PlaybackScheduler {
    sink: Box<dyn PlaybackSink>,
    next_start: f64,
    scheduled: Vec<ScheduledSource>,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn PlaybackSink>) -> Self {
        Self {
            sink,
            next_start: 0.0,
            scheduled: Vec::new(),
        }
    }

    /// Queues `buffer` directly behind whatever is already scheduled and
    /// returns the chosen start time. Sources that have finished playing are
    /// dropped from tracking here, so the set stays small.
    pub fn schedule(&mut self, buffer: AudioBuffer) -> f64 {
        let now = self.sink.now();
        self.scheduled.retain(|source| source.ends_at > now);

        let start = self.next_start.max(now);
        let duration = buffer.duration_seconds();
        let id = self.sink.start(buffer, start);
        self.scheduled.push(ScheduledSource {
            id,
            ends_at: start + duration,
        });
        self.next_start = start + duration;
        start
    }

    /// Stops every tracked source and rewinds the clock, so the next chunk
    /// plays immediately instead of behind audio the user talked over.
    pub fn interrupt(&mut self) {
        if !self.scheduled.is_empty() {
            debug!("stopping {} scheduled playback sources", self.scheduled.len());
        }
        for source in self.scheduled.drain(..) {
            self.sink.stop(source.id);
        }
        self.next_start = 0.0;
    }

    pub fn scheduled_count(&self) -> usize {
        self.scheduled.len()
    }

    pub fn next_start(&self) -> f64 {
        self.next_start
    }
}
