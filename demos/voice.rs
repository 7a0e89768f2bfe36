//! Live voice ordering demo over the system microphone and speakers.
//!
//! Implements the session's audio seams on top of cpal. Capture runs on a
//! dedicated thread that resamples device blocks down to the wire rate;
//! playback mixes scheduled sources at sample offsets so stopping one on a
//! barge-in silences it on the next callback. Run with `--features devices`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use rubato::{FastFixedIn, Resampler};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing_subscriber::fmt::time::ChronoLocal;

use nexspice_assistant::cart::cart_fn;
use nexspice_assistant::voice::playback::{PlaybackSink, SourceId};
use nexspice_assistant::voice::{AudioIo, CaptureStream};
use nexspice_assistant::{Config, SessionCoordinator};
use nexspice_types::audio::CAPTURE_BLOCK_SAMPLES;
use nexspice_types::Role;
use nexspice_utils::audio::{create_resampler, split_for_chunks, AudioBuffer};
use nexspice_utils::device;

/// Frames per device callback, both directions.
const DEVICE_CHUNK_FRAMES: usize = 1024;
/// How often device threads poll for shutdown.
const DEVICE_POLL: Duration = Duration::from_millis(100);

/// Opens the host default devices. cpal streams are not `Send`, so each one
/// lives on its own thread and is torn down through a flag.
struct CpalAudio;

impl AudioIo for CpalAudio {
    fn open_capture(&self, sample_rate: u32) -> anyhow::Result<CaptureStream> {
        let (block_tx, block_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || capture_thread(sample_rate, block_tx, ready_tx));
        ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("capture thread died during setup"))??;
        Ok(CaptureStream::new(block_rx))
    }

    fn open_playback(&self, sample_rate: u32) -> anyhow::Result<Box<dyn PlaybackSink>> {
        let shared = Arc::new(SinkShared {
            frames: AtomicU64::new(0),
            sources: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let thread_shared = shared.clone();
        std::thread::spawn(move || playback_thread(thread_shared, ready_tx));
        let device_rate = ready_rx
            .recv()
            .map_err(|_| anyhow::anyhow!("playback thread died during setup"))??;
        let resampler = create_resampler(sample_rate as f64, device_rate as f64, DEVICE_CHUNK_FRAMES)?;
        Ok(Box::new(CpalSink {
            shared,
            device_rate,
            resampler,
            next_id: 0,
        }))
    }
}

fn capture_thread(
    target_rate: u32,
    blocks: mpsc::Sender<Vec<f32>>,
    ready: std::sync::mpsc::Sender<anyhow::Result<()>>,
) {
    let closed = Arc::new(AtomicBool::new(false));
    let callback_closed = closed.clone();

    let setup = (|| -> anyhow::Result<cpal::Stream> {
        let input = device::input_device(None)?;
        let default = input.default_input_config()?;
        let device_rate = default.sample_rate().0;
        let config = StreamConfig {
            channels: default.channels(),
            sample_rate: SampleRate(device_rate),
            buffer_size: BufferSize::Fixed(DEVICE_CHUNK_FRAMES as u32),
        };
        let channels = default.channels() as usize;
        let mut resampler =
            create_resampler(device_rate as f64, target_rate as f64, CAPTURE_BLOCK_SAMPLES)?;
        let mut pending: VecDeque<f32> = VecDeque::with_capacity(CAPTURE_BLOCK_SAMPLES * 2);

        let stream = input.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // Channel 0 only, the wire side is mono.
                for frame in data.chunks(channels) {
                    pending.push_back(frame[0]);
                }
                while pending.len() >= CAPTURE_BLOCK_SAMPLES {
                    let chunk: Vec<f32> = pending.drain(..CAPTURE_BLOCK_SAMPLES).collect();
                    match resampler.process(&[chunk], None) {
                        Ok(mut resampled) => {
                            let Some(block) = resampled.pop() else { continue };
                            match blocks.try_send(block) {
                                Ok(()) => {}
                                Err(TrySendError::Full(_)) => {
                                    tracing::warn!("capture backlog, dropping a block");
                                }
                                Err(TrySendError::Closed(_)) => {
                                    callback_closed.store(true, Ordering::Relaxed);
                                }
                            }
                        }
                        Err(err) => tracing::warn!("capture resample failed: {err}"),
                    }
                }
            },
            |err| tracing::error!("input stream error: {err}"),
            None,
        )?;
        stream.play()?;
        Ok(stream)
    })();

    match setup {
        Ok(stream) => {
            let _ = ready.send(Ok(()));
            while !closed.load(Ordering::Relaxed) {
                std::thread::sleep(DEVICE_POLL);
            }
            drop(stream);
            tracing::debug!("capture device released");
        }
        Err(err) => {
            let _ = ready.send(Err(err));
        }
    }
}

/// One scheduled buffer being mixed into the output callback.
struct PlayingSource {
    id: SourceId,
    start_frame: u64,
    samples: Vec<f32>,
}

struct SinkShared {
    /// Device frames rendered since the stream opened.
    frames: AtomicU64,
    sources: Mutex<Vec<PlayingSource>>,
    closed: AtomicBool,
}

/// Playback clock and source table backed by the output callback.
struct CpalSink {
    shared: Arc<SinkShared>,
    device_rate: u32,
    resampler: FastFixedIn<f32>,
    next_id: SourceId,
}

impl PlaybackSink for CpalSink {
    fn now(&self) -> f64 {
        self.shared.frames.load(Ordering::Relaxed) as f64 / self.device_rate as f64
    }

    fn start(&mut self, buffer: AudioBuffer, at: f64) -> SourceId {
        let mut samples = Vec::with_capacity(buffer.frames());
        if buffer.sample_rate() == self.device_rate {
            samples.extend_from_slice(buffer.channel(0));
        } else {
            for chunk in split_for_chunks(buffer.channel(0), self.resampler.input_frames_next()) {
                match self.resampler.process(&[chunk], None) {
                    Ok(mut resampled) => {
                        if let Some(channel) = resampled.pop() {
                            samples.extend(channel);
                        }
                    }
                    Err(err) => tracing::warn!("playback resample failed: {err}"),
                }
            }
        }

        self.next_id += 1;
        let id = self.next_id;
        let start_frame = (at * self.device_rate as f64).round() as u64;
        if let Ok(mut sources) = self.shared.sources.lock() {
            sources.push(PlayingSource {
                id,
                start_frame,
                samples,
            });
        }
        id
    }

    fn stop(&mut self, id: SourceId) {
        if let Ok(mut sources) = self.shared.sources.lock() {
            sources.retain(|source| source.id != id);
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Relaxed);
    }
}

fn playback_thread(shared: Arc<SinkShared>, ready: std::sync::mpsc::Sender<anyhow::Result<u32>>) {
    let setup = (|| -> anyhow::Result<(cpal::Stream, u32)> {
        let output = device::output_device(None)?;
        let default = output.default_output_config()?;
        let device_rate = default.sample_rate().0;
        let config = StreamConfig {
            channels: default.channels(),
            sample_rate: SampleRate(device_rate),
            buffer_size: BufferSize::Fixed(DEVICE_CHUNK_FRAMES as u32),
        };
        let channels = default.channels() as usize;
        let mix = shared.clone();

        let stream = output.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let base = mix.frames.load(Ordering::Relaxed);
                let frames = (data.len() / channels) as u64;
                if let Ok(mut sources) = mix.sources.lock() {
                    for (offset, frame) in data.chunks_mut(channels).enumerate() {
                        let tick = base + offset as u64;
                        let mut sample = 0.0f32;
                        for source in sources.iter() {
                            if tick < source.start_frame {
                                continue;
                            }
                            if let Some(value) = source.samples.get((tick - source.start_frame) as usize) {
                                sample += *value;
                            }
                        }
                        let sample = sample.clamp(-1.0, 1.0);
                        for slot in frame.iter_mut() {
                            *slot = sample;
                        }
                    }
                    let end = base + frames;
                    sources.retain(|source| source.start_frame + source.samples.len() as u64 > end);
                } else {
                    data.fill(0.0);
                }
                mix.frames.store(base + frames, Ordering::Relaxed);
            },
            |err| tracing::error!("output stream error: {err}"),
            None,
        )?;
        stream.play()?;
        Ok((stream, device_rate))
    })();

    match setup {
        Ok((stream, device_rate)) => {
            let _ = ready.send(Ok(device_rate));
            while !shared.closed.load(Ordering::Relaxed) {
                std::thread::sleep(DEVICE_POLL);
            }
            drop(stream);
            tracing::debug!("playback device released");
        }
        Err(err) => {
            let _ = ready.send(Err(err));
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv_override().ok();
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(ChronoLocal::rfc_3339())
        .init();

    println!("Capture devices:\n{}", device::describe_inputs()?);
    println!("Playback devices:\n{}", device::describe_outputs()?);

    let cart = Arc::new(cart_fn(|dish| println!("[cart] + {}", dish.name())));
    let mut coordinator = SessionCoordinator::new(&config, CpalAudio, cart);
    coordinator.start_voice().await?;
    println!("Listening. Speak to order; Ctrl-C hangs up.\n");

    let mut seen = coordinator.messages().len();
    let mut last_caption = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("Hanging up.");
                break;
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {
                let messages = coordinator.messages();
                for message in &messages[seen..] {
                    let speaker = match message.role() {
                        Role::User => "you",
                        Role::Model => "waiter",
                    };
                    println!("{speaker}> {}", message.text());
                }
                seen = messages.len();

                let partials = coordinator.live_partials();
                let caption = if !partials.model.is_empty() {
                    format!("waiter (speaking): {}", partials.model)
                } else if !partials.user.is_empty() {
                    format!("you (speaking): {}", partials.user)
                } else {
                    String::new()
                };
                if !caption.is_empty() && caption != last_caption {
                    println!("  {caption}");
                    last_caption = caption;
                }

                if !coordinator.is_voice_live() {
                    println!("Stream closed by the service.");
                    break;
                }
            }
        }
    }

    coordinator.shutdown();
    Ok(())
}
