//! Full-duplex voice conversation with the waiter model.
//!
//! A [`VoiceSession`] pumps microphone blocks up the live stream while a
//! second task consumes typed events coming back down: synthesized audio is
//! scheduled gaplessly, transcript deltas accumulate until a turn completes,
//! tool calls mutate the cart mid-stream, and a barge-in wipes any audio the
//! user talked over.

pub mod playback;

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info, warn};

use crate::cart::{resolve_function_calls, CartSink};
use crate::prompt::system_instruction;
use crate::transcript::SharedTranscript;
use crate::voice::playback::{PlaybackScheduler, PlaybackSink};
use nexspice_types::audio::{
    Base64EncodedAudioBytes, CAPTURE_SAMPLE_RATE_HZ, PLAYBACK_SAMPLE_RATE_HZ,
};
use nexspice_types::tools::add_to_cart_declaration;
use nexspice_types::{ClientEvent, FunctionResponse, LiveEvent, Menu, SessionSetup};
use nexspice_utils::audio::{decode_base64, deframe_pcm16, encode_base64, frame_pcm16};

/// A microphone feed delivering fixed-size blocks of float samples.
///
/// Dropping the stream closes the channel; the producing side treats a failed
/// send as the signal to release the device.
pub struct CaptureStream {
    samples: mpsc::Receiver<Vec<f32>>,
}

impl CaptureStream {
    pub fn new(samples: mpsc::Receiver<Vec<f32>>) -> Self {
        Self { samples }
    }

    pub async fn next_block(&mut self) -> Option<Vec<f32>> {
        self.samples.recv().await
    }
}

/// Opens platform audio endpoints at the rates the stream requires. Capture
/// and playback run at different rates because speech recognition input and
/// synthesis output use different formats.
pub trait AudioIo: Send + Sync {
    fn open_capture(&self, sample_rate: u32) -> anyhow::Result<CaptureStream>;

    fn open_playback(&self, sample_rate: u32) -> anyhow::Result<Box<dyn PlaybackSink>>;
}

/// One frame queued toward the live stream's writer.
#[derive(Debug, Clone)]
pub enum OutboundFrame {
    Event(ClientEvent),
    Close,
}

/// Cheap, clonable sender half of an open live stream.
#[derive(Clone)]
pub struct LiveHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl LiveHandle {
    pub fn new(tx: mpsc::Sender<OutboundFrame>) -> Self {
        Self { tx }
    }

    pub async fn send_audio(&self, data: Base64EncodedAudioBytes) -> anyhow::Result<()> {
        self.tx
            .send(OutboundFrame::Event(ClientEvent::audio(
                data,
                CAPTURE_SAMPLE_RATE_HZ,
            )))
            .await
            .map_err(|_| anyhow!("live stream is closed"))
    }

    pub async fn send_tool_responses(
        &self,
        responses: Vec<FunctionResponse>,
    ) -> anyhow::Result<()> {
        self.tx
            .send(OutboundFrame::Event(ClientEvent::tool_response(responses)))
            .await
            .map_err(|_| anyhow!("live stream is closed"))
    }

    /// Queues a polite close. Never waits; teardown does not depend on it.
    pub fn close(&self) {
        let _ = self.tx.try_send(OutboundFrame::Close);
    }
}

/// An open live stream: a handle for outbound frames plus the inbound events.
pub struct LiveConnection {
    pub handle: LiveHandle,
    pub events: mpsc::Receiver<LiveEvent>,
}

/// Dials the realtime voice backend.
#[async_trait]
pub trait LiveBackend: Send + Sync {
    async fn open(&self, setup: SessionSetup) -> anyhow::Result<LiveConnection>;
}

/// The two in-progress transcript halves of the current voice turn. They grow
/// by appended deltas and empty out when the turn commits to the transcript.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialTranscripts {
    pub user: String,
    pub model: String,
}

type SharedPartials = Arc<Mutex<PartialTranscripts>>;

struct ActiveVoice {
    handle: LiveHandle,
    capture_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
}

/// Spoken ordering assistant over one live duplex stream.
pub struct VoiceSession {
    audio: Arc<dyn AudioIo>,
    backend: Arc<dyn LiveBackend>,
    menu: Arc<Menu>,
    cart: Arc<dyn CartSink>,
    transcript: SharedTranscript,
    model: String,
    voice: String,
    partials: SharedPartials,
    live: Arc<AtomicBool>,
    active: Option<ActiveVoice>,
}

impl VoiceSession {
    pub fn new<A, L>(
        audio: A,
        backend: L,
        menu: Arc<Menu>,
        cart: Arc<dyn CartSink>,
        transcript: SharedTranscript,
        model: impl Into<String>,
        voice: impl Into<String>,
    ) -> Self
    where
        A: AudioIo + 'static,
        L: LiveBackend + 'static,
    {
        Self {
            audio: Arc::new(audio),
            backend: Arc::new(backend),
            menu,
            cart,
            transcript,
            model: model.into(),
            voice: voice.into(),
            partials: Arc::new(Mutex::new(PartialTranscripts::default())),
            live: Arc::new(AtomicBool::new(false)),
            active: None,
        }
    }

    /// Acquires both audio endpoints, opens the stream, and spawns the two
    /// pump tasks. A previous session is stopped first, so its devices are
    /// released before new ones are requested. On any failure everything
    /// acquired so far is dropped and no partial session remains.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.active.is_some() {
            self.stop();
        }

        let capture = self.audio.open_capture(CAPTURE_SAMPLE_RATE_HZ)?;
        let sink = self.audio.open_playback(PLAYBACK_SAMPLE_RATE_HZ)?;

        let setup = SessionSetup::builder()
            .with_model(&self.model)
            .with_instructions(&system_instruction(&self.menu))
            .with_voice(&self.voice)
            .with_tools(vec![add_to_cart_declaration()])
            .with_input_transcription()
            .with_output_transcription()
            .build();
        let connection = self.backend.open(setup).await?;

        let scheduler = Arc::new(Mutex::new(PlaybackScheduler::new(sink)));
        let capture_task = tokio::spawn(pump_capture(capture, connection.handle.clone()));
        let event_task = tokio::spawn(run_events(EventPump {
            events: connection.events,
            handle: connection.handle.clone(),
            capture: capture_task.abort_handle(),
            scheduler: Arc::clone(&scheduler),
            partials: Arc::clone(&self.partials),
            transcript: Arc::clone(&self.transcript),
            menu: Arc::clone(&self.menu),
            cart: Arc::clone(&self.cart),
            live: Arc::clone(&self.live),
        }));

        self.active = Some(ActiveVoice {
            handle: connection.handle,
            capture_task,
            event_task,
            scheduler,
        });
        self.live.store(true, Ordering::SeqCst);
        info!(model = %self.model, "voice session is live");
        Ok(())
    }

    /// Tears the session down. Safe to call repeatedly and before any start:
    /// a session that is not running is left untouched.
    pub fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
        let Some(active) = self.active.take() else {
            return;
        };

        active.handle.close();
        active.capture_task.abort();
        active.event_task.abort();
        if let Ok(mut scheduler) = active.scheduler.lock() {
            scheduler.interrupt();
        }
        clear(&self.partials);
        info!("voice session stopped");
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Snapshot of the in-progress turn, for rendering live captions.
    pub fn partials(&self) -> PartialTranscripts {
        self.partials
            .lock()
            .map(|partials| partials.clone())
            .unwrap_or_default()
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reads capture blocks until the device or the stream goes away. Blocks are
/// quantized to PCM16 and shipped without waiting for any acknowledgment.
async fn pump_capture(mut capture: CaptureStream, handle: LiveHandle) {
    while let Some(block) = capture.next_block().await {
        let data = encode_base64(&frame_pcm16(&block));
        if handle.send_audio(data).await.is_err() {
            break;
        }
    }
    debug!("capture pump finished");
}

struct EventPump {
    events: mpsc::Receiver<LiveEvent>,
    handle: LiveHandle,
    capture: AbortHandle,
    scheduler: Arc<Mutex<PlaybackScheduler>>,
    partials: SharedPartials,
    transcript: SharedTranscript,
    menu: Arc<Menu>,
    cart: Arc<dyn CartSink>,
    live: Arc<AtomicBool>,
}

/// Consumes inbound events until the stream closes, then runs the same
/// teardown an explicit stop would.
async fn run_events(mut pump: EventPump) {
    while let Some(event) = pump.events.recv().await {
        match event {
            LiveEvent::Audio(data) => match decode_base64(&data) {
                Ok(frame) => {
                    let buffer = deframe_pcm16(&frame, PLAYBACK_SAMPLE_RATE_HZ, 1);
                    if let Ok(mut scheduler) = pump.scheduler.lock() {
                        scheduler.schedule(buffer);
                    }
                }
                Err(err) => warn!("skipping an undecodable audio chunk: {err}"),
            },
            LiveEvent::OutputTranscript(delta) => {
                if let Ok(mut partials) = pump.partials.lock() {
                    partials.model.push_str(&delta);
                }
            }
            LiveEvent::InputTranscript(delta) => {
                if let Ok(mut partials) = pump.partials.lock() {
                    partials.user.push_str(&delta);
                }
            }
            LiveEvent::TurnComplete => {
                let mut user = String::new();
                let mut model = String::new();
                if let Ok(mut partials) = pump.partials.lock() {
                    user = mem::take(&mut partials.user);
                    model = mem::take(&mut partials.model);
                }
                if let Ok(mut transcript) = pump.transcript.lock() {
                    transcript.push_turn(user, model);
                }
                debug!("voice turn committed to the transcript");
            }
            LiveEvent::ToolCall(calls) => {
                let responses =
                    resolve_function_calls(pump.menu.as_ref(), pump.cart.as_ref(), &calls);
                // Answer off to the side; audio keeps flowing meanwhile.
                let handle = pump.handle.clone();
                tokio::spawn(async move {
                    if handle.send_tool_responses(responses).await.is_err() {
                        warn!("tool results dropped; the stream is closing");
                    }
                });
            }
            LiveEvent::Interrupted => {
                info!("user barge-in; clearing scheduled playback");
                if let Ok(mut scheduler) = pump.scheduler.lock() {
                    scheduler.interrupt();
                }
            }
            LiveEvent::Closed { reason } => {
                match reason {
                    Some(reason) => info!("live stream closed: {reason}"),
                    None => info!("live stream closed"),
                }
                break;
            }
        }
    }

    // Mirror of stop() for streams that end on their own.
    pump.live.store(false, Ordering::SeqCst);
    pump.capture.abort();
    if let Ok(mut scheduler) = pump.scheduler.lock() {
        scheduler.interrupt();
    }
    clear(&pump.partials);
}

fn clear(partials: &SharedPartials) {
    if let Ok(mut partials) = partials.lock() {
        partials.user.clear();
        partials.model.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::cart_fn;
    use crate::transcript::Transcript;
    use nexspice_types::tools::ADD_TO_CART;
    use nexspice_types::{Dish, FunctionCall};
    use serde_json::json;

    #[derive(Default)]
    struct FakeSinkState {
        started: Vec<f64>,
        stopped: Vec<playback::SourceId>,
        next_id: playback::SourceId,
    }

    struct FakeSink(Arc<Mutex<FakeSinkState>>);

    impl PlaybackSink for FakeSink {
        fn now(&self) -> f64 {
            0.0
        }

        fn start(&mut self, _buffer: nexspice_utils::audio::AudioBuffer, at: f64) -> playback::SourceId {
            let mut state = self.0.lock().unwrap();
            state.next_id += 1;
            state.started.push(at);
            state.next_id
        }

        fn stop(&mut self, id: playback::SourceId) {
            self.0.lock().unwrap().stopped.push(id);
        }
    }

    struct FakeAudio {
        capture: Mutex<Option<CaptureStream>>,
        sink_state: Arc<Mutex<FakeSinkState>>,
        fail_capture: bool,
    }

    impl AudioIo for FakeAudio {
        fn open_capture(&self, _sample_rate: u32) -> anyhow::Result<CaptureStream> {
            if self.fail_capture {
                return Err(anyhow!("microphone permission denied"));
            }
            self.capture
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("capture already taken"))
        }

        fn open_playback(&self, _sample_rate: u32) -> anyhow::Result<Box<dyn PlaybackSink>> {
            Ok(Box::new(FakeSink(Arc::clone(&self.sink_state))))
        }
    }

    struct FakeLive {
        connection: Mutex<Option<LiveConnection>>,
    }

    #[async_trait]
    impl LiveBackend for FakeLive {
        async fn open(&self, setup: SessionSetup) -> anyhow::Result<LiveConnection> {
            assert_eq!(setup.model(), "models/test-live");
            self.connection
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("no connection scripted"))
        }
    }

    struct Harness {
        session: VoiceSession,
        blocks: mpsc::Sender<Vec<f32>>,
        events: mpsc::Sender<LiveEvent>,
        outbound: mpsc::Receiver<OutboundFrame>,
        sink_state: Arc<Mutex<FakeSinkState>>,
        transcript: SharedTranscript,
        added: Arc<Mutex<Vec<String>>>,
    }

    fn harness() -> Harness {
        let (blocks, block_rx) = mpsc::channel(16);
        let (events, event_rx) = mpsc::channel(16);
        let (outbound_tx, outbound) = mpsc::channel(16);
        let sink_state = Arc::new(Mutex::new(FakeSinkState::default()));
        let audio = FakeAudio {
            capture: Mutex::new(Some(CaptureStream::new(block_rx))),
            sink_state: Arc::clone(&sink_state),
            fail_capture: false,
        };
        let live = FakeLive {
            connection: Mutex::new(Some(LiveConnection {
                handle: LiveHandle::new(outbound_tx),
                events: event_rx,
            })),
        };
        let added = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&added);
        let cart: Arc<dyn CartSink> = Arc::new(cart_fn(move |dish: &Dish| {
            log.lock().unwrap().push(dish.name().to_string())
        }));
        let transcript = Transcript::shared();
        let session = VoiceSession::new(
            audio,
            live,
            Arc::new(Menu::standard()),
            cart,
            Arc::clone(&transcript),
            "models/test-live",
            "Charon",
        );
        Harness {
            session,
            blocks,
            events,
            outbound,
            sink_state,
            transcript,
            added,
        }
    }

    async fn settled(condition: impl Fn() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never settled");
    }

    #[tokio::test]
    async fn capture_blocks_go_out_framed_and_encoded() {
        let mut harness = harness();
        harness.session.start().await.unwrap();

        let block = vec![0.0_f32, 0.5, -0.5, 1.0];
        harness.blocks.send(block.clone()).await.unwrap();

        let frame = match harness.outbound.recv().await {
            Some(OutboundFrame::Event(event)) => serde_json::to_value(&event).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        };
        let media = &frame["realtimeInput"]["media"];
        assert_eq!(media["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(media["data"], encode_base64(&frame_pcm16(&block)));
    }

    #[tokio::test]
    async fn inbound_audio_is_scheduled_in_arrival_order() {
        let mut harness = harness();
        harness.session.start().await.unwrap();

        let chunk = encode_base64(&frame_pcm16(&vec![0.25_f32; 2_400]));
        harness.events.send(LiveEvent::Audio(chunk.clone())).await.unwrap();
        harness.events.send(LiveEvent::Audio(chunk)).await.unwrap();

        let state = Arc::clone(&harness.sink_state);
        settled(|| state.lock().unwrap().started.len() == 2).await;
        let started = state.lock().unwrap().started.clone();
        assert!(started[1] >= started[0] + 0.1);
    }

    #[tokio::test]
    async fn transcript_deltas_accumulate_until_turn_complete() {
        let mut harness = harness();
        harness.session.start().await.unwrap();

        harness.events.send(LiveEvent::InputTranscript("two garlic ".into())).await.unwrap();
        harness.events.send(LiveEvent::InputTranscript("naan".into())).await.unwrap();
        harness.events.send(LiveEvent::OutputTranscript("Right ".into())).await.unwrap();
        harness.events.send(LiveEvent::OutputTranscript("away!".into())).await.unwrap();

        let session = &harness.session;
        settled(|| session.partials().model == "Right away!").await;
        assert_eq!(session.partials().user, "two garlic naan");

        harness.events.send(LiveEvent::TurnComplete).await.unwrap();
        let transcript = Arc::clone(&harness.transcript);
        settled(move || transcript.lock().unwrap().len() == 2).await;

        let entries = harness.transcript.lock().unwrap().snapshot();
        assert_eq!(entries[0].text(), "two garlic naan");
        assert_eq!(entries[1].text(), "Right away!");
        assert_eq!(session.partials(), PartialTranscripts::default());
    }

    #[tokio::test]
    async fn mid_stream_tool_call_updates_cart_and_answers() {
        let mut harness = harness();
        harness.session.start().await.unwrap();

        harness
            .events
            .send(LiveEvent::ToolCall(vec![FunctionCall {
                id: Some("fc-1".to_string()),
                name: ADD_TO_CART.to_string(),
                args: json!({ "dishId": "12", "quantity": 2 }),
            }]))
            .await
            .unwrap();

        let added = Arc::clone(&harness.added);
        settled(move || added.lock().unwrap().len() == 2).await;
        assert_eq!(harness.added.lock().unwrap().as_slice(), ["Garlic Naan", "Garlic Naan"]);

        let frame = match harness.outbound.recv().await {
            Some(OutboundFrame::Event(event)) => serde_json::to_value(&event).unwrap(),
            other => panic!("unexpected frame: {other:?}"),
        };
        let response = &frame["toolResponse"]["functionResponses"][0];
        assert_eq!(response["id"], "fc-1");
        assert_eq!(response["response"]["result"], "Added 2 x Garlic Naan");
    }

    #[tokio::test]
    async fn barge_in_clears_everything_scheduled() {
        let mut harness = harness();
        harness.session.start().await.unwrap();

        let chunk = encode_base64(&frame_pcm16(&vec![0.25_f32; 2_400]));
        harness.events.send(LiveEvent::Audio(chunk.clone())).await.unwrap();
        harness.events.send(LiveEvent::Audio(chunk)).await.unwrap();
        let state = Arc::clone(&harness.sink_state);
        settled(|| state.lock().unwrap().started.len() == 2).await;

        harness.events.send(LiveEvent::Interrupted).await.unwrap();

        let state = Arc::clone(&harness.sink_state);
        settled(move || state.lock().unwrap().stopped.len() == 2).await;
        assert!(harness.session.is_live());
    }

    #[tokio::test]
    async fn closed_stream_runs_full_teardown() {
        let mut harness = harness();
        harness.session.start().await.unwrap();
        harness.events.send(LiveEvent::OutputTranscript("Hel".into())).await.unwrap();

        harness
            .events
            .send(LiveEvent::Closed { reason: Some("server hung up".into()) })
            .await
            .unwrap();

        let live = Arc::clone(&harness.session.live);
        settled(move || !live.load(Ordering::SeqCst)).await;
        assert_eq!(harness.session.partials(), PartialTranscripts::default());
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_safe_before_start() {
        let mut harness = harness();
        harness.session.stop();
        assert!(!harness.session.is_live());

        harness.session.start().await.unwrap();
        assert!(harness.session.is_live());

        harness.session.stop();
        harness.session.stop();
        assert!(!harness.session.is_live());
        assert!(matches!(harness.outbound.recv().await, Some(OutboundFrame::Close)));
    }

    #[tokio::test]
    async fn failed_device_open_leaves_no_partial_session() {
        let (_events, event_rx) = mpsc::channel(4);
        let (outbound_tx, _outbound) = mpsc::channel::<OutboundFrame>(4);
        let audio = FakeAudio {
            capture: Mutex::new(None),
            sink_state: Arc::new(Mutex::new(FakeSinkState::default())),
            fail_capture: true,
        };
        let live = FakeLive {
            connection: Mutex::new(Some(LiveConnection {
                handle: LiveHandle::new(outbound_tx),
                events: event_rx,
            })),
        };
        let cart: Arc<dyn CartSink> = Arc::new(cart_fn(|_dish: &Dish| {}));
        let mut session = VoiceSession::new(
            audio,
            live,
            Arc::new(Menu::standard()),
            cart,
            Transcript::shared(),
            "models/test-live",
            "Charon",
        );

        assert!(session.start().await.is_err());
        assert!(!session.is_live());
        assert!(session.active.is_none());
    }
}
