//! Wires the sessions together behind the surface a front end consumes.
//!
//! The coordinator owns the chat session, the voice session, the image queue,
//! and the shared transcript. Its one policy decision is mutual exclusion:
//! text and voice both mutate the same cart, so entering either mode tears
//! the other down first.

use std::sync::Arc;

use tracing::debug;

use crate::cart::CartSink;
use crate::chat::{ChatError, ChatSession};
use crate::config::Config;
use crate::gemini::{GeminiChat, GeminiImages, GeminiLive};
use crate::images::{ImageRef, ImageRequestQueue};
use crate::prompt::WELCOME_TEXT;
use crate::transcript::{SharedTranscript, Transcript};
use crate::voice::{AudioIo, PartialTranscripts, VoiceSession};
use nexspice_types::{ChatMessage, Menu, Role};

pub struct SessionCoordinator {
    chat: ChatSession,
    voice: VoiceSession,
    images: ImageRequestQueue,
    transcript: SharedTranscript,
}

impl SessionCoordinator {
    /// Standard wiring: the static menu, the Gemini backends, and a fresh
    /// transcript opened with the waiter's greeting.
    pub fn new<A>(config: &Config, audio: A, cart: Arc<dyn CartSink>) -> Self
    where
        A: AudioIo + 'static,
    {
        let menu = Arc::new(Menu::standard());
        let transcript = Transcript::shared();
        let chat = ChatSession::new(
            GeminiChat::new(config),
            Arc::clone(&menu),
            Arc::clone(&cart),
            Arc::clone(&transcript),
        );
        let voice = VoiceSession::new(
            audio,
            GeminiLive::new(config),
            menu,
            cart,
            Arc::clone(&transcript),
            // The live stream wants the qualified resource name, unlike REST.
            format!("models/{}", config.live_model),
            config.voice.clone(),
        );
        let images = ImageRequestQueue::new(GeminiImages::new(config));
        Self::from_parts(chat, voice, images, transcript)
    }

    /// Assembles a coordinator from already-built sessions. The transcript
    /// must be the one both sessions append to.
    pub fn from_parts(
        chat: ChatSession,
        voice: VoiceSession,
        images: ImageRequestQueue,
        transcript: SharedTranscript,
    ) -> Self {
        if let Ok(mut transcript) = transcript.lock() {
            if transcript.is_empty() {
                transcript.push(Role::Model, WELCOME_TEXT);
            }
        }
        Self {
            chat,
            voice,
            images,
            transcript,
        }
    }

    /// Runs one text turn. Any live voice session is stopped first so the
    /// two modes never race over the cart.
    pub async fn send_text_turn(&mut self, text: &str) -> Result<(), ChatError> {
        if self.voice.is_live() {
            debug!("stopping voice before a text turn");
        }
        self.voice.stop();
        self.chat.send(text).await
    }

    /// Enters voice mode. A previous voice session is fully released before
    /// the new one acquires devices.
    pub async fn start_voice(&mut self) -> anyhow::Result<()> {
        self.voice.start().await
    }

    pub fn stop_voice(&mut self) {
        self.voice.stop();
    }

    pub fn is_voice_live(&self) -> bool {
        self.voice.is_live()
    }

    /// The in-progress halves of the current voice turn, for live captions.
    pub fn live_partials(&self) -> PartialTranscripts {
        self.voice.partials()
    }

    pub fn transcript(&self) -> SharedTranscript {
        Arc::clone(&self.transcript)
    }

    /// Ordered copy of the conversation so far.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.transcript
            .lock()
            .map(|transcript| transcript.snapshot())
            .unwrap_or_default()
    }

    /// Resolves a dish photo through the shared memoizing queue.
    pub async fn request_dish_image(&self, name: &str, description: &str) -> Option<ImageRef> {
        self.images.request_image(name, description).await
    }

    /// Idempotent teardown for mode exits and component shutdown.
    pub fn shutdown(&mut self) {
        self.voice.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::cart_fn;
    use crate::chat::{ChatTurn, Conversation, MockChatBackend, MockConversation};
    use crate::images::MockImageBackend;
    use crate::voice::{
        AudioIo, CaptureStream, LiveBackend, LiveConnection, LiveHandle, OutboundFrame,
    };
    use crate::voice::playback::{PlaybackSink, SourceId};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use nexspice_types::Dish;
    use nexspice_utils::audio::AudioBuffer;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct NullSink;

    impl PlaybackSink for NullSink {
        fn now(&self) -> f64 {
            0.0
        }

        fn start(&mut self, _buffer: AudioBuffer, _at: f64) -> SourceId {
            0
        }

        fn stop(&mut self, _id: SourceId) {}
    }

    struct FakeAudio {
        captures: Mutex<VecDeque<CaptureStream>>,
    }

    impl AudioIo for FakeAudio {
        fn open_capture(&self, _sample_rate: u32) -> anyhow::Result<CaptureStream> {
            self.captures
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("no capture scripted"))
        }

        fn open_playback(&self, _sample_rate: u32) -> anyhow::Result<Box<dyn PlaybackSink>> {
            Ok(Box::new(NullSink))
        }
    }

    struct FakeLive {
        connections: Mutex<VecDeque<LiveConnection>>,
    }

    #[async_trait]
    impl LiveBackend for FakeLive {
        async fn open(
            &self,
            _setup: nexspice_types::SessionSetup,
        ) -> anyhow::Result<LiveConnection> {
            self.connections
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| anyhow!("no connection scripted"))
        }
    }

    struct VoiceChannels {
        _blocks: mpsc::Sender<Vec<f32>>,
        _events: mpsc::Sender<nexspice_types::LiveEvent>,
        outbound: mpsc::Receiver<OutboundFrame>,
    }

    fn scripted_voice(count: usize) -> (FakeAudio, FakeLive, Vec<VoiceChannels>) {
        let mut captures = VecDeque::new();
        let mut connections = VecDeque::new();
        let mut channels = Vec::new();
        for _ in 0..count {
            let (block_tx, block_rx) = mpsc::channel(8);
            let (event_tx, event_rx) = mpsc::channel(8);
            let (outbound_tx, outbound_rx) = mpsc::channel(8);
            captures.push_back(CaptureStream::new(block_rx));
            connections.push_back(LiveConnection {
                handle: LiveHandle::new(outbound_tx),
                events: event_rx,
            });
            channels.push(VoiceChannels {
                _blocks: block_tx,
                _events: event_tx,
                outbound: outbound_rx,
            });
        }
        (
            FakeAudio {
                captures: Mutex::new(captures),
            },
            FakeLive {
                connections: Mutex::new(connections),
            },
            channels,
        )
    }

    fn coordinator(
        backend: MockChatBackend,
        audio: FakeAudio,
        live: FakeLive,
    ) -> SessionCoordinator {
        let menu = Arc::new(Menu::standard());
        let cart: Arc<dyn CartSink> = Arc::new(cart_fn(|_dish: &Dish| {}));
        let transcript = Transcript::shared();
        let chat = ChatSession::new(
            backend,
            Arc::clone(&menu),
            Arc::clone(&cart),
            Arc::clone(&transcript),
        );
        let voice = VoiceSession::new(
            audio,
            live,
            menu,
            cart,
            Arc::clone(&transcript),
            "models/test-live",
            "Charon",
        );
        let images = ImageRequestQueue::new(MockImageBackend::new());
        SessionCoordinator::from_parts(chat, voice, images, transcript)
    }

    #[tokio::test]
    async fn transcript_opens_with_the_greeting() {
        let (audio, live, _channels) = scripted_voice(0);
        let coordinator = coordinator(MockChatBackend::new(), audio, live);

        let messages = coordinator.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role(), Role::Model);
        assert_eq!(messages[0].text(), WELCOME_TEXT);
    }

    #[tokio::test]
    async fn text_turn_stops_a_live_voice_session() {
        let mut conversation = MockConversation::new();
        conversation.expect_send_text().times(1).returning(|_| {
            Ok(ChatTurn {
                text: Some("The Chicken Biryani is excellent.".to_string()),
                function_calls: vec![],
            })
        });
        let mut backend = MockChatBackend::new();
        backend
            .expect_start_conversation()
            .times(1)
            .return_once(move |_, _| Ok(Box::new(conversation) as Box<dyn Conversation>));
        let (audio, live, _channels) = scripted_voice(1);
        let mut coordinator = coordinator(backend, audio, live);

        coordinator.start_voice().await.unwrap();
        assert!(coordinator.is_voice_live());

        coordinator.send_text_turn("what do you recommend?").await.unwrap();

        assert!(!coordinator.is_voice_live());
        let messages = coordinator.messages();
        assert_eq!(messages.last().map(|message| message.text().to_string()),
            Some("The Chicken Biryani is excellent.".to_string()));
    }

    #[tokio::test]
    async fn starting_voice_again_releases_the_first_stream() {
        let (audio, live, mut channels) = scripted_voice(2);
        let mut coordinator = coordinator(MockChatBackend::new(), audio, live);

        coordinator.start_voice().await.unwrap();
        coordinator.start_voice().await.unwrap();
        assert!(coordinator.is_voice_live());

        // The first stream got a close frame and then lost all its senders.
        let mut first = channels.remove(0);
        assert!(matches!(first.outbound.recv().await, Some(OutboundFrame::Close)));
        assert!(first.outbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn teardown_is_idempotent_from_any_state() {
        let (audio, live, _channels) = scripted_voice(1);
        let mut coordinator = coordinator(MockChatBackend::new(), audio, live);

        coordinator.stop_voice();
        coordinator.shutdown();

        coordinator.start_voice().await.unwrap();
        coordinator.stop_voice();
        coordinator.stop_voice();
        coordinator.shutdown();
        assert!(!coordinator.is_voice_live());
    }
}
