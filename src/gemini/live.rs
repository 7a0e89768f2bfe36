//! WebSocket backend for live voice, speaking BidiGenerateContent.
//!
//! `open` performs the setup handshake inline, then splits the socket into a
//! writer task fed by the session's [`LiveHandle`] and a reader task that
//! translates every server frame into ordered [`LiveEvent`]s. Both tasks end
//! on their own once the session drops its channel ends.

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::{Config, LIVE_WS_URL};
use crate::voice::{LiveBackend, LiveConnection, LiveHandle, OutboundFrame};
use nexspice_types::{ClientEvent, LiveEvent, ServerMessage, SessionSetup};

const CHANNEL_CAPACITY: usize = 64;

pub struct GeminiLive {
    api_key: SecretString,
}

impl GeminiLive {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl LiveBackend for GeminiLive {
    async fn open(&self, setup: SessionSetup) -> anyhow::Result<LiveConnection> {
        let url = format!("{LIVE_WS_URL}?key={}", self.api_key.expose_secret());
        let (ws_stream, _) = tokio_tungstenite::connect_async(url)
            .await
            .context("could not reach the live endpoint")?;
        let (mut write, mut read) = ws_stream.split();

        let setup_frame = serde_json::to_string(&ClientEvent::Setup(setup))?;
        write
            .send(Message::Text(setup_frame))
            .await
            .context("could not send the session setup")?;

        // The server acknowledges setup before any media may flow.
        loop {
            let message = read
                .next()
                .await
                .context("stream ended before setup was acknowledged")??;
            let parsed = match &message {
                Message::Text(text) => Some(serde_json::from_str::<ServerMessage>(text)),
                Message::Binary(bytes) => Some(serde_json::from_slice::<ServerMessage>(bytes)),
                Message::Close(_) => bail!("live stream closed during setup"),
                _ => None,
            };
            match parsed {
                Some(Ok(message)) if message.setup_complete.is_some() => break,
                Some(Ok(message)) => debug!("ignoring pre-setup frame: {message:?}"),
                Some(Err(err)) => warn!("unparseable frame during setup: {err}"),
                None => {}
            }
        }
        info!("live session setup acknowledged");

        let (out_tx, mut out_rx) = mpsc::channel::<OutboundFrame>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                match frame {
                    OutboundFrame::Event(event) => match serde_json::to_string(&event) {
                        Ok(text) => {
                            if let Err(err) = write.send(Message::Text(text)).await {
                                error!("failed to send a live frame: {err}");
                                break;
                            }
                        }
                        Err(err) => error!("failed to serialize a live frame: {err}"),
                    },
                    OutboundFrame::Close => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                }
            }
            debug!("live writer finished");
        });

        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let message = match message {
                    Ok(message) => message,
                    Err(err) => {
                        error!("live socket error: {err}");
                        let _ = event_tx
                            .send(LiveEvent::Closed {
                                reason: Some(err.to_string()),
                            })
                            .await;
                        return;
                    }
                };
                let parsed = match message {
                    Message::Text(text) => serde_json::from_str::<ServerMessage>(&text),
                    Message::Binary(bytes) => serde_json::from_slice::<ServerMessage>(&bytes),
                    Message::Close(frame) => {
                        let reason = frame.map(|frame| frame.reason.to_string());
                        let _ = event_tx.send(LiveEvent::Closed { reason }).await;
                        return;
                    }
                    _ => continue,
                };
                match parsed {
                    Ok(message) => {
                        for event in message.into_events() {
                            if event_tx.send(event).await.is_err() {
                                // The session hung up; no one is listening.
                                return;
                            }
                        }
                    }
                    Err(err) => error!("failed to parse a live frame: {err}"),
                }
            }
            let _ = event_tx.send(LiveEvent::Closed { reason: None }).await;
            debug!("live reader finished");
        });

        Ok(LiveConnection {
            handle: LiveHandle::new(out_tx),
            events: event_rx,
        })
    }
}
