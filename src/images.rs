//! Background generation of dish photos.
//!
//! Every menu renderer funnels through one [`ImageRequestQueue`]. The queue
//! memoizes finished images by dish name, keeps at most one backend call in
//! flight, and spaces calls out so a burst of UI requests cannot trip the
//! backend's rate limiter on its own.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::sync::{oneshot, Mutex};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use crate::prompt::{food_photo_prompt, IMAGE_ASPECT_RATIO};
use nexspice_utils::audio::encode_base64;

/// Pause after every completed backend call, successful or not.
const INTER_REQUEST_DELAY: Duration = Duration::from_secs(5);
/// Pause before retrying an item the backend rate-limited.
const RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(20);
/// Pause after giving up on an item.
const FAILURE_DELAY: Duration = Duration::from_secs(1);
/// Retries after the initial attempt, so a rate-limited item costs at most
/// four backend calls.
const MAX_RETRIES: u32 = 3;

/// A renderable image reference. Currently always a `data:` URI.
pub type ImageRef = String;

/// Raw image bytes as returned by a generation backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ImagePayload {
    pub fn to_image_ref(&self) -> ImageRef {
        format!("data:{};base64,{}", self.mime_type, encode_base64(&self.bytes))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The backend signalled 429 / resource exhaustion. Retried with backoff.
    #[error("image backend rate limited: {0}")]
    RateLimited(String),
    /// Anything else. Not retried.
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Generates one image for `prompt`. `Ok(None)` means the backend answered
    /// but produced no image, which is not an error.
    async fn generate(
        &self,
        prompt: &str,
        aspect_ratio: &str,
    ) -> Result<Option<ImagePayload>, ImageError>;
}

// pending -> retrying(n) -> resolved; resolution removes the item, so only
// the first two are ever stored.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ItemState {
    Pending,
    Retrying(u32),
}

impl ItemState {
    fn attempts_used(self) -> u32 {
        match self {
            ItemState::Pending => 0,
            ItemState::Retrying(n) => n,
        }
    }
}

struct PendingImage {
    key: String,
    description: String,
    state: ItemState,
    tx: oneshot::Sender<Option<ImageRef>>,
}

impl PendingImage {
    fn resolve(self, value: Option<ImageRef>) {
        // The caller may have stopped waiting; that is fine.
        let _ = self.tx.send(value);
    }
}

#[derive(Default)]
struct QueueState {
    cache: HashMap<String, ImageRef>,
    queue: VecDeque<PendingImage>,
    running: bool,
}

/// Serialized, memoizing front door to an [`ImageBackend`].
///
/// Requests are answered from the cache when possible; misses are queued in
/// arrival order and worked off by a single background task. A rate-limited
/// item stays at the front of the queue through its retries, so later items
/// wait rather than jump ahead.
#[derive(Clone)]
pub struct ImageRequestQueue {
    backend: Arc<dyn ImageBackend>,
    state: Arc<Mutex<QueueState>>,
}

impl ImageRequestQueue {
    pub fn new<B>(backend: B) -> Self
    where
        B: ImageBackend + 'static,
    {
        Self {
            backend: Arc::new(backend),
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    /// Resolves to a renderable image reference for `key`, or `None` when the
    /// backend has nothing to offer. Cached keys resolve without queueing.
    pub async fn request_image(&self, key: &str, description: &str) -> Option<ImageRef> {
        let rx = {
            let mut state = self.state.lock().await;
            if let Some(cached) = state.cache.get(key) {
                debug!("image cache hit for '{key}'");
                return Some(cached.clone());
            }

            let (tx, rx) = oneshot::channel();
            state.queue.push_back(PendingImage {
                key: key.to_string(),
                description: description.to_string(),
                state: ItemState::Pending,
                tx,
            });
            debug!("queued image request for '{key}' (depth {})", state.queue.len());

            if !state.running {
                state.running = true;
                let backend = Arc::clone(&self.backend);
                let shared = Arc::clone(&self.state);
                tokio::spawn(async move {
                    Self::drain(backend, shared).await;
                });
            }
            rx
        };

        rx.await.ok().flatten()
    }

    /// The single processor. Inspects the front item without popping it, so a
    /// retry keeps its place; exits once the queue is empty.
    async fn drain(backend: Arc<dyn ImageBackend>, shared: Arc<Mutex<QueueState>>) {
        loop {
            let (key, description) = {
                let mut state = shared.lock().await;
                let Some(front) = state.queue.front() else {
                    state.running = false;
                    return;
                };
                // An earlier item with the same key may have finished while
                // this one waited.
                if let Some(cached) = state.cache.get(&front.key).cloned() {
                    if let Some(item) = state.queue.pop_front() {
                        item.resolve(Some(cached));
                    }
                    continue;
                }
                (front.key.clone(), front.description.clone())
            };

            let prompt = food_photo_prompt(&key, &description);
            match backend.generate(&prompt, IMAGE_ASPECT_RATIO).await {
                Ok(Some(payload)) => {
                    let image_ref = payload.to_image_ref();
                    let mut state = shared.lock().await;
                    state.cache.insert(key.clone(), image_ref.clone());
                    if let Some(item) = state.queue.pop_front() {
                        item.resolve(Some(image_ref));
                    }
                    drop(state);
                    debug!("generated image for '{key}'");
                    sleep(INTER_REQUEST_DELAY).await;
                }
                Ok(None) => {
                    // "No image available" is a valid answer and is not
                    // memoized, so a later request may try again.
                    let mut state = shared.lock().await;
                    if let Some(item) = state.queue.pop_front() {
                        item.resolve(None);
                    }
                    drop(state);
                    debug!("backend returned no image for '{key}'");
                    sleep(INTER_REQUEST_DELAY).await;
                }
                Err(ImageError::RateLimited(detail)) => {
                    let mut state = shared.lock().await;
                    let Some(front) = state.queue.front_mut() else {
                        continue;
                    };
                    let used = front.state.attempts_used();
                    if used < MAX_RETRIES {
                        front.state = ItemState::Retrying(used + 1);
                        drop(state);
                        warn!(
                            "rate limited generating '{key}' ({detail}); retry {} of {MAX_RETRIES}",
                            used + 1
                        );
                        sleep(RATE_LIMIT_BACKOFF).await;
                    } else {
                        if let Some(item) = state.queue.pop_front() {
                            item.resolve(None);
                        }
                        drop(state);
                        warn!("giving up on image for '{key}' after {MAX_RETRIES} retries");
                        sleep(FAILURE_DELAY).await;
                    }
                }
                Err(err) => {
                    let mut state = shared.lock().await;
                    if let Some(item) = state.queue.pop_front() {
                        item.resolve(None);
                    }
                    drop(state);
                    warn!("image generation for '{key}' failed: {err:#}");
                    sleep(FAILURE_DELAY).await;
                }
            }
        }
    }
}
