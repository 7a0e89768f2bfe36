pub mod cart;
pub mod chat;
pub mod config;
pub mod coordinator;
pub mod gemini;
pub mod images;
pub mod prompt;
pub mod transcript;
pub mod voice;

pub use nexspice_types as types;
pub use nexspice_utils as utils;

pub use cart::{cart_fn, CartSink, Catalog};
pub use chat::{ChatError, ChatSession};
pub use config::Config;
pub use coordinator::SessionCoordinator;
pub use images::{ImageRef, ImageRequestQueue};
pub use transcript::{SharedTranscript, Transcript};
pub use voice::{PartialTranscripts, VoiceSession};
