//! Concrete Gemini backends behind the session traits: REST `generateContent`
//! for text chat and dish photos, and the BidiGenerateContent WebSocket for
//! live voice.

mod chat;
mod image;
mod live;
mod rest;

pub use chat::GeminiChat;
pub use image::GeminiImages;
pub use live::GeminiLive;
