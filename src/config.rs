//! Environment-driven configuration for the assistant core.
//!
//! Everything is loaded once through [`Config::from_env`] and passed by
//! value to the backend constructors; the API key never leaves its
//! [`SecretString`] wrapper until a request is built.

use std::env;

use secrecy::SecretString;
use tracing::Level;

// --- Application Constants ---

/// REST endpoint root shared by the chat and image backends.
pub const REST_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
/// WebSocket endpoint for the live voice stream.
pub const LIVE_WS_URL: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

pub const DEFAULT_CHAT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_LIVE_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";
pub const DEFAULT_VOICE: &str = "Charon";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: SecretString,
    pub chat_model: String,
    pub image_model: String,
    pub live_model: String,
    pub voice: String,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// * `GEMINI_API_KEY`: Your secret key for the Gemini API. Required.
    /// * `CHAT_MODEL`: (Optional) Model for text turns.
    /// * `IMAGE_MODEL`: (Optional) Model for dish-image generation.
    /// * `LIVE_MODEL`: (Optional) Model for the live voice stream.
    /// * `ASSISTANT_VOICE`: (Optional) Prebuilt voice name for synthesis.
    /// * `RUST_LOG`: (Optional) Logging level, defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env if present; ignored in production environments.
        dotenvy::dotenv().ok();

        let api_key = env::var("GEMINI_API_KEY")
            .map(SecretString::from)
            .map_err(|_| ConfigError::MissingVar("GEMINI_API_KEY".to_string()))?;

        let chat_model = env::var("CHAT_MODEL").unwrap_or_else(|_| DEFAULT_CHAT_MODEL.to_string());
        let image_model = env::var("IMAGE_MODEL").unwrap_or_else(|_| DEFAULT_IMAGE_MODEL.to_string());
        let live_model = env::var("LIVE_MODEL").unwrap_or_else(|_| DEFAULT_LIVE_MODEL.to_string());
        let voice = env::var("ASSISTANT_VOICE").unwrap_or_else(|_| DEFAULT_VOICE.to_string());

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_key,
            chat_model,
            image_model,
            live_model,
            voice,
            log_level,
        })
    }

    /// Construction for tests and embedders that configure in code.
    pub fn with_api_key(api_key: &str) -> Self {
        Self {
            api_key: SecretString::from(api_key.to_string()),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            live_model: DEFAULT_LIVE_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            log_level: Level::INFO,
        }
    }
}
