/// Audio data encoded as base64
pub type Base64EncodedAudioBytes = String;

/// Sample rate the microphone side of a live session captures at.
pub const CAPTURE_SAMPLE_RATE_HZ: u32 = 16_000;

/// Sample rate the model synthesizes speech at.
pub const PLAYBACK_SAMPLE_RATE_HZ: u32 = 24_000;

/// Number of samples in one captured block handed to the wire framer.
pub const CAPTURE_BLOCK_SAMPLES: usize = 4096;

/// Mime type for a raw PCM16 little-endian mono payload at `rate` Hz,
/// e.g. `audio/pcm;rate=16000`.
pub fn pcm_mime_type(rate: u32) -> String {
    format!("audio/pcm;rate={rate}")
}
