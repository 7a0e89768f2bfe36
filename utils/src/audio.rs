use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

/// Quantization step for 16-bit PCM framing. Capture multiplies by this and
/// playback divides by it, so a framed round trip stays within 1/32768.
const PCM16_SCALE: f32 = 32768.0;

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(text)
}

/// Converts float samples in [-1.0, 1.0] to little-endian PCM16 bytes.
/// Out-of-range input clamps instead of wrapping.
pub fn frame_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let quantized = (sample * PCM16_SCALE).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            quantized.to_le_bytes()
        })
        .collect()
}

/// Reconstructs per-channel float samples from interleaved little-endian
/// PCM16. A trailing odd byte is ignored, as is any partial final frame.
pub fn deframe_pcm16(frame: &[u8], sample_rate: u32, channel_count: usize) -> AudioBuffer {
    let channel_count = channel_count.max(1);
    let interleaved: Vec<f32> = frame
        .chunks_exact(2)
        .map(|chunk| {
            let v = i16::from_le_bytes([chunk[0], chunk[1]]);
            (v as f32 / PCM16_SCALE).clamp(-1.0, 1.0)
        })
        .collect();

    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame_idx in 0..frames {
        for (channel_idx, channel) in channels.iter_mut().enumerate() {
            channel.push(interleaved[frame_idx * channel_count + channel_idx]);
        }
    }
    AudioBuffer::new(channels, sample_rate)
}

/// Decoded, playback-ready audio: per-channel float samples plus the rate
/// they were synthesized at.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback length in seconds, the unit the scheduling clock runs in.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

pub fn create_resampler(in_sampling_rate: f64, out_sampling_rate: f64, chunk_size: usize) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

pub fn split_for_chunks(samples: &[f32], chunk_size: usize) -> Vec<Vec<f32>> {
    samples
        .chunks(chunk_size)
        .map(|chunk| {
            let mut chunk = chunk.to_vec();
            chunk.resize(chunk_size, 0.0);
            chunk
        })
        .collect()
}
