//! PCM conversion between float samples and the 16-bit wire format

use base64::Engine;
use std::time::Duration;
use thiserror::Error;

/// Errors from PCM encoding/decoding
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed base64 payload: {0}")]
    MalformedPayload(String),

    #[error("truncated PCM payload: {0} bytes is not a whole number of samples")]
    TruncatedPayload(usize),
}

/// Decoded audio ready for playback scheduling
///
/// Samples are stored as one contiguous plane per channel. The remote service
/// sends mono, so multi-channel buffers only show up in tests.
#[derive(Debug, Clone)]
pub struct PlayableBuffer {
    planes: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PlayableBuffer {
    pub fn new(planes: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self { planes, sample_rate }
    }

    /// Number of channels
    pub fn channels(&self) -> u16 {
        self.planes.len() as u16
    }

    /// Samples per channel
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback duration at this buffer's sample rate
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }

    pub fn into_planes(self) -> Vec<Vec<f32>> {
        self.planes
    }
}

/// Convert float samples in [-1, 1] to little-endian 16-bit PCM bytes
///
/// Out-of-range samples are clamped, never wrapped.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32768.0) as i16)
        .flat_map(|v| v.to_le_bytes())
        .collect()
}

/// Decode a base64 audio payload into raw PCM bytes
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

/// Interpret little-endian 16-bit PCM bytes as a playable float buffer
///
/// Multi-channel input is expected plane-ordered, not interleaved.
pub fn decode_pcm16(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PlayableBuffer, CodecError> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::TruncatedPayload(bytes.len()));
    }

    let samples: Vec<f32> = bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32 / 32768.0)
        .collect();

    let channels = channels.max(1) as usize;
    if samples.len() % channels != 0 {
        return Err(CodecError::TruncatedPayload(bytes.len()));
    }

    if samples.is_empty() {
        return Ok(PlayableBuffer::new(vec![Vec::new(); channels], sample_rate));
    }

    let frames = samples.len() / channels;
    let planes: Vec<Vec<f32>> = samples.chunks(frames).map(|c| c.to_vec()).collect();

    Ok(PlayableBuffer::new(planes, sample_rate))
}
