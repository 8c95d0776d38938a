use thiserror::Error;
use tokio::sync::mpsc;

/// Sample rate for microphone capture (16kHz for speech input)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Samples per capture block submitted to the live session
pub const BLOCK_SAMPLES: usize = 4096;

/// Errors from capture backends
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Input device missing, unsupported, or permission denied
    #[error("audio input unavailable: {0}")]
    Unavailable(String),

    /// The capture stream failed after starting
    #[error("capture stream error: {0}")]
    Stream(String),
}

/// One block of captured audio (mono float samples)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Block duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Target sample rate in Hz
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Samples per emitted block
    pub block_samples: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: CAPTURE_SAMPLE_RATE, // speech input rate
            channels: 1,                      // mono
            block_samples: BLOCK_SAMPLES,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device
/// - File: read from a WAV file (for tests/batch processing)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive fixed-size audio blocks
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio (no-op when not capturing)
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        match source {
            CaptureSource::Microphone => {
                let backend = super::mic::MicBackend::new(config);
                Ok(Box::new(backend))
            }

            CaptureSource::File(path) => {
                let backend = super::file::FileBackend::new(path, config);
                Ok(Box::new(backend))
            }
        }
    }
}

/// Capture source type
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Microphone input
    Microphone,
    /// WAV file input (for tests/batch processing)
    File(String),
}
