use crate::audio::PlayableBuffer;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Sample rate for playback (matches the remote service's audio output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Errors from playback sinks and the scheduler
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Output device missing, unsupported, or not open
    #[error("audio output unavailable: {0}")]
    Unavailable(String),

    /// The output stream failed after opening
    #[error("playback stream error: {0}")]
    Stream(String),
}

/// Identifier for a scheduled playback source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timed audio output device
///
/// The sink owns the device clock. Sources begin at an absolute position on
/// that clock; natural ends are reported through the completion channel
/// handed out by `open`. Cancelled sources report nothing.
#[async_trait::async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Open the output device
    ///
    /// Returns a channel receiver for source completion events
    async fn open(&mut self) -> Result<mpsc::UnboundedReceiver<SourceId>, PlaybackError>;

    /// Close the output device (no-op when already closed)
    async fn close(&mut self) -> Result<(), PlaybackError>;

    /// Check if the device is open
    fn is_open(&self) -> bool;

    /// Current position of the device clock
    fn position(&self) -> Duration;

    /// Begin playing a source at an absolute clock position
    fn begin(
        &self,
        id: SourceId,
        buffer: PlayableBuffer,
        at: Duration,
    ) -> Result<(), PlaybackError>;

    /// Drop every pending and playing source
    fn cancel_all(&self);

    /// Get sink name for logging
    fn name(&self) -> &str;
}
