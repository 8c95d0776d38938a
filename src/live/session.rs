use super::messages::{LiveConfig, ServerMessage};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the live session transport
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("failed to connect to live service: {0}")]
    Connect(String),

    #[error("failed to send on live session: {0}")]
    Send(String),

    #[error("live session already closed")]
    Closed,
}

/// Everything the remote session can tell us, as one ordered event stream
#[derive(Debug)]
pub enum SessionEvent {
    /// The session is open and ready for audio
    Opened,
    /// A server payload arrived
    Message(ServerMessage),
    /// The transport failed
    Errored(String),
    /// The server or transport closed the session
    Closed,
}

/// Handle to an open live session
#[async_trait::async_trait]
pub trait LiveSession: Send + Sync {
    /// Send one block of raw little-endian 16-bit PCM audio
    async fn send_audio(&mut self, pcm: &[u8]) -> Result<(), LiveError>;

    /// Close the session (safe to call more than once)
    async fn close(&mut self) -> Result<(), LiveError>;
}

/// Opens live sessions against a remote speech service
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a session
    ///
    /// Events arrive on the returned channel, starting with `Opened` once
    /// the session is ready for audio.
    async fn open(
        &self,
        model: &str,
        config: LiveConfig,
    ) -> Result<(Box<dyn LiveSession>, mpsc::Receiver<SessionEvent>), LiveError>;
}
