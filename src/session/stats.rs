use super::controller::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics for a voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Lifecycle state
    pub state: SessionState,

    /// Whether synthesized speech is currently queued or audible
    pub speaking: bool,

    /// When the current (or most recent) session started
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since the session started
    pub duration_secs: f64,

    /// Captured audio blocks sent to the live service
    pub blocks_sent: usize,

    /// Audio chunks played to completion
    pub chunks_played: usize,

    /// Turns in the transcript so far
    pub transcript_turns: usize,
}

impl SessionStats {
    /// Short status label for the UI
    pub fn status_text(&self) -> &'static str {
        match self.state {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Listening if self.speaking => "Speaking",
            SessionState::Listening => "Listening",
            SessionState::Error => "Error",
        }
    }
}
