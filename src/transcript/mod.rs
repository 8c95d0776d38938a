//! Live transcript assembly
//!
//! Streamed transcript fragments from the session are folded into an ordered
//! list of chat turns, one per uninterrupted stretch of speech by one side.

mod reconciler;

pub use reconciler::TranscriptReconciler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a chat turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Model,
}

/// One turn of the conversation, built up from streamed fragments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: Speaker,

    /// Accumulated text so far
    pub text: String,

    /// Whether the turn has been closed by a turn boundary
    pub complete: bool,

    /// When the first fragment of this turn arrived
    pub started_at: DateTime<Utc>,
}
