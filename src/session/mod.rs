//! Voice session lifecycle
//!
//! This module provides the `VoiceSession` controller that manages:
//! - Opening and closing the remote live session
//! - Microphone capture and audio block submission
//! - Gapless playback of synthesized replies
//! - Transcript accumulation
//! - Session statistics and state

mod config;
mod controller;
mod stats;

pub use config::{SessionConfig, VoiceOverrides};
pub use controller::{SessionState, VoiceSession};
pub use stats::SessionStats;
