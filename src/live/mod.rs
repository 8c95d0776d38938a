//! Remote live-session collaborator
//!
//! This module owns the wire schema of the generative speech service, the
//! connector/session trait seam, and the WebSocket implementation. The
//! session lifecycle controller consumes everything here through
//! `SessionEvent`s so that transport callbacks never leak upward.

pub mod messages;
pub mod session;
pub mod ws;

pub use messages::{ClientMessage, LiveConfig, ServerMessage};
pub use session::{LiveConnector, LiveError, LiveSession, SessionEvent};
pub use ws::WsConnector;
