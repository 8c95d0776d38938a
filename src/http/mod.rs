//! HTTP API server for external control (browser UI)
//!
//! This module provides a REST API for controlling the voice session:
//! - POST /session/start - Start a conversation (optional voice overrides)
//! - POST /session/stop - Stop the conversation
//! - GET /session/status - Query session state and counters
//! - GET /session/transcript - Get the accumulated transcript
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
