//! HTTP API server for external control
//!
//! This module provides a REST API for controlling recording sessions:
//! - POST /sessions/start - Create and start a new session
//! - POST /sessions/:id/{start,stop,cancel,reset} - Forward a command
//! - GET /sessions/:id/status - Query session state and statistics
//! - GET /sessions/:id/transcript - Get accumulated transcript
//! - DELETE /sessions/:id - Tear a session down
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
