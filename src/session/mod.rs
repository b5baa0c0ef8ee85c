//! Recording session management
//!
//! This module provides the [`SessionController`] that manages:
//! - Permission gating before the first recognizer start
//! - Automatic restarts in continuous mode
//! - The silence timeout that ends a continuous session
//! - Transcript accumulation and session statistics

mod callbacks;
mod config;
mod controller;
mod machine;
mod state;
mod stats;

pub use callbacks::{Notification, SessionCallbacks};
pub use config::SessionConfig;
pub use controller::SessionController;
pub use state::{SessionMode, SessionSnapshot, SessionState};
pub use stats::SessionStats;
