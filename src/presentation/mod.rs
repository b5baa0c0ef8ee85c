//! Host-facing forms of a session
//!
//! Both adapters forward commands to a [`SessionController`](crate::session::SessionController)
//! and surface its snapshot; neither holds session logic of its own.
//! Dropping either one tears the underlying session down exactly once.

mod microphone;
mod recognition;

pub use microphone::{MicrophoneControls, MicrophoneProps, VoiceMicrophone};
pub use recognition::VoiceRecognition;
