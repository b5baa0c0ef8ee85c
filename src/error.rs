use thiserror::Error;

/// Errors surfaced by a recording session
///
/// The `Display` text is what the session records as its last error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Microphone permission denied")]
    PermissionDenied,

    #[error("Failed to start recording: {0}")]
    RecognizerStart(String),

    #[error("{0}")]
    Recognizer(String),

    #[error("Failed to stop recording: {0}")]
    RecognizerStop(String),

    #[error("Failed to cancel recording: {0}")]
    RecognizerCancel(String),

    #[error("Invalid session config: {0}")]
    InvalidConfig(String),

    #[error("Session has been torn down")]
    TornDown,
}
