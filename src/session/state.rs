use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a session treats successive utterances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    /// One utterance; the latest final result replaces the transcript
    #[default]
    OneShot,
    /// Restart after every utterance and accumulate the transcript
    Continuous,
}

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Not listening
    #[default]
    Idle,
    /// Permission check or recognizer `start` in progress
    Starting,
    /// Recognizer activation running
    Listening,
    /// Activation ended, automatic restart pending (continuous only)
    Restarting,
    /// Stop requested, waiting for the recognizer to finish
    Stopping,
    /// A failure ended the session
    Errored,
}

impl SessionState {
    /// Returns whether the session is in progress
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SessionState::Starting
                | SessionState::Listening
                | SessionState::Restarting
                | SessionState::Stopping
        )
    }

    /// Returns a human-readable description of the state
    pub fn description(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Starting => "Starting recognizer",
            SessionState::Listening => "Listening",
            SessionState::Restarting => "Restarting recognizer",
            SessionState::Stopping => "Stopping",
            SessionState::Errored => "Failed",
        }
    }
}

/// Observable view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub mode: SessionMode,
    pub state: SessionState,

    /// True from the first recognizer `Start` until the session ends
    pub is_recording: bool,

    /// Whether the session still intends to keep listening
    pub continue_listening: bool,

    /// Accumulated final text
    pub transcript: String,

    /// Latest interim text (first candidate)
    pub partial: String,

    /// All candidates of the latest partial result
    pub partial_results: Vec<String>,

    /// All candidates of the latest final result
    pub results: Vec<String>,

    /// Last error message observed
    pub last_error: Option<String>,

    /// When the session stops itself absent further speech (continuous only)
    pub silence_deadline: Option<DateTime<Utc>>,
}
