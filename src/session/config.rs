use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::state::SessionMode;
use crate::error::SessionError;
use crate::recognizer::RecognizerOptions;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "session-<uuid>")
    pub session_id: String,

    /// Recognition locale
    /// Default: "en-US"
    pub locale: String,

    /// Whether to request interim results from the recognizer
    pub enable_partial_results: bool,

    /// Keep listening across utterances and stitch them into one transcript
    pub continuous: bool,

    /// Silence after which a continuous session stops itself
    /// Default: 5 seconds
    pub max_silence_duration: Duration,

    /// Grace period between a recognizer `End` and the automatic restart
    /// Default: 100ms
    pub restart_delay: Duration,

    /// Start the session as soon as it is constructed
    pub auto_start: bool,

    /// Ranked candidates requested per result
    pub max_result_candidates: u32,

    /// Language model hint forwarded to the recognizer
    pub language_model: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            locale: "en-US".to_string(),
            enable_partial_results: true,
            continuous: false,
            max_silence_duration: Duration::from_millis(5000),
            restart_delay: Duration::from_millis(100),
            auto_start: false,
            max_result_candidates: 5,
            language_model: Some("free_form".to_string()),
        }
    }
}

impl SessionConfig {
    /// Continuous session with the given silence timeout
    pub fn continuous(max_silence_duration: Duration) -> Self {
        Self {
            continuous: true,
            max_silence_duration,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SessionMode {
        if self.continuous {
            SessionMode::Continuous
        } else {
            SessionMode::OneShot
        }
    }

    /// Options sent with every recognizer `start`
    pub fn recognizer_options(&self) -> RecognizerOptions {
        RecognizerOptions {
            partial_results_enabled: self.enable_partial_results,
            max_result_candidates: self.max_result_candidates,
            language_model: self.language_model.clone(),
            extras: serde_json::Map::new(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.locale.trim().is_empty() {
            return Err(SessionError::InvalidConfig("locale is empty".to_string()));
        }
        if self.max_result_candidates == 0 {
            return Err(SessionError::InvalidConfig(
                "max_result_candidates must be at least 1".to_string(),
            ));
        }
        if self.continuous && self.max_silence_duration.is_zero() {
            return Err(SessionError::InvalidConfig(
                "max_silence_duration must be positive in continuous mode".to_string(),
            ));
        }
        Ok(())
    }
}
