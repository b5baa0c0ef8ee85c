use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Whether recording is currently active
    pub is_recording: bool,

    /// When the last session was started, if ever
    pub started_at: Option<DateTime<Utc>>,

    /// Session duration in milliseconds (up to now while active)
    pub duration_ms: i64,

    /// Number of final results accepted
    pub utterance_count: usize,

    /// Number of automatic recognizer restarts
    pub restart_count: usize,

    /// Candidates of the last final result
    pub last_results: Vec<String>,
}
