use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::hub::Subscription;

/// Lifecycle event emitted by a speech recognizer
///
/// A recognizer produces one utterance per activation: `Start`, any number of
/// `PartialResults`, usually one `FinalResults`, then `End`. `Error` may arrive
/// at any point and ends the activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognizerEvent {
    /// The recognizer began listening
    Start,
    /// The current activation finished (user stop or natural end of utterance)
    End,
    /// The recognizer failed
    Error { message: String },
    /// Interim transcription, ordered by confidence
    PartialResults { candidates: Vec<String> },
    /// Finalized transcription for one utterance, ordered by confidence
    FinalResults { candidates: Vec<String> },
}

impl RecognizerEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            RecognizerEvent::Start => "start",
            RecognizerEvent::End => "end",
            RecognizerEvent::Error { .. } => "error",
            RecognizerEvent::PartialResults { .. } => "partial_results",
            RecognizerEvent::FinalResults { .. } => "final_results",
        }
    }
}

/// Options passed to the recognizer on every `start`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizerOptions {
    /// Ask the engine for interim results
    pub partial_results_enabled: bool,

    /// Maximum number of ranked candidates per result
    pub max_result_candidates: u32,

    /// Engine language model hint (e.g. "free_form", "web_search")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_model: Option<String>,

    /// Engine-specific options forwarded verbatim
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extras: serde_json::Map<String, serde_json::Value>,
}

impl Default for RecognizerOptions {
    fn default() -> Self {
        Self {
            partial_results_enabled: true,
            max_result_candidates: 5,
            language_model: Some("free_form".to_string()),
            extras: serde_json::Map::new(),
        }
    }
}

/// Speech recognizer adapter
///
/// Thin pass-through to an external recognition engine. Implementations own no
/// session state and never retry failed commands. Calling `start` while an
/// activation is already running is undefined; the session controller never
/// does so.
///
/// Implementations:
/// - NATS: external STT service over request/reply + event subject
/// - Loopback: in-process, driven by the host (tests, demos)
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// Begin one recognition activation
    async fn start(&self, locale: &str, options: &RecognizerOptions) -> Result<()>;

    /// Stop listening and deliver the final result
    async fn stop(&self) -> Result<()>;

    /// Stop listening and discard any result
    async fn cancel(&self) -> Result<()>;

    /// Install the single event subscription for this recognizer
    ///
    /// Any previously issued subscription is released first.
    fn subscribe(&self) -> Subscription;

    /// Get recognizer name for logging
    fn name(&self) -> &str;
}

/// Creates one recognizer per session
#[async_trait::async_trait]
pub trait RecognizerFactory: Send + Sync {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn Recognizer>>;
}
