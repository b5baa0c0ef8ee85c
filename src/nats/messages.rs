use serde::{Deserialize, Serialize};

use crate::recognizer::{RecognizerEvent, RecognizerOptions};

/// Command sent to the STT service on `stt.control.<session_id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    pub session_id: String,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(flatten)]
    pub command: ControlCommand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Start {
        locale: String,
        options: RecognizerOptions,
    },
    Stop,
    Cancel,
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::Start { .. } => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Cancel => "cancel",
        }
    }
}

/// Reply to a [`ControlMessage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Recognizer event received from the STT service on `stt.event.<session_id>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMessage {
    pub session_id: String,
    pub timestamp: String,
    #[serde(flatten)]
    pub event: RecognizerEvent,
}

pub fn control_subject(session_id: &str) -> String {
    format!("stt.control.{}", session_id)
}

pub fn event_subject(session_id: &str) -> String {
    format!("stt.event.{}", session_id)
}
