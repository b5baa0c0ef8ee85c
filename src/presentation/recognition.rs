use std::sync::Arc;
use tokio::sync::watch;

use crate::error::SessionError;
use crate::permission::PermissionGate;
use crate::recognizer::Recognizer;
use crate::session::{
    SessionCallbacks, SessionConfig, SessionController, SessionSnapshot, SessionStats,
};

/// Subscribable session state plus its commands
pub struct VoiceRecognition {
    controller: SessionController,
}

impl VoiceRecognition {
    pub fn new(
        config: SessionConfig,
        recognizer: Arc<dyn Recognizer>,
        permissions: Arc<dyn PermissionGate>,
    ) -> Result<Self, SessionError> {
        Self::with_callbacks(config, recognizer, permissions, SessionCallbacks::default())
    }

    pub fn with_callbacks(
        config: SessionConfig,
        recognizer: Arc<dyn Recognizer>,
        permissions: Arc<dyn PermissionGate>,
        callbacks: SessionCallbacks,
    ) -> Result<Self, SessionError> {
        let controller = SessionController::new(config, recognizer, permissions, callbacks)?;
        Ok(Self { controller })
    }

    pub fn session_id(&self) -> &str {
        self.controller.session_id()
    }

    pub fn config(&self) -> &SessionConfig {
        self.controller.config()
    }

    /// Current state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    /// Watch every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.controller.subscribe()
    }

    pub fn stats(&self) -> SessionStats {
        self.controller.stats()
    }

    pub fn is_recording(&self) -> bool {
        self.controller.snapshot().is_recording
    }

    pub fn transcript(&self) -> String {
        self.controller.snapshot().transcript
    }

    pub fn last_error(&self) -> Option<String> {
        self.controller.snapshot().last_error
    }

    pub async fn start(&self) -> Result<(), SessionError> {
        self.controller.start().await
    }

    pub async fn stop(&self) -> Result<(), SessionError> {
        self.controller.stop().await
    }

    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.controller.cancel().await
    }

    pub fn reset(&self) {
        self.controller.reset()
    }

    /// Tear the session down; later commands fail with [`SessionError::TornDown`]
    pub fn shutdown(&self) -> bool {
        self.controller.shutdown()
    }
}
