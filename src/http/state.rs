use crate::permission::PermissionGate;
use crate::presentation::VoiceRecognition;
use crate::recognizer::RecognizerFactory;
use crate::session::SessionConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Live sessions (session_id → session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<VoiceRecognition>>>>,

    /// Creates the recognizer for each new session
    pub recognizers: Arc<dyn RecognizerFactory>,

    pub permissions: Arc<dyn PermissionGate>,

    /// Template for new sessions; request fields override it
    pub defaults: SessionConfig,
}

impl AppState {
    pub fn new(
        recognizers: Arc<dyn RecognizerFactory>,
        permissions: Arc<dyn PermissionGate>,
        defaults: SessionConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            recognizers,
            permissions,
            defaults,
        }
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<VoiceRecognition>> {
        self.sessions.read().await.get(session_id).cloned()
    }
}
