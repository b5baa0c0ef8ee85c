use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::SessionError;
use crate::permission::PermissionGate;
use crate::recognizer::Recognizer;
use crate::session::{SessionCallbacks, SessionConfig, SessionController, SessionSnapshot};

/// Session commands handed to the render callback
#[derive(Clone)]
pub struct MicrophoneControls {
    controller: Arc<SessionController>,
}

impl MicrophoneControls {
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
}

/// What the render callback receives on every state change
#[derive(Clone)]
pub struct MicrophoneProps {
    pub is_recording: bool,
    pub recognized_text: String,
    pub partial_text: String,
    pub error: Option<String>,
    pub snapshot: SessionSnapshot,
    pub controls: MicrophoneControls,
}

/// Session exposed through a scoped render callback
///
/// The callback runs once with the initial state and again after every
/// state change, on a dedicated task, until the microphone is dropped.
pub struct VoiceMicrophone {
    controller: Arc<SessionController>,
    render_task: Option<JoinHandle<()>>,
}

impl VoiceMicrophone {
    pub fn new<F>(
        config: SessionConfig,
        recognizer: Arc<dyn Recognizer>,
        permissions: Arc<dyn PermissionGate>,
        callbacks: SessionCallbacks,
        mut render: F,
    ) -> Result<Self, SessionError>
    where
        F: FnMut(MicrophoneProps) + Send + 'static,
    {
        let controller = Arc::new(SessionController::new(
            config,
            recognizer,
            permissions,
            callbacks,
        )?);

        let controls = MicrophoneControls {
            controller: Arc::clone(&controller),
        };
        let mut updates = controller.subscribe();

        let render_task = tokio::spawn(async move {
            loop {
                let snapshot = updates.borrow_and_update().clone();
                render(MicrophoneProps {
                    is_recording: snapshot.is_recording,
                    recognized_text: snapshot.transcript.clone(),
                    partial_text: snapshot.partial.clone(),
                    error: snapshot.last_error.clone(),
                    snapshot,
                    controls: controls.clone(),
                });

                if updates.changed().await.is_err() {
                    break;
                }
            }
            debug!("Microphone render loop finished");
        });

        Ok(Self {
            controller,
            render_task: Some(render_task),
        })
    }

    /// Commands for use outside the render callback
    pub fn controls(&self) -> MicrophoneControls {
        MicrophoneControls {
            controller: Arc::clone(&self.controller),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.controller.snapshot()
    }

    pub fn session_id(&self) -> &str {
        self.controller.session_id()
    }
}

impl Drop for VoiceMicrophone {
    fn drop(&mut self) {
        if let Some(task) = self.render_task.take() {
            task.abort();
        }
        // Controls may outlive us; the session must not
        self.controller.shutdown();
    }
}
