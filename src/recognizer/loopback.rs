// In-process recognizer driven by the host
//
// Records every command it receives and lets the caller inject lifecycle
// events and command failures. Used by tests and demos in place of a real
// speech engine.

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::backend::{Recognizer, RecognizerEvent, RecognizerFactory, RecognizerOptions};
use super::hub::{EventHub, Subscription};

/// Command received by a [`LoopbackRecognizer`]
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerCommand {
    Start {
        locale: String,
        options: RecognizerOptions,
    },
    Stop,
    Cancel,
}

#[derive(Default)]
struct FailurePlan {
    start: VecDeque<String>,
    stop: VecDeque<String>,
    cancel: VecDeque<String>,
}

/// Host-driven recognizer
pub struct LoopbackRecognizer {
    hub: EventHub,
    commands: Mutex<Vec<RecognizerCommand>>,
    failures: Mutex<FailurePlan>,
    start_latency: Mutex<Option<Duration>>,
    active: AtomicBool,
}

impl LoopbackRecognizer {
    pub fn new() -> Self {
        Self {
            hub: EventHub::new(),
            commands: Mutex::new(Vec::new()),
            failures: Mutex::new(FailurePlan::default()),
            start_latency: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Deliver an event to the current subscriber
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        match &event {
            RecognizerEvent::End | RecognizerEvent::Error { .. } => {
                self.active.store(false, Ordering::SeqCst)
            }
            _ => {}
        }
        self.hub.emit(event)
    }

    /// Emit a partial result with a single candidate
    pub fn emit_partial(&self, text: &str) -> bool {
        self.emit(RecognizerEvent::PartialResults {
            candidates: vec![text.to_string()],
        })
    }

    /// Emit a final result with a single candidate
    pub fn emit_final(&self, text: &str) -> bool {
        self.emit(RecognizerEvent::FinalResults {
            candidates: vec![text.to_string()],
        })
    }

    /// All commands received so far, in order
    pub fn commands(&self) -> Vec<RecognizerCommand> {
        self.commands.lock().clone()
    }

    pub fn start_count(&self) -> usize {
        self.count(|c| matches!(c, RecognizerCommand::Start { .. }))
    }

    pub fn stop_count(&self) -> usize {
        self.count(|c| matches!(c, RecognizerCommand::Stop))
    }

    pub fn cancel_count(&self) -> usize {
        self.count(|c| matches!(c, RecognizerCommand::Cancel))
    }

    /// Make the next `start` fail with `message`
    pub fn fail_next_start(&self, message: &str) {
        self.failures.lock().start.push_back(message.to_string());
    }

    /// Make the next `stop` fail with `message`
    pub fn fail_next_stop(&self, message: &str) {
        self.failures.lock().stop.push_back(message.to_string());
    }

    /// Make the next `cancel` fail with `message`
    pub fn fail_next_cancel(&self, message: &str) {
        self.failures.lock().cancel.push_back(message.to_string());
    }

    /// Delay every `start` by `latency` before resolving
    pub fn set_start_latency(&self, latency: Option<Duration>) {
        *self.start_latency.lock() = latency;
    }

    /// Whether a started activation has not yet ended
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Whether a controller currently holds the event subscription
    pub fn has_subscriber(&self) -> bool {
        self.hub.has_subscriber()
    }

    fn count(&self, pred: impl Fn(&RecognizerCommand) -> bool) -> usize {
        self.commands.lock().iter().filter(|c| pred(c)).count()
    }
}

impl Default for LoopbackRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Recognizer for LoopbackRecognizer {
    async fn start(&self, locale: &str, options: &RecognizerOptions) -> Result<()> {
        self.commands.lock().push(RecognizerCommand::Start {
            locale: locale.to_string(),
            options: options.clone(),
        });

        let latency = *self.start_latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let failure = self.failures.lock().start.pop_front();
        if let Some(message) = failure {
            return Err(anyhow!(message));
        }

        info!("Loopback recognizer started ({})", locale);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.commands.lock().push(RecognizerCommand::Stop);

        let failure = self.failures.lock().stop.pop_front();
        if let Some(message) = failure {
            return Err(anyhow!(message));
        }
        Ok(())
    }

    async fn cancel(&self) -> Result<()> {
        self.commands.lock().push(RecognizerCommand::Cancel);

        let failure = self.failures.lock().cancel.pop_front();
        if let Some(message) = failure {
            return Err(anyhow!(message));
        }
        self.active.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    fn name(&self) -> &str {
        "loopback"
    }
}

/// Hands out one [`LoopbackRecognizer`] per session and keeps them reachable
#[derive(Default)]
pub struct LoopbackRecognizerFactory {
    created: Mutex<HashMap<String, Arc<LoopbackRecognizer>>>,
}

impl LoopbackRecognizerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recognizer created for `session_id`, if any
    pub fn get(&self, session_id: &str) -> Option<Arc<LoopbackRecognizer>> {
        self.created.lock().get(session_id).cloned()
    }
}

#[async_trait::async_trait]
impl RecognizerFactory for LoopbackRecognizerFactory {
    async fn create(&self, session_id: &str) -> Result<Arc<dyn Recognizer>> {
        let recognizer = Arc::new(LoopbackRecognizer::new());
        self.created
            .lock()
            .insert(session_id.to_string(), Arc::clone(&recognizer));
        Ok(recognizer)
    }
}
