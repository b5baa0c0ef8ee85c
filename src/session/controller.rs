use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::callbacks::{Notification, SessionCallbacks};
use super::config::SessionConfig;
use super::machine::{Command, Effect, Input, SessionMachine};
use super::state::SessionSnapshot;
use super::stats::SessionStats;
use crate::error::SessionError;
use crate::permission::PermissionGate;
use crate::recognizer::{Recognizer, Subscription, SubscriptionHandle};

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Silence,
    Restart,
}

/// Controls one recording session on top of a single-utterance recognizer
///
/// All transitions (host commands, recognizer events, timer expiries and
/// command completions) are applied one at a time under a single lock.
/// Recognizer commands run outside the lock, so events keep flowing while a
/// command is in flight.
///
/// Must be created inside a Tokio runtime. Dropping the controller tears the
/// session down: timers are cancelled, the recognizer subscription is
/// released, and no further recognizer commands are issued.
pub struct SessionController {
    shared: Arc<Shared>,
}

struct Shared {
    config: SessionConfig,
    recognizer: Arc<dyn Recognizer>,
    permissions: Arc<dyn PermissionGate>,
    runtime: Handle,
    subscription: SubscriptionHandle,
    torn_down: AtomicBool,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    notify_tx: mpsc::UnboundedSender<Notification>,
}

struct Inner {
    machine: SessionMachine,
    silence_timer: Option<JoinHandle<()>>,
    restart_timer: Option<JoinHandle<()>>,
    event_task: Option<JoinHandle<()>>,
    notify_task: Option<JoinHandle<()>>,
}

impl SessionController {
    /// Create a session controller and take over the recognizer's event stream
    pub fn new(
        config: SessionConfig,
        recognizer: Arc<dyn Recognizer>,
        permissions: Arc<dyn PermissionGate>,
        callbacks: SessionCallbacks,
    ) -> Result<Self, SessionError> {
        config.validate()?;

        info!(
            "Creating session controller: {} ({} recognizer, {:?})",
            config.session_id,
            recognizer.name(),
            config.mode()
        );

        let machine = SessionMachine::new(&config);
        let (snapshot_tx, _) =
            watch::channel(machine.snapshot(&config.session_id, Instant::now()));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        // Installing our subscription releases any previous controller's
        let subscription = recognizer.subscribe();
        let auto_start = config.auto_start;

        let shared = Arc::new(Shared {
            subscription: subscription.handle(),
            config,
            recognizer,
            permissions,
            runtime: Handle::current(),
            torn_down: AtomicBool::new(false),
            inner: Mutex::new(Inner {
                machine,
                silence_timer: None,
                restart_timer: None,
                event_task: None,
                notify_task: None,
            }),
            snapshot_tx,
            notify_tx,
        });

        let event_task = shared
            .runtime
            .spawn(pump_events(Arc::downgrade(&shared), subscription));
        let notify_task = shared
            .runtime
            .spawn(dispatch_notifications(notify_rx, callbacks));
        {
            let mut inner = shared.inner.lock();
            inner.event_task = Some(event_task);
            inner.notify_task = Some(notify_task);
        }

        if auto_start {
            let auto = Arc::clone(&shared);
            shared.runtime.spawn(async move {
                if let Err(e) = auto.start().await {
                    warn!("Auto-start of session {} failed: {}", auto.config.session_id, e);
                }
            });
        }

        Ok(Self { shared })
    }

    /// Start listening
    ///
    /// Resolves once the recognizer accepted the `start` command (or the
    /// permission check refused it). While a start of an earlier session is
    /// still pending, the new one is held back and issued when that resolves;
    /// this call then returns right after the permission check. Starting an
    /// already active session is a no-op.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.shared.start().await
    }

    /// Stop listening; the last final result is still delivered
    pub async fn stop(&self) -> Result<(), SessionError> {
        self.shared.ensure_alive()?;
        let commands = self.shared.process(Input::StopRequested);
        self.shared.drive(commands).await
    }

    /// Stop listening and discard the transcript
    pub async fn cancel(&self) -> Result<(), SessionError> {
        self.shared.ensure_alive()?;
        let commands = self.shared.process(Input::CancelRequested);
        self.shared.drive(commands).await
    }

    /// Clear all session state and return to idle
    ///
    /// An active session is cancelled in the background.
    pub fn reset(&self) {
        if self.shared.torn_down.load(Ordering::SeqCst) {
            return;
        }
        info!("Resetting session {}", self.shared.config.session_id);
        self.shared.dispatch(Input::ResetRequested);
    }

    /// Current state of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    /// Receive a new snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        self.shared.inner.lock().machine.stats()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn session_id(&self) -> &str {
        &self.shared.config.session_id
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.torn_down.load(Ordering::SeqCst)
    }

    /// Tear the session down
    ///
    /// Cancels every timer, releases the recognizer subscription and stops
    /// the background tasks. Returns `false` if it already happened.
    pub fn shutdown(&self) -> bool {
        if self.shared.torn_down.swap(true, Ordering::SeqCst) {
            return false;
        }

        info!("Tearing down session {}", self.shared.config.session_id);
        self.shared.subscription.release();

        let mut inner = self.shared.inner.lock();
        inner.machine.process(Input::Teardown, Instant::now());

        let handles = [
            inner.silence_timer.take(),
            inner.restart_timer.take(),
            inner.event_task.take(),
            inner.notify_task.take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }

        let snapshot = inner
            .machine
            .snapshot(&self.shared.config.session_id, Instant::now());
        self.shared.snapshot_tx.send_replace(snapshot);
        true
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Shared {
    fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.torn_down.load(Ordering::SeqCst) {
            return Err(SessionError::TornDown);
        }
        Ok(())
    }

    async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        self.ensure_alive()?;
        let commands = self.process(Input::StartRequested);
        if commands.is_empty() {
            let state = self.inner.lock().machine.state();
            warn!(
                "Session {} already active ({})",
                self.config.session_id,
                state.description()
            );
            return Ok(());
        }
        info!("Starting session: {}", self.config.session_id);
        self.drive(commands).await
    }

    /// Apply one input under the lock; returns the commands it requested
    fn process(self: &Arc<Self>, input: Input) -> Vec<Command> {
        if self.torn_down.load(Ordering::SeqCst) {
            debug!("Session torn down, ignoring {:?}", input);
            return Vec::new();
        }

        let mut inner = self.inner.lock();
        let effects = inner.machine.process(input, Instant::now());
        let commands = self.apply(&mut inner, effects);

        let snapshot = inner.machine.snapshot(&self.config.session_id, Instant::now());
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });

        commands
    }

    /// Carry out timer and notification effects; collect commands
    fn apply(self: &Arc<Self>, inner: &mut Inner, effects: Vec<Effect>) -> Vec<Command> {
        let mut commands = Vec::new();

        for effect in effects {
            match effect {
                Effect::Issue(command) => commands.push(command),
                Effect::ArmSilence { generation, after } => {
                    abort(&mut inner.silence_timer);
                    inner.silence_timer =
                        Some(self.spawn_timer(TimerKind::Silence, generation, after));
                }
                Effect::DisarmSilence => abort(&mut inner.silence_timer),
                Effect::ScheduleRestart { generation, after } => {
                    abort(&mut inner.restart_timer);
                    inner.restart_timer =
                        Some(self.spawn_timer(TimerKind::Restart, generation, after));
                }
                Effect::DisarmRestart => abort(&mut inner.restart_timer),
                Effect::Notify(notification) => {
                    if self.notify_tx.send(notification).is_err() {
                        debug!("Notification dropped, dispatcher already stopped");
                    }
                }
            }
        }

        commands
    }

    /// Apply an input from a background source; commands run detached
    fn dispatch(self: &Arc<Self>, input: Input) {
        let commands = self.process(input);
        if commands.is_empty() {
            return;
        }

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            if let Err(e) = shared.drive(commands).await {
                debug!("Background command failed: {}", e);
            }
        });
    }

    fn spawn_timer(
        self: &Arc<Self>,
        kind: TimerKind,
        generation: u64,
        after: Duration,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(after).await;

            let Some(shared) = weak.upgrade() else {
                return;
            };
            let input = match kind {
                TimerKind::Silence => Input::SilenceElapsed { generation },
                TimerKind::Restart => Input::RestartDue { generation },
            };
            debug!("{:?} timer fired (generation {})", kind, generation);
            shared.dispatch(input);
        })
    }

    /// Run commands in order, feeding their completions back into the machine
    ///
    /// Returns the first failure.
    async fn drive(self: &Arc<Self>, commands: Vec<Command>) -> Result<(), SessionError> {
        let mut queue: VecDeque<Command> = commands.into();
        let mut outcome = Ok(());

        while let Some(command) = queue.pop_front() {
            if self.torn_down.load(Ordering::SeqCst) {
                debug!("Session torn down, dropping {:?}", command);
                return Err(SessionError::TornDown);
            }

            let (result, follow_up) = self.execute(command).await;
            if let Err(e) = result {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
            queue.extend(follow_up);
        }

        outcome
    }

    async fn execute(
        self: &Arc<Self>,
        command: Command,
    ) -> (Result<(), SessionError>, Vec<Command>) {
        match command {
            Command::AcquirePermission { epoch } => {
                let granted = self.acquire_permission().await;
                let follow_up = self.process(Input::PermissionResolved { epoch, granted });
                let result = if granted {
                    Ok(())
                } else {
                    Err(SessionError::PermissionDenied)
                };
                (result, follow_up)
            }

            Command::Start { attempt } => {
                let options = self.config.recognizer_options();
                info!(
                    "Starting {} recognizer ({}, attempt {})",
                    self.recognizer.name(),
                    self.config.locale,
                    attempt
                );

                let error = match self.recognizer.start(&self.config.locale, &options).await {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Failed to start recognizer: {:#}", e);
                        Some(format!("{:#}", e))
                    }
                };
                let follow_up = self.process(Input::StartCompleted {
                    attempt,
                    error: error.clone(),
                });
                (error.map_or(Ok(()), |m| Err(SessionError::RecognizerStart(m))), follow_up)
            }

            Command::Stop => {
                info!("Stopping {} recognizer", self.recognizer.name());
                let error = match self.recognizer.stop().await {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Failed to stop recognizer: {:#}", e);
                        Some(format!("{:#}", e))
                    }
                };
                let follow_up = self.process(Input::StopCompleted {
                    error: error.clone(),
                });
                (error.map_or(Ok(()), |m| Err(SessionError::RecognizerStop(m))), follow_up)
            }

            Command::Cancel => {
                info!("Cancelling {} recognizer", self.recognizer.name());
                let error = match self.recognizer.cancel().await {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Failed to cancel recognizer: {:#}", e);
                        Some(format!("{:#}", e))
                    }
                };
                let follow_up = self.process(Input::CancelCompleted {
                    error: error.clone(),
                });
                (error.map_or(Ok(()), |m| Err(SessionError::RecognizerCancel(m))), follow_up)
            }
        }
    }

    async fn acquire_permission(&self) -> bool {
        if self.permissions.check_granted().await {
            return true;
        }
        info!("Requesting microphone permission");
        self.permissions.request_grant().await
    }
}

fn abort(timer: &mut Option<JoinHandle<()>>) {
    if let Some(handle) = timer.take() {
        handle.abort();
    }
}

/// Forward recognizer events into the session, in delivery order
async fn pump_events(weak: Weak<Shared>, mut subscription: Subscription) {
    debug!("Recognizer event pump started (subscription {})", subscription.id());

    while let Some(event) = subscription.recv().await {
        let Some(shared) = weak.upgrade() else {
            break;
        };
        if shared.torn_down.load(Ordering::SeqCst) {
            break;
        }
        debug!("Recognizer event: {}", event.kind());
        shared.dispatch(Input::Recognizer(event));
    }

    debug!("Recognizer event pump stopped");
}

async fn dispatch_notifications(
    mut notifications: mpsc::UnboundedReceiver<Notification>,
    callbacks: SessionCallbacks,
) {
    while let Some(notification) = notifications.recv().await {
        callbacks.dispatch(&notification);
    }
}
