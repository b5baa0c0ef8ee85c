// Session state machine
//
// Pure transition logic: every input (host command, recognizer event, timer
// expiry, command completion) is applied synchronously and yields a list of
// effects for the controller to carry out. The machine never performs I/O.
//
// `continue_listening` is kept separate from `state`. A recognizer `End` is
// ambiguous (user stop or natural end of one utterance); it triggers a restart
// only while the flag is still set, and every stop/cancel/error clears it.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::callbacks::Notification;
use super::config::SessionConfig;
use super::state::{SessionMode, SessionSnapshot, SessionState};
use super::stats::SessionStats;
use crate::error::SessionError;
use crate::recognizer::RecognizerEvent;

/// Asynchronous work requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    /// Check (and if needed request) microphone permission
    AcquirePermission { epoch: u64 },
    /// Issue recognizer `start`
    Start { attempt: u64 },
    /// Issue recognizer `stop`
    Stop,
    /// Issue recognizer `cancel`
    Cancel,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Effect {
    Issue(Command),
    ArmSilence { generation: u64, after: Duration },
    DisarmSilence,
    ScheduleRestart { generation: u64, after: Duration },
    DisarmRestart,
    Notify(Notification),
}

#[derive(Debug, Clone)]
pub(crate) enum Input {
    StartRequested,
    PermissionResolved { epoch: u64, granted: bool },
    StartCompleted { attempt: u64, error: Option<String> },
    StopRequested,
    StopCompleted { error: Option<String> },
    CancelRequested,
    CancelCompleted { error: Option<String> },
    ResetRequested,
    Recognizer(RecognizerEvent),
    SilenceElapsed { generation: u64 },
    RestartDue { generation: u64 },
    Teardown,
}

#[derive(Debug, Clone)]
pub(crate) struct SessionMachine {
    mode: SessionMode,
    partial_results_enabled: bool,
    max_silence: Duration,
    restart_delay: Duration,

    state: SessionState,
    continue_listening: bool,
    transcript: String,
    partial: String,
    partial_results: Vec<String>,
    results: Vec<String>,
    last_error: Option<String>,

    silence_deadline: Option<Instant>,
    silence_generation: u64,
    restart_pending: bool,
    restart_generation: u64,

    /// Host-started session counter
    epoch: u64,
    /// Recognizer start counter (host starts and restarts)
    attempt: u64,
    permission_pending: bool,
    start_in_flight: Option<u64>,
    /// Session epoch the in-flight start belongs to
    start_epoch: u64,
    /// Stop/cancel to forward once the given start attempt resolves
    deferred: Option<(u64, Command)>,
    /// Start held back until the in-flight attempt resolves
    queued_start: bool,
    /// Recognizer reported `Start` at least once this session
    activated: bool,
    /// Final results still accepted after a completed stop
    late_results: bool,

    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    utterance_count: usize,
    restart_count: usize,
}

impl SessionMachine {
    pub(crate) fn new(config: &SessionConfig) -> Self {
        Self {
            mode: config.mode(),
            partial_results_enabled: config.enable_partial_results,
            max_silence: config.max_silence_duration,
            restart_delay: config.restart_delay,
            state: SessionState::Idle,
            continue_listening: false,
            transcript: String::new(),
            partial: String::new(),
            partial_results: Vec::new(),
            results: Vec::new(),
            last_error: None,
            silence_deadline: None,
            silence_generation: 0,
            restart_pending: false,
            restart_generation: 0,
            epoch: 0,
            attempt: 0,
            permission_pending: false,
            start_in_flight: None,
            start_epoch: 0,
            deferred: None,
            queued_start: false,
            activated: false,
            late_results: false,
            started_at: None,
            ended_at: None,
            utterance_count: 0,
            restart_count: 0,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn continue_listening(&self) -> bool {
        self.continue_listening
    }

    pub(crate) fn is_recording(&self) -> bool {
        self.activated && self.state.is_active()
    }

    /// Apply one input and return the effects to carry out, in order
    pub(crate) fn process(&mut self, input: Input, now: Instant) -> Vec<Effect> {
        let mut fx = Vec::new();
        let before = self.state;

        match input {
            Input::StartRequested => self.on_start_requested(&mut fx),
            Input::PermissionResolved { epoch, granted } => {
                self.on_permission_resolved(epoch, granted, now, &mut fx)
            }
            Input::StartCompleted { attempt, error } => {
                self.on_start_completed(attempt, error, &mut fx)
            }
            Input::StopRequested => self.on_stop_requested(&mut fx),
            Input::StopCompleted { error } => self.on_stop_completed(error, &mut fx),
            Input::CancelRequested => self.on_cancel_requested(&mut fx),
            Input::CancelCompleted { error } => {
                if let Some(message) = error {
                    self.record_error(SessionError::RecognizerCancel(message).to_string(), &mut fx);
                }
            }
            Input::ResetRequested => self.on_reset_requested(&mut fx),
            Input::Recognizer(event) => self.on_recognizer_event(event, now, &mut fx),
            Input::SilenceElapsed { generation } => self.on_silence_elapsed(generation, &mut fx),
            Input::RestartDue { generation } => self.on_restart_due(generation, &mut fx),
            Input::Teardown => self.on_teardown(&mut fx),
        }

        if before != self.state {
            debug!("session state: {:?} -> {:?}", before, self.state);
        }

        fx
    }

    fn on_start_requested(&mut self, fx: &mut Vec<Effect>) {
        if self.state.is_active() {
            return;
        }

        // A host start always opens a new session; restarts never come through here
        self.epoch += 1;
        self.last_error = None;
        self.transcript.clear();
        self.results.clear();
        self.clear_partial();
        self.late_results = false;
        self.activated = false;
        self.utterance_count = 0;
        self.restart_count = 0;
        self.started_at = Some(Utc::now());
        self.ended_at = None;

        self.continue_listening = true;
        self.permission_pending = true;
        self.state = SessionState::Starting;

        fx.push(Effect::Issue(Command::AcquirePermission { epoch: self.epoch }));
    }

    fn on_permission_resolved(
        &mut self,
        epoch: u64,
        granted: bool,
        now: Instant,
        fx: &mut Vec<Effect>,
    ) {
        if epoch != self.epoch
            || !self.permission_pending
            || self.state != SessionState::Starting
            || !self.continue_listening
        {
            debug!("Ignoring permission result for superseded start (epoch {})", epoch);
            return;
        }
        self.permission_pending = false;

        if !granted {
            warn!("Microphone permission denied, not starting recognizer");
            self.continue_listening = false;
            self.state = SessionState::Idle;
            self.ended_at = Some(Utc::now());
            self.record_error(SessionError::PermissionDenied.to_string(), fx);
            return;
        }

        if self.mode == SessionMode::Continuous {
            self.arm_silence(now, fx);
        }
        self.start_or_queue(fx);
    }

    fn on_start_completed(&mut self, attempt: u64, error: Option<String>, fx: &mut Vec<Effect>) {
        if self.start_in_flight != Some(attempt) {
            debug!("Ignoring completion of stale start attempt {}", attempt);
            return;
        }
        self.start_in_flight = None;
        let same_session = self.start_epoch == self.epoch;
        let deferred = self
            .deferred
            .take()
            .filter(|(pending, _)| *pending == attempt)
            .map(|(_, command)| command);

        match (error, deferred) {
            (None, Some(command)) => {
                info!("Recognizer started after session ended, forwarding {:?}", command);
                fx.push(Effect::Issue(command));
            }
            (None, None) => {}
            (Some(message), _) if !same_session => {
                debug!("Start attempt {} of an earlier session failed: {}", attempt, message);
            }
            (Some(message), Some(_)) => {
                // Session was already stopped or cancelled; nothing to undo
                self.record_error(SessionError::RecognizerStart(message).to_string(), fx);
                if self.state == SessionState::Stopping {
                    self.enter_idle(fx);
                }
            }
            (Some(message), None) => {
                let message = SessionError::RecognizerStart(message).to_string();
                if self.continue_listening
                    && matches!(
                        self.state,
                        SessionState::Starting | SessionState::Listening | SessionState::Restarting
                    )
                {
                    self.enter_errored(message, fx);
                } else {
                    self.record_error(message, fx);
                }
            }
        }

        if self.queued_start {
            self.queued_start = false;
            if self.continue_listening
                && matches!(self.state, SessionState::Starting | SessionState::Restarting)
            {
                debug!("Issuing start held back behind attempt {}", attempt);
                self.issue_start(fx);
            }
        }
    }

    fn on_stop_requested(&mut self, fx: &mut Vec<Effect>) {
        if matches!(
            self.state,
            SessionState::Idle | SessionState::Errored | SessionState::Stopping
        ) {
            debug!("Stop ignored in {:?}", self.state);
            return;
        }

        self.continue_listening = false;
        self.disarm_silence(fx);
        self.disarm_restart(fx);

        if self.permission_pending || self.held_behind_earlier_session() {
            // Nothing of this session has reached the recognizer yet
            self.halt_recognizer(Command::Stop, fx);
            self.enter_idle(fx);
            return;
        }

        self.state = SessionState::Stopping;
        self.halt_recognizer(Command::Stop, fx);
    }

    fn on_stop_completed(&mut self, error: Option<String>, fx: &mut Vec<Effect>) {
        if let Some(message) = error {
            self.record_error(SessionError::RecognizerStop(message).to_string(), fx);
        }

        // A stop failure still ends the session locally
        if self.state == SessionState::Stopping {
            self.enter_idle(fx);
            self.late_results = true;
        }
    }

    fn on_cancel_requested(&mut self, fx: &mut Vec<Effect>) {
        if !self.state.is_active() {
            debug!("Cancel ignored in {:?}", self.state);
            return;
        }

        self.continue_listening = false;
        self.disarm_silence(fx);
        self.disarm_restart(fx);
        self.transcript.clear();
        self.results.clear();

        self.halt_recognizer(Command::Cancel, fx);
        self.enter_idle(fx);
    }

    fn on_reset_requested(&mut self, fx: &mut Vec<Effect>) {
        let was_active = self.state.is_active();

        self.continue_listening = false;
        self.disarm_silence(fx);
        self.disarm_restart(fx);

        if was_active {
            warn!("Reset while {:?}, cancelling recognizer", self.state);
            self.halt_recognizer(Command::Cancel, fx);
        }

        self.transcript.clear();
        self.results.clear();
        self.clear_partial();
        self.last_error = None;
        self.late_results = false;
        self.activated = false;
        self.permission_pending = false;
        self.started_at = None;
        self.ended_at = None;
        self.utterance_count = 0;
        self.restart_count = 0;
        self.state = SessionState::Idle;

        if was_active {
            fx.push(Effect::Notify(Notification::Stopped));
        }
    }

    fn on_recognizer_event(&mut self, event: RecognizerEvent, now: Instant, fx: &mut Vec<Effect>) {
        if self.queued_start {
            debug!("Ignoring recognizer {} while a start is held back", event.kind());
            return;
        }

        match event {
            RecognizerEvent::Start => {
                if self.state == SessionState::Starting && self.continue_listening {
                    self.mark_listening(fx);
                } else {
                    debug!("Ignoring recognizer start in {:?}", self.state);
                }
            }

            RecognizerEvent::PartialResults { candidates } => {
                let Some(best) = candidates.first().cloned() else {
                    warn!("Recognizer sent an empty partial result");
                    return;
                };
                if !self.partial_results_enabled {
                    debug!("Partial results disabled, ignoring");
                    return;
                }

                match self.state {
                    SessionState::Starting | SessionState::Listening if self.continue_listening => {
                        if self.state == SessionState::Starting {
                            self.mark_listening(fx);
                        }
                        // Speech activity pushes the silence deadline out
                        if self.mode == SessionMode::Continuous {
                            self.arm_silence(now, fx);
                        }
                    }
                    SessionState::Stopping => {}
                    _ => {
                        debug!("Ignoring partial result in {:?}", self.state);
                        return;
                    }
                }

                self.partial = best.clone();
                self.partial_results = candidates;
                fx.push(Effect::Notify(Notification::PartialResult(best)));
            }

            RecognizerEvent::FinalResults { candidates } => {
                let Some(best) = candidates.first().cloned() else {
                    warn!("Recognizer sent an empty final result");
                    return;
                };

                let accepting = match self.state {
                    SessionState::Starting
                    | SessionState::Listening
                    | SessionState::Restarting
                    | SessionState::Stopping => true,
                    SessionState::Idle => self.late_results,
                    SessionState::Errored => false,
                };
                if !accepting {
                    debug!("Ignoring final result in {:?}", self.state);
                    return;
                }
                if self.state == SessionState::Starting && self.continue_listening {
                    self.mark_listening(fx);
                }

                match self.mode {
                    SessionMode::Continuous => {
                        if !best.is_empty() {
                            if !self.transcript.is_empty() {
                                self.transcript.push(' ');
                            }
                            self.transcript.push_str(&best);
                        }
                    }
                    SessionMode::OneShot => self.transcript = best,
                }
                self.results = candidates;
                self.clear_partial();
                self.utterance_count += 1;

                fx.push(Effect::Notify(Notification::Result(self.transcript.clone())));
            }

            RecognizerEvent::End => match self.state {
                SessionState::Starting | SessionState::Listening => {
                    if self.mode == SessionMode::Continuous && self.continue_listening {
                        self.state = SessionState::Restarting;
                        self.clear_partial();
                        self.restart_generation += 1;
                        self.restart_pending = true;
                        fx.push(Effect::ScheduleRestart {
                            generation: self.restart_generation,
                            after: self.restart_delay,
                        });
                    } else {
                        self.enter_idle(fx);
                    }
                }
                SessionState::Stopping => self.enter_idle(fx),
                SessionState::Idle => self.late_results = false,
                SessionState::Restarting | SessionState::Errored => {
                    debug!("Ignoring recognizer end in {:?}", self.state);
                }
            },

            RecognizerEvent::Error { message } => {
                if self.state.is_active() {
                    warn!("Recognizer error: {}", message);
                    self.enter_errored(SessionError::Recognizer(message).to_string(), fx);
                } else {
                    debug!("Ignoring recognizer error in {:?}: {}", self.state, message);
                }
            }
        }
    }

    fn on_silence_elapsed(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        if generation != self.silence_generation || self.silence_deadline.is_none() {
            return;
        }
        self.silence_deadline = None;

        let listening = matches!(
            self.state,
            SessionState::Starting | SessionState::Listening | SessionState::Restarting
        );
        if !listening || !self.continue_listening {
            return;
        }

        info!("No speech for {:?}, stopping session", self.max_silence);
        self.continue_listening = false;
        self.disarm_restart(fx);
        if self.held_behind_earlier_session() {
            self.halt_recognizer(Command::Stop, fx);
            self.enter_idle(fx);
            return;
        }
        self.state = SessionState::Stopping;
        self.halt_recognizer(Command::Stop, fx);
    }

    fn on_restart_due(&mut self, generation: u64, fx: &mut Vec<Effect>) {
        if generation != self.restart_generation || !self.restart_pending {
            return;
        }
        self.restart_pending = false;

        if self.state != SessionState::Restarting {
            return;
        }

        if self.continue_listening {
            self.restart_count += 1;
            debug!("Restarting recognizer (restart #{})", self.restart_count);
            self.start_or_queue(fx);
        } else {
            self.enter_idle(fx);
        }
    }

    fn on_teardown(&mut self, fx: &mut Vec<Effect>) {
        self.continue_listening = false;
        self.disarm_silence(fx);
        self.disarm_restart(fx);
        self.start_in_flight = None;
        self.deferred = None;
        self.queued_start = false;
        self.permission_pending = false;
        self.transcript.clear();
        self.results.clear();
        self.clear_partial();
        self.activated = false;
        self.late_results = false;
        self.state = SessionState::Idle;
    }

    /// This session's start is waiting on an attempt of an earlier session
    fn held_behind_earlier_session(&self) -> bool {
        self.queued_start && self.start_epoch != self.epoch
    }

    /// Issue a recognizer start, or hold it while another is still pending
    fn start_or_queue(&mut self, fx: &mut Vec<Effect>) {
        if let Some(pending) = self.start_in_flight {
            debug!("Start attempt {} still pending, holding new start", pending);
            self.queued_start = true;
            return;
        }
        self.issue_start(fx);
    }

    /// Route a stop/cancel to the recognizer, deferring it behind a pending start
    fn halt_recognizer(&mut self, command: Command, fx: &mut Vec<Effect>) {
        self.queued_start = false;
        if self.permission_pending {
            return;
        }
        match self.start_in_flight {
            Some(pending) => {
                // An earlier session's parked stop/cancel stays with its attempt
                let parked = self.deferred.map_or(false, |(a, _)| a == pending);
                if !parked || self.start_epoch == self.epoch {
                    self.deferred = Some((pending, command));
                }
            }
            None => fx.push(Effect::Issue(command)),
        }
    }

    fn issue_start(&mut self, fx: &mut Vec<Effect>) {
        self.attempt += 1;
        self.start_in_flight = Some(self.attempt);
        self.start_epoch = self.epoch;
        self.state = SessionState::Starting;
        fx.push(Effect::Issue(Command::Start {
            attempt: self.attempt,
        }));
    }

    fn mark_listening(&mut self, fx: &mut Vec<Effect>) {
        self.state = SessionState::Listening;
        self.last_error = None;
        if !self.activated {
            self.activated = true;
            fx.push(Effect::Notify(Notification::Started));
        }
    }

    fn enter_idle(&mut self, fx: &mut Vec<Effect>) {
        let was_active = self.state.is_active();

        self.disarm_silence(fx);
        self.disarm_restart(fx);
        self.continue_listening = false;
        self.permission_pending = false;
        self.queued_start = false;
        self.activated = false;
        self.late_results = false;
        self.clear_partial();
        self.state = SessionState::Idle;

        if was_active {
            self.ended_at = Some(Utc::now());
            fx.push(Effect::Notify(Notification::Stopped));
        }
    }

    fn enter_errored(&mut self, message: String, fx: &mut Vec<Effect>) {
        self.continue_listening = false;
        self.disarm_silence(fx);
        self.disarm_restart(fx);
        self.deferred = None;
        self.queued_start = false;
        self.permission_pending = false;
        self.activated = false;
        self.late_results = false;
        self.clear_partial();
        self.state = SessionState::Errored;
        self.ended_at = Some(Utc::now());
        self.record_error(message, fx);
    }

    fn record_error(&mut self, message: String, fx: &mut Vec<Effect>) {
        self.last_error = Some(message.clone());
        fx.push(Effect::Notify(Notification::Error(message)));
    }

    fn arm_silence(&mut self, now: Instant, fx: &mut Vec<Effect>) {
        self.silence_generation += 1;
        self.silence_deadline = Some(now + self.max_silence);
        fx.push(Effect::ArmSilence {
            generation: self.silence_generation,
            after: self.max_silence,
        });
    }

    fn disarm_silence(&mut self, fx: &mut Vec<Effect>) {
        self.silence_generation += 1;
        if self.silence_deadline.take().is_some() {
            fx.push(Effect::DisarmSilence);
        }
    }

    fn disarm_restart(&mut self, fx: &mut Vec<Effect>) {
        self.restart_generation += 1;
        if self.restart_pending {
            self.restart_pending = false;
            fx.push(Effect::DisarmRestart);
        }
    }

    fn clear_partial(&mut self) {
        self.partial.clear();
        self.partial_results.clear();
    }

    pub(crate) fn snapshot(&self, session_id: &str, now: Instant) -> SessionSnapshot {
        let silence_deadline = self.silence_deadline.map(|deadline| {
            let remaining = chrono::Duration::from_std(deadline.saturating_duration_since(now))
                .unwrap_or_else(|_| chrono::Duration::zero());
            Utc::now() + remaining
        });

        SessionSnapshot {
            session_id: session_id.to_string(),
            mode: self.mode,
            state: self.state,
            is_recording: self.is_recording(),
            continue_listening: self.continue_listening,
            transcript: self.transcript.clone(),
            partial: self.partial.clone(),
            partial_results: self.partial_results.clone(),
            results: self.results.clone(),
            last_error: self.last_error.clone(),
            silence_deadline,
        }
    }

    pub(crate) fn stats(&self) -> SessionStats {
        let duration_ms = match self.started_at {
            Some(started) => self
                .ended_at
                .unwrap_or_else(Utc::now)
                .signed_duration_since(started)
                .num_milliseconds(),
            None => 0,
        };

        SessionStats {
            is_recording: self.is_recording(),
            started_at: self.started_at,
            duration_ms,
            utterance_count: self.utterance_count,
            restart_count: self.restart_count,
            last_results: self.results.clone(),
        }
    }
}
