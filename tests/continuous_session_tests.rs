use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use voice_session::{
    AlwaysGranted, LoopbackRecognizer, RecognizerEvent, SessionCallbacks, SessionConfig,
    SessionController, SessionError, SessionState,
};

/// Let spawned tasks run until they are all idle
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

fn continuous_session(
    silence_ms: u64,
    callbacks: SessionCallbacks,
) -> (Arc<LoopbackRecognizer>, SessionController) {
    let recognizer = Arc::new(LoopbackRecognizer::new());
    let controller = SessionController::new(
        SessionConfig::continuous(Duration::from_millis(silence_ms)),
        recognizer.clone(),
        Arc::new(AlwaysGranted),
        callbacks,
    )
    .unwrap();
    (recognizer, controller)
}

#[tokio::test(start_paused = true)]
async fn test_transcript_accumulates_across_restarts() {
    let (recognizer, session) = continuous_session(2000, SessionCallbacks::default());

    session.start().await.unwrap();
    assert_eq!(recognizer.start_count(), 1);
    assert_eq!(session.snapshot().state, SessionState::Starting);

    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit_final("hello");
    recognizer.emit(RecognizerEvent::End);
    settle().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Restarting);
    assert!(snapshot.is_recording, "recording stays on across a restart");
    assert!(snapshot.continue_listening);

    // Grace period elapses, recognizer is started again without clearing text
    sleep(Duration::from_millis(150)).await;
    assert_eq!(recognizer.start_count(), 2);
    assert_eq!(session.snapshot().transcript, "hello");

    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit_final("world");
    settle().await;
    assert_eq!(session.snapshot().transcript, "hello world");

    session.stop().await.unwrap();
    assert_eq!(recognizer.stop_count(), 1);
    recognizer.emit(RecognizerEvent::End);
    settle().await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.is_recording);
    assert_eq!(snapshot.transcript, "hello world");

    sleep(Duration::from_millis(500)).await;
    assert_eq!(recognizer.start_count(), 2, "no restart after stop");

    let stats = session.stats();
    assert_eq!(stats.utterance_count, 2);
    assert_eq!(stats.restart_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_stops_session_once() {
    let (recognizer, session) = continuous_session(2000, SessionCallbacks::default());

    session.start().await.unwrap();
    recognizer.emit(RecognizerEvent::Start);
    settle().await;

    sleep(Duration::from_millis(1990)).await;
    assert_eq!(recognizer.stop_count(), 0);

    // Speech just before the deadline pushes it out
    recognizer.emit_partial("still talking");
    settle().await;
    assert!(session.snapshot().silence_deadline.is_some());

    sleep(Duration::from_millis(1990)).await;
    assert_eq!(recognizer.stop_count(), 0, "partial rescheduled the deadline");

    sleep(Duration::from_millis(20)).await;
    assert_eq!(recognizer.stop_count(), 1);

    // Loopback stop resolves at once, so the session is already idle
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(!snapshot.continue_listening);
    assert!(snapshot.silence_deadline.is_none());

    recognizer.emit(RecognizerEvent::End);
    sleep(Duration::from_millis(5000)).await;
    assert_eq!(session.snapshot().state, SessionState::Idle);
    assert_eq!(recognizer.stop_count(), 1);
    assert_eq!(recognizer.start_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silence_without_any_speech() {
    let (recognizer, session) = continuous_session(2000, SessionCallbacks::default());

    session.start().await.unwrap();
    recognizer.emit(RecognizerEvent::Start);

    sleep(Duration::from_millis(2100)).await;
    assert_eq!(recognizer.stop_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runtime_error_prevents_restart() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    let callbacks = SessionCallbacks::new().on_error(move |m| sink.lock().push(m.to_string()));
    let (recognizer, session) = continuous_session(5000, callbacks);

    session.start().await.unwrap();
    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit(RecognizerEvent::Error {
        message: "network unreachable".to_string(),
    });
    recognizer.emit(RecognizerEvent::End);
    sleep(Duration::from_millis(500)).await;

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert!(!snapshot.continue_listening);
    assert!(!snapshot.is_recording);
    assert_eq!(snapshot.last_error.as_deref(), Some("network unreachable"));
    assert_eq!(recognizer.start_count(), 1, "broken recognizer is never retried");
    assert_eq!(*errors.lock(), vec!["network unreachable".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_restart_grace_period() {
    let (recognizer, session) = continuous_session(5000, SessionCallbacks::default());

    session.start().await.unwrap();
    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit_final("one");
    recognizer.emit(RecognizerEvent::End);
    settle().await;
    assert_eq!(session.snapshot().state, SessionState::Restarting);

    session.stop().await.unwrap();
    sleep(Duration::from_millis(500)).await;

    assert_eq!(recognizer.start_count(), 1, "pending restart was cancelled");
    assert_eq!(session.snapshot().transcript, "one");
}

#[tokio::test(start_paused = true)]
async fn test_stop_racing_inflight_start_is_forwarded() {
    let recognizer = Arc::new(LoopbackRecognizer::new());
    recognizer.set_start_latency(Some(Duration::from_millis(50)));
    let session = Arc::new(
        SessionController::new(
            SessionConfig::continuous(Duration::from_millis(5000)),
            recognizer.clone(),
            Arc::new(AlwaysGranted),
            SessionCallbacks::default(),
        )
        .unwrap(),
    );

    let starting = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    settle().await;
    assert_eq!(recognizer.start_count(), 1);

    session.stop().await.unwrap();
    assert_eq!(recognizer.stop_count(), 0, "stop waits for the pending start");
    assert!(!session.snapshot().continue_listening);

    starting.await.unwrap().unwrap();
    assert_eq!(recognizer.stop_count(), 1);

    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit(RecognizerEvent::End);
    sleep(Duration::from_millis(500)).await;

    assert_eq!(session.snapshot().state, SessionState::Idle);
    assert_eq!(recognizer.start_count(), 1);
}

fn slow_continuous_session(latency_ms: u64) -> (Arc<LoopbackRecognizer>, Arc<SessionController>) {
    let (recognizer, session) = continuous_session(5000, SessionCallbacks::default());
    recognizer.set_start_latency(Some(Duration::from_millis(latency_ms)));
    (recognizer, Arc::new(session))
}

#[tokio::test(start_paused = true)]
async fn test_restart_waits_for_pending_start() {
    let (recognizer, session) = slow_continuous_session(200);

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    sleep(Duration::from_millis(10)).await;
    recognizer.emit(RecognizerEvent::Start);
    recognizer.emit(RecognizerEvent::End);
    settle().await;
    assert_eq!(session.snapshot().state, SessionState::Restarting);

    // Restart delay elapsed, but attempt 1 is still pending
    sleep(Duration::from_millis(150)).await;
    assert_eq!(recognizer.start_count(), 1);
    assert_eq!(session.snapshot().state, SessionState::Restarting);

    first.await.unwrap().unwrap();
    assert_eq!(recognizer.start_count(), 2);
    assert_eq!(session.stats().restart_count, 1);

    recognizer.emit(RecognizerEvent::Start);
    settle().await;
    assert_eq!(session.snapshot().state, SessionState::Listening);
    assert!(session.snapshot().continue_listening);
}

#[tokio::test(start_paused = true)]
async fn test_held_restart_dropped_when_pending_start_fails() {
    let (recognizer, session) = slow_continuous_session(200);
    recognizer.fail_next_start("engine busy");

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    sleep(Duration::from_millis(10)).await;
    recognizer.emit(RecognizerEvent::End);
    sleep(Duration::from_millis(150)).await;
    assert_eq!(recognizer.start_count(), 1);

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, SessionError::RecognizerStart(_)));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert!(!snapshot.continue_listening);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Failed to start recording: engine busy")
    );

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(recognizer.start_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_then_reset_recovers() {
    let (recognizer, session) = continuous_session(5000, SessionCallbacks::default());
    recognizer.fail_next_start("engine busy");

    let err = session.start().await.unwrap_err();
    assert_eq!(err, SessionError::RecognizerStart("engine busy".to_string()));

    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Errored);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Failed to start recording: engine busy")
    );

    session.reset();
    let snapshot = session.snapshot();
    assert_eq!(snapshot.state, SessionState::Idle);
    assert!(snapshot.last_error.is_none());

    session.start().await.unwrap();
    assert_eq!(recognizer.start_count(), 2);
}
