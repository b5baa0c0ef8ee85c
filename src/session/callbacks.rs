use std::fmt;
use std::sync::Arc;

type TextCallback = Arc<dyn Fn(&str) + Send + Sync>;
type SignalCallback = Arc<dyn Fn() + Send + Sync>;

/// Notification produced by a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Started,
    Stopped,
    PartialResult(String),
    Result(String),
    Error(String),
}

/// Optional host callbacks, invoked in transition order
#[derive(Clone, Default)]
pub struct SessionCallbacks {
    on_start: Option<SignalCallback>,
    on_stop: Option<SignalCallback>,
    on_result: Option<TextCallback>,
    on_partial_result: Option<TextCallback>,
    on_error: Option<TextCallback>,
}

impl SessionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fired on the first recognizer start of a session
    pub fn on_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Fired whenever the session goes back to idle
    pub fn on_stop(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stop = Some(Arc::new(f));
        self
    }

    /// Fired with the transcript on every accepted final result
    pub fn on_result(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_result = Some(Arc::new(f));
        self
    }

    /// Fired with the best candidate on every partial result
    pub fn on_partial_result(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_partial_result = Some(Arc::new(f));
        self
    }

    /// Fired with the message of every recorded error
    pub fn on_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn dispatch(&self, notification: &Notification) {
        match notification {
            Notification::Started => {
                if let Some(f) = &self.on_start {
                    f();
                }
            }
            Notification::Stopped => {
                if let Some(f) = &self.on_stop {
                    f();
                }
            }
            Notification::PartialResult(text) => {
                if let Some(f) = &self.on_partial_result {
                    f(text);
                }
            }
            Notification::Result(text) => {
                if let Some(f) = &self.on_result {
                    f(text);
                }
            }
            Notification::Error(message) => {
                if let Some(f) = &self.on_error {
                    f(message);
                }
            }
        }
    }
}

impl fmt::Debug for SessionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCallbacks")
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .field("on_result", &self.on_result.is_some())
            .field("on_partial_result", &self.on_partial_result.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
