pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod permission;
pub mod presentation;
pub mod recognizer;
pub mod session;

pub use config::Config;
pub use error::SessionError;
pub use http::{create_router, AppState};
pub use nats::{NatsClient, NatsRecognizer, NatsRecognizerFactory};
pub use permission::{AlwaysGranted, PermissionGate, StaticPermission};
pub use presentation::{MicrophoneControls, MicrophoneProps, VoiceMicrophone, VoiceRecognition};
pub use recognizer::{
    EventHub, LoopbackRecognizer, LoopbackRecognizerFactory, Recognizer, RecognizerCommand,
    RecognizerEvent,
    RecognizerFactory, RecognizerOptions, Subscription,
};
pub use session::{
    Notification, SessionCallbacks, SessionConfig, SessionController, SessionMode,
    SessionSnapshot, SessionState, SessionStats,
};
