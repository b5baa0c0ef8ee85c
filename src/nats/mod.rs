pub mod client;
pub mod messages;
pub mod recognizer;

pub use client::NatsClient;
pub use messages::{ControlCommand, ControlMessage, ControlReply, EventMessage};
pub use recognizer::{NatsRecognizer, NatsRecognizerFactory};
