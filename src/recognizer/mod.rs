//! Recognizer adapter layer
//!
//! The session controller talks to speech engines only through the
//! [`Recognizer`] trait: three async commands plus one owned event
//! [`Subscription`].

pub mod backend;
pub mod hub;
pub mod loopback;

pub use backend::{Recognizer, RecognizerEvent, RecognizerFactory, RecognizerOptions};
pub use hub::{EventHub, Subscription, SubscriptionHandle};
pub use loopback::{LoopbackRecognizer, LoopbackRecognizerFactory, RecognizerCommand};
