// Single-owner event subscription for a recognizer
//
// A recognizer has exactly one event stream consumer at a time. Subscribing
// replaces (and thereby closes) the previous consumer's stream, and dropping a
// `Subscription` releases the slot, so two controllers can never react to the
// same events.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::backend::RecognizerEvent;

struct Slot {
    id: u64,
    tx: mpsc::UnboundedSender<RecognizerEvent>,
}

#[derive(Default)]
struct HubInner {
    slot: Mutex<Option<Slot>>,
    next_id: AtomicU64,
}

/// Fan-in point between a recognizer implementation and its one subscriber
#[derive(Clone, Default)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new subscriber, releasing the previous one
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = mpsc::unbounded_channel();

        let previous = self.inner.slot.lock().replace(Slot { id, tx });
        if let Some(previous) = previous {
            warn!(
                "Replacing recognizer subscription {} with {}",
                previous.id, id
            );
        }

        Subscription {
            id,
            events: rx,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Deliver an event to the current subscriber
    ///
    /// Returns `false` if nobody is subscribed.
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        let mut slot = self.inner.slot.lock();
        match slot.as_ref() {
            Some(current) => {
                if current.tx.send(event).is_err() {
                    debug!("Subscriber {} went away, clearing slot", current.id);
                    *slot = None;
                    return false;
                }
                true
            }
            None => {
                debug!("Dropping {} event: no subscriber", event.kind());
                false
            }
        }
    }

    /// Whether a subscription is currently installed
    pub fn has_subscriber(&self) -> bool {
        self.inner.slot.lock().is_some()
    }
}

/// Owned handle on a recognizer's event stream
///
/// Dropping it releases the recognizer's event slot.
pub struct Subscription {
    id: u64,
    events: mpsc::UnboundedReceiver<RecognizerEvent>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// Subscription identifier (unique per hub)
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Detachable handle that can release this subscription from elsewhere
    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.id,
            hub: self.hub.clone(),
        }
    }

    /// Receive the next event
    ///
    /// Returns `None` once the subscription has been replaced or the
    /// recognizer is gone.
    pub async fn recv(&mut self) -> Option<RecognizerEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        release(&self.hub, self.id);
    }
}

/// Releases a [`Subscription`] without owning its event stream
#[derive(Clone)]
pub struct SubscriptionHandle {
    id: u64,
    hub: Weak<HubInner>,
}

impl SubscriptionHandle {
    /// Clear the recognizer's event slot if it still belongs to this subscription
    ///
    /// The subscriber's stream ends once buffered events are drained. Returns
    /// whether the slot was released by this call.
    pub fn release(&self) -> bool {
        release(&self.hub, self.id)
    }
}

fn release(hub: &Weak<HubInner>, id: u64) -> bool {
    let Some(hub) = hub.upgrade() else {
        return false;
    };
    let mut slot = hub.slot.lock();
    if slot.as_ref().map(|s| s.id) == Some(id) {
        *slot = None;
        debug!("Released recognizer subscription {}", id);
        return true;
    }
    false
}
