//! Event notifier
//!
//! Installations hand their lifecycle events to a notifier once the change
//! that produced them has been stored. Delivery to subscribers is best
//! effort: a lagging or missing subscriber never fails the mutation.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::models::InstallationEvent;

/// Sink for installation lifecycle events
pub trait EventNotifier: Send + Sync {
    fn notify(&self, event: &InstallationEvent);
}

/// Notifier fanning events out over a broadcast channel
pub struct BroadcastNotifier {
    sender: broadcast::Sender<InstallationEvent>,
}

impl BroadcastNotifier {
    /// Create a notifier buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Register a new subscriber
    pub fn subscribe(&self) -> broadcast::Receiver<InstallationEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventNotifier for BroadcastNotifier {
    fn notify(&self, event: &InstallationEvent) {
        info!(
            event = event.event_type(),
            installation_id = %event.installation_id(),
            "Installation event"
        );
        if self.sender.send(event.clone()).is_err() {
            debug!("No subscribers for {}", event.event_type());
        }
    }
}
