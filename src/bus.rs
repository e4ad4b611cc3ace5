use crate::events::Event;
use tokio::sync::broadcast;

/// Fan-out channel for cross-component notifications.
/// Publishing with no subscribers is not an error for the core.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Publish and ignore the "no receivers" case.
    pub fn emit(&self, event: Event) {
        let _ = self.tx.send(event);
    }
}
