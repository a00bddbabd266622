/// Event emitter for session observers (UI, CLI, tests)
use crate::messenger_types::MessengerEvent;
use tokio::sync::broadcast;
use tracing::trace;

pub struct EventEmitter {
    tx: broadcast::Sender<MessengerEvent>,
}

impl EventEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MessengerEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: MessengerEvent) {
        // No observers is fine
        if self.tx.send(event).is_err() {
            trace!("No event observers");
        }
    }
}

impl Clone for EventEmitter {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}
