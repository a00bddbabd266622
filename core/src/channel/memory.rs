/// In-process channel hub
use super::{ChannelService, EventSink, Listeners, SubscriptionHandle};
use crate::error::Result;
use crate::messenger_types::Message;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Channel service that delivers within the current process
#[derive(Clone, Default)]
pub struct MemoryHub {
    listeners: Arc<Mutex<Listeners>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of listeners currently registered on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().count(channel)
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChannelService for MemoryHub {
    fn subscribe(&self, channel: &str, sink: EventSink) -> Result<SubscriptionHandle> {
        Ok(self.lock().insert(channel, sink))
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.lock().remove(handle);
    }

    fn publish(&self, channel: &str, message: &Message) -> Result<()> {
        let delivered = self.lock().deliver(channel, message);
        debug!("Published on {} to {} listeners", channel, delivered);
        Ok(())
    }
}
