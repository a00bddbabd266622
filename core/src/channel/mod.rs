/// Real-time channel service: one named channel per user identity
pub mod memory;
pub mod protocol;
pub mod tcp;

use crate::error::Result;
use crate::messenger_types::Message;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub use memory::MemoryHub;
pub use protocol::HubFrame;
pub use tcp::TcpChannel;

/// Where a subscription delivers its messages
pub type EventSink = mpsc::UnboundedSender<Message>;

/// Identifies one listener registration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub id: Uuid,
    pub channel: String,
}

/// A message published to channel X reaches only listeners subscribed to X.
///
/// All operations only enqueue work, so they are synchronous and may be
/// called from `Drop`.
pub trait ChannelService: Send + Sync {
    fn subscribe(&self, channel: &str, sink: EventSink) -> Result<SubscriptionHandle>;

    fn unsubscribe(&self, handle: &SubscriptionHandle);

    fn publish(&self, channel: &str, message: &Message) -> Result<()>;
}

/// A subscription that is released when the guard is dropped
pub struct SubscriptionGuard {
    service: Arc<dyn ChannelService>,
    handle: SubscriptionHandle,
}

impl SubscriptionGuard {
    pub fn acquire(service: Arc<dyn ChannelService>, channel: &str, sink: EventSink) -> Result<Self> {
        let handle = service.subscribe(channel, sink)?;
        debug!("Subscribed to channel {} ({})", handle.channel, handle.id);
        Ok(Self { service, handle })
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        debug!("Unsubscribing from channel {} ({})", self.handle.channel, self.handle.id);
        self.service.unsubscribe(&self.handle);
    }
}

/// Local listener table shared by the channel implementations
#[derive(Default)]
pub(crate) struct Listeners {
    by_channel: HashMap<String, Vec<(Uuid, EventSink)>>,
}

impl Listeners {
    pub(crate) fn insert(&mut self, channel: &str, sink: EventSink) -> SubscriptionHandle {
        let id = Uuid::new_v4();
        self.by_channel
            .entry(channel.to_string())
            .or_default()
            .push((id, sink));
        SubscriptionHandle {
            id,
            channel: channel.to_string(),
        }
    }

    pub(crate) fn remove(&mut self, handle: &SubscriptionHandle) -> bool {
        let Some(sinks) = self.by_channel.get_mut(&handle.channel) else {
            return false;
        };
        let before = sinks.len();
        sinks.retain(|(id, _)| *id != handle.id);
        let removed = sinks.len() != before;
        if sinks.is_empty() {
            self.by_channel.remove(&handle.channel);
        }
        removed
    }

    pub(crate) fn count(&self, channel: &str) -> usize {
        self.by_channel.get(channel).map_or(0, Vec::len)
    }

    /// Push `message` to every live sink of `channel`, pruning closed ones.
    /// Returns how many sinks received it.
    pub(crate) fn deliver(&mut self, channel: &str, message: &Message) -> usize {
        let Some(sinks) = self.by_channel.get_mut(channel) else {
            return 0;
        };
        sinks.retain(|(_, sink)| sink.send(message.clone()).is_ok());
        let delivered = sinks.len();
        if delivered == 0 {
            self.by_channel.remove(channel);
        }
        delivered
    }

    pub(crate) fn clear(&mut self) {
        self.by_channel.clear();
    }
}
