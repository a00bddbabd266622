/// Live event router: owns the per-user channel subscription and sends each
/// inbound message to exactly one of the open thread or the conversation index
use crate::channel::{ChannelService, SubscriptionGuard};
use crate::error::{MessagingError, Result};
use crate::messenger_types::{Message, MessengerEvent};
use crate::session::SharedState;
use crate::utils::EventEmitter;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where an inbound message ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    ActiveThread,
    ConversationIndex,
}

/// Subscription state of the router
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected { channel: String },
}

struct Link {
    channel: String,
    subscription: SubscriptionGuard,
    pump: JoinHandle<()>,
}

impl Drop for Link {
    fn drop(&mut self) {
        // The subscription guard is released right after this
        self.pump.abort();
    }
}

type LinkSlot = Arc<Mutex<Option<Link>>>;

pub struct LiveEventRouter {
    channel: Mutex<Arc<dyn ChannelService>>,
    link: LinkSlot,
}

impl LiveEventRouter {
    pub fn new(channel: Arc<dyn ChannelService>) -> Self {
        Self {
            channel: Mutex::new(channel),
            link: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> LinkState {
        match lock_slot(&self.link).as_ref() {
            Some(link) => LinkState::Connected {
                channel: link.channel.clone(),
            },
            None => LinkState::Disconnected,
        }
    }

    /// Disconnected → Connected(channel_name). At most one listener per
    /// router: connecting again without `disconnect` is an error.
    pub(crate) fn connect(&self, channel_name: &str, state: SharedState, events: EventEmitter) -> Result<()> {
        let mut link = self.lock();
        if let Some(existing) = link.as_ref() {
            if existing.channel == channel_name {
                return Err(MessagingError::DuplicateSubscription(channel_name.to_string()));
            }
            return Err(MessagingError::Session(format!(
                "Already connected on channel {}; end the session first",
                existing.channel
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = SubscriptionGuard::acquire(self.channel(), channel_name, tx)?;
        let subscription_id = subscription.handle().id;
        // The slot stays locked until the link is stored, so a pump that
        // ends right away still finds it
        let pump = tokio::spawn(pump(
            rx,
            state,
            events,
            Arc::downgrade(&self.link),
            subscription_id,
        ));

        *link = Some(Link {
            channel: channel_name.to_string(),
            subscription,
            pump,
        });
        info!("Listening on channel {}", channel_name);
        Ok(())
    }

    /// Connected → Disconnected. Returns the released channel name.
    pub(crate) fn disconnect(&self) -> Option<String> {
        let link = self.lock().take()?;
        let channel = link.channel.clone();
        drop(link);
        info!("Stopped listening on channel {}", channel);
        Some(channel)
    }

    pub(crate) fn publish(&self, channel_name: &str, message: &Message) -> Result<()> {
        self.channel().publish(channel_name, message)
    }

    /// Swap the transport, e.g. for a fresh hub connection after the old
    /// one dropped. Only allowed while disconnected.
    pub(crate) fn set_channel(&self, channel: Arc<dyn ChannelService>) -> Result<()> {
        let link = self.lock();
        if let Some(existing) = link.as_ref() {
            return Err(MessagingError::Session(format!(
                "Cannot replace the channel while listening on {}",
                existing.channel
            )));
        }
        *self.channel.lock().unwrap_or_else(|e| e.into_inner()) = channel;
        Ok(())
    }

    fn channel(&self) -> Arc<dyn ChannelService> {
        self.channel.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Link>> {
        lock_slot(&self.link)
    }
}

fn lock_slot(slot: &Mutex<Option<Link>>) -> MutexGuard<'_, Option<Link>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Drain the subscription in delivery order.
///
/// When the transport closes the stream, the link is released and
/// observers get `Disconnected`; `disconnect` aborts the pump instead, so
/// this path only runs on transport loss.
async fn pump(
    mut rx: mpsc::UnboundedReceiver<Message>,
    state: SharedState,
    events: EventEmitter,
    slot: Weak<Mutex<Option<Link>>>,
    subscription_id: Uuid,
) {
    while let Some(message) = rx.recv().await {
        if dispatch(&state, &events, message).await.is_none() {
            debug!("Dropped live message: no session identity");
        }
    }

    // Gone when the router itself was dropped
    let Some(slot) = slot.upgrade() else {
        return;
    };
    let lost = {
        let mut link = lock_slot(&slot);
        let ours = link
            .as_ref()
            .is_some_and(|l| l.subscription.handle().id == subscription_id);
        if ours {
            link.take()
        } else {
            None
        }
    };
    if let Some(link) = lost {
        let channel = link.channel.clone();
        warn!("Live channel {} closed by the transport", channel);
        events.emit(MessengerEvent::Disconnected { channel });
        // Aborts this task's own handle; nothing awaits after it
        drop(link);
    } else {
        debug!("Live event stream ended");
    }
}

/// Route one inbound message. `None` when no session identity is set.
///
/// The decision and the mutation happen under one write lock, so a
/// concurrent `open` cannot slip in between.
pub(crate) async fn dispatch(state: &SharedState, events: &EventEmitter, message: Message) -> Option<Route> {
    let mut st = state.write().await;
    let self_id = st.self_id.clone()?;
    let counterpart = message.counterpart_of(&self_id).to_string();

    if st.thread.active_counterpart() == Some(counterpart.as_str()) {
        if st.thread.append(message.clone()) {
            debug!("Live message from {} appended to open thread", message.sender_id);
            events.emit(MessengerEvent::ThreadAppended {
                counterpart_id: counterpart,
                message,
            });
        } else {
            debug!("Live message for {} already in thread", counterpart);
        }
        return Some(Route::ActiveThread);
    }

    // Own messages echoed from another device are already seen
    let unseen = message.sender_id != self_id;
    let summary = st
        .index
        .upsert_from_live_message(&message, &counterpart, unseen)
        .clone();
    debug!("Live message from {} recorded in conversation index", message.sender_id);
    events.emit(MessengerEvent::ConversationUpdated { summary });
    Some(Route::ConversationIndex)
}
