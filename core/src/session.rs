/// Messaging session: the explicit context holding the conversation index,
/// the open thread and the live router for one signed-in user
use crate::channel::ChannelService;
use crate::config::Config;
use crate::conversation_index::ConversationIndex;
use crate::error::{MessagingError, Result};
use crate::messenger_types::{ConversationSummary, Message, MessengerEvent};
use crate::rest::RestService;
use crate::router::{self, LinkState, LiveEventRouter, Route};
use crate::thread_store::{ActiveThread, ActiveThreadStore};
use crate::utils::EventEmitter;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Mutable state shared with the router's pump task
#[derive(Debug)]
pub struct MessagingState {
    pub(crate) self_id: Option<String>,
    /// Bumped on every `start` and `end`; loads from an older session are
    /// discarded even when the identity is the same
    pub(crate) epoch: u64,
    pub(crate) index: ConversationIndex,
    pub(crate) thread: ActiveThreadStore,
}

pub(crate) type SharedState = Arc<RwLock<MessagingState>>;

pub struct MessagingSession {
    config: Config,
    rest: Arc<dyn RestService>,
    state: SharedState,
    router: LiveEventRouter,
    events: EventEmitter,
}

fn not_started() -> MessagingError {
    MessagingError::Session("No session started".to_string())
}

impl MessagingSession {
    pub fn new(config: Config, rest: Arc<dyn RestService>, channel: Arc<dyn ChannelService>) -> Self {
        let state = MessagingState {
            self_id: None,
            epoch: 0,
            index: ConversationIndex::new(config.placeholder_avatar.clone()),
            thread: ActiveThreadStore::new(),
        };
        let events = EventEmitter::new(config.event_capacity);
        Self {
            config,
            rest,
            state: Arc::new(RwLock::new(state)),
            router: LiveEventRouter::new(channel),
            events,
        }
    }

    /// Observe state changes
    pub fn subscribe_events(&self) -> broadcast::Receiver<MessengerEvent> {
        self.events.subscribe()
    }

    pub fn link_state(&self) -> LinkState {
        self.router.state()
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.router.state(), LinkState::Connected { .. })
    }

    /// Use a new transport from the next `start` on. A `TcpChannel` whose
    /// hub connection dropped stays closed, so the host hands in a fresh
    /// one before starting again. Fails while connected.
    pub fn set_channel(&self, channel: Arc<dyn ChannelService>) -> Result<()> {
        self.router.set_channel(channel)
    }

    /// Start listening as `self_id` and load the conversation index.
    ///
    /// A failed index load is logged and leaves the index empty; the
    /// session still starts.
    pub async fn start(&self, self_id: &str) -> Result<()> {
        if self_id.trim().is_empty() {
            return Err(MessagingError::Session("Empty identity".to_string()));
        }

        {
            // Hold the state lock so no live event is routed before the
            // identity is in place
            let mut st = self.state.write().await;
            self.router
                .connect(self_id, self.state.clone(), self.events.clone())?;
            st.self_id = Some(self_id.to_string());
            st.epoch += 1;
            st.index.clear();
            st.thread.close();
        }
        info!("Session started for {}", self_id);
        self.events.emit(MessengerEvent::Connected {
            channel: self_id.to_string(),
        });

        match self.load_conversations().await {
            Ok(summaries) => {
                if self.config.open_latest_on_start {
                    if let Some(latest) = summaries.first() {
                        if let Err(e) = self.open(&latest.counterpart_id).await {
                            warn!("Could not open latest conversation: {}", e);
                        }
                    }
                }
            }
            Err(e) => warn!("Could not load conversations for {}: {}", self_id, e),
        }
        Ok(())
    }

    /// Release the subscription and forget all session state
    pub async fn end(&self) {
        let released = self.router.disconnect();
        {
            let mut st = self.state.write().await;
            st.self_id = None;
            st.epoch += 1;
            st.index.clear();
            st.thread.close();
        }
        if let Some(channel) = released {
            info!("Session ended for {}", channel);
            self.events.emit(MessengerEvent::Disconnected { channel });
        }
    }

    pub async fn self_id(&self) -> Option<String> {
        self.state.read().await.self_id.clone()
    }

    /// Fetch latest-per-counterpart summaries and merge them into the index
    pub async fn load_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let (self_id, epoch) = {
            let st = self.state.read().await;
            let self_id = st.self_id.clone().ok_or_else(not_started)?;
            (self_id, st.epoch)
        };
        let fetched = self.rest.fetch_latest_conversations(&self_id).await?;

        let summaries = {
            let mut st = self.state.write().await;
            if st.epoch != epoch {
                return Err(MessagingError::Session(format!(
                    "Session for {} ended while loading conversations",
                    self_id
                )));
            }
            st.index.merge_loaded(fetched);
            // The open conversation stays seen
            let active = st.thread.active_counterpart().map(str::to_string);
            if let Some(active) = active {
                st.index.mark_seen(&active);
            }
            st.index.summaries().to_vec()
        };

        debug!("Loaded {} conversations for {}", summaries.len(), self_id);
        self.events.emit(MessengerEvent::ConversationsLoaded {
            count: summaries.len(),
        });
        Ok(summaries)
    }

    /// Open the conversation with `counterpart_id` and load its history.
    ///
    /// The counterpart becomes active immediately. If another `open` or a
    /// `close` happens before the history arrives, the response is dropped
    /// and `MessagingError::Superseded` is returned.
    pub async fn open(&self, counterpart_id: &str) -> Result<Vec<Message>> {
        let (self_id, ticket) = {
            let mut st = self.state.write().await;
            let self_id = st.self_id.clone().ok_or_else(not_started)?;
            let ticket = st.thread.begin_open(counterpart_id);
            st.index.mark_seen(counterpart_id);
            (self_id, ticket)
        };
        debug!("Opening conversation with {}", counterpart_id);

        let history = match self.rest.fetch_thread(&self_id, counterpart_id).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Could not load conversation with {}: {}", counterpart_id, e);
                return Err(e);
            }
        };

        let messages = {
            let mut st = self.state.write().await;
            match st.thread.commit_open(&ticket, history) {
                Some(thread) => thread.messages.clone(),
                None => return Err(MessagingError::Superseded(ticket.counterpart_id().to_string())),
            }
        };
        self.events.emit(MessengerEvent::ThreadOpened {
            counterpart_id: counterpart_id.to_string(),
            message_count: messages.len(),
        });

        if self.config.sync_read_state {
            if let Err(e) = self.rest.mark_read(&self_id, counterpart_id).await {
                warn!("Could not sync read state for {}: {}", counterpart_id, e);
            }
        }
        Ok(messages)
    }

    /// Close the open conversation. In-flight opens are discarded.
    pub async fn close(&self) -> Option<ActiveThread> {
        self.state.write().await.thread.close()
    }

    /// Send `body` to `counterpart_id`.
    ///
    /// The message shows up in the open thread right away; live delivery
    /// and persistence are fire-and-forget and only logged on failure.
    pub async fn send_message(&self, counterpart_id: &str, body: &str) -> Result<Message> {
        if body.trim().is_empty() {
            return Err(MessagingError::InvalidMessage("Empty message body".to_string()));
        }

        let message = {
            let mut st = self.state.write().await;
            let self_id = st.self_id.clone().ok_or_else(not_started)?;
            if counterpart_id == self_id {
                return Err(MessagingError::InvalidMessage("Cannot message yourself".to_string()));
            }
            let message = Message::new(self_id, counterpart_id, body);
            if st.thread.append(message.clone()) {
                self.events.emit(MessengerEvent::ThreadAppended {
                    counterpart_id: counterpart_id.to_string(),
                    message: message.clone(),
                });
            }
            message
        };

        if let Err(e) = self.router.publish(counterpart_id, &message) {
            warn!("Live delivery to {} failed: {}", counterpart_id, e);
        }
        if self.config.persist_sent_messages {
            if let Err(e) = self.rest.post_message(&message).await {
                warn!("Could not persist message to {}: {}", counterpart_id, e);
            }
        }
        Ok(message)
    }

    /// Route a message the host received by other means
    pub async fn route_event(&self, message: Message) -> Result<Route> {
        router::dispatch(&self.state, &self.events, message)
            .await
            .ok_or_else(not_started)
    }

    pub async fn mark_seen(&self, counterpart_id: &str) -> bool {
        self.state.write().await.index.mark_seen(counterpart_id)
    }

    pub async fn conversations(&self) -> Vec<ConversationSummary> {
        self.state.read().await.index.summaries().to_vec()
    }

    pub async fn conversation(&self, counterpart_id: &str) -> Option<ConversationSummary> {
        self.state.read().await.index.get(counterpart_id).cloned()
    }

    pub async fn unseen_count(&self) -> usize {
        self.state.read().await.index.unseen_count()
    }

    pub async fn active_counterpart(&self) -> Option<String> {
        self.state
            .read()
            .await
            .thread
            .active_counterpart()
            .map(str::to_string)
    }

    pub async fn thread(&self) -> Option<ActiveThread> {
        self.state.read().await.thread.thread().cloned()
    }
}
