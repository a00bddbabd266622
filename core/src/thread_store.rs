/// Active thread store: the message list of the one open conversation
use crate::messenger_types::Message;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Messages exchanged with the open counterpart, oldest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveThread {
    pub counterpart_id: String,
    pub messages: Vec<Message>,
    /// History from the backend has been committed
    pub loaded: bool,
}

impl ActiveThread {
    fn new(counterpart_id: String) -> Self {
        Self {
            counterpart_id,
            messages: Vec::new(),
            loaded: false,
        }
    }

    /// Only server ids identify a message for certain; two id-less
    /// messages with equal fields may still be distinct sends.
    fn contains_id(&self, message: &Message) -> bool {
        message.id.is_some() && self.messages.iter().any(|m| m.id == message.id)
    }
}

/// Proof that an `open` is in flight; redeemed by `commit_open`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTicket {
    counterpart_id: String,
    generation: u64,
}

impl OpenTicket {
    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }
}

#[derive(Debug, Default)]
pub struct ActiveThreadStore {
    active: Option<ActiveThread>,
    generation: u64,
}

impl ActiveThreadStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_counterpart(&self) -> Option<&str> {
        self.active.as_ref().map(|t| t.counterpart_id.as_str())
    }

    pub fn thread(&self) -> Option<&ActiveThread> {
        self.active.as_ref()
    }

    /// Make `counterpart_id` the open conversation, replacing the current
    /// thread. Live messages for it are accepted from now on; history is
    /// committed later through the returned ticket.
    pub fn begin_open(&mut self, counterpart_id: &str) -> OpenTicket {
        self.generation += 1;
        self.active = Some(ActiveThread::new(counterpart_id.to_string()));
        OpenTicket {
            counterpart_id: counterpart_id.to_string(),
            generation: self.generation,
        }
    }

    /// Whether no later open or close has happened since `ticket` was issued
    pub fn is_current(&self, ticket: &OpenTicket) -> bool {
        ticket.generation == self.generation
            && self.active_counterpart() == Some(ticket.counterpart_id.as_str())
    }

    /// Commit fetched history. Stale tickets are rejected with `None`.
    ///
    /// Messages appended live while the fetch was in flight are kept unless
    /// the history already has them. Each history entry absorbs at most one
    /// live copy, so repeated identical sends survive. The result is ordered
    /// by timestamp, ties in arrival order.
    pub fn commit_open(&mut self, ticket: &OpenTicket, history: Vec<Message>) -> Option<&ActiveThread> {
        if !self.is_current(ticket) {
            debug!("Discarding stale history for {}", ticket.counterpart_id);
            return None;
        }
        let thread = self.active.as_mut()?;

        let live = std::mem::replace(&mut thread.messages, history);
        let mut claimed = vec![false; thread.messages.len()];
        for message in live {
            let known = thread
                .messages
                .iter()
                .enumerate()
                .position(|(i, m)| !claimed[i] && m.same_as(&message));
            match known {
                Some(i) => claimed[i] = true,
                None => thread.messages.push(message),
            }
        }
        thread.messages.sort_by_key(|m| m.created_at);
        thread.loaded = true;
        Some(&*thread)
    }

    /// Append to the open thread. No-op (returns false) when nothing is open,
    /// the message belongs to another conversation, or its server id is
    /// already there.
    pub fn append(&mut self, message: Message) -> bool {
        let Some(thread) = self.active.as_mut() else {
            return false;
        };
        if !message.involves(&thread.counterpart_id) || thread.contains_id(&message) {
            return false;
        }
        thread.messages.push(message);
        true
    }

    /// Close the open conversation, if any
    pub fn close(&mut self) -> Option<ActiveThread> {
        self.generation += 1;
        self.active.take()
    }
}
