// Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use menteechat_core::channel::MemoryHub;
use menteechat_core::rest::RestService;
use menteechat_core::{
    Config, ConversationSummary, CounterpartProfile, Message, MessagingError, MessagingSession,
    MessengerEvent, Result,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use tokio::time::timeout;

pub fn msg(from: &str, to: &str, body: &str, ts: i64) -> Message {
    Message {
        id: None,
        sender_id: from.to_string(),
        recipient_id: to.to_string(),
        body: body.to_string(),
        created_at: ts,
    }
}

pub fn summary(other: &str, name: &str, latest: Message) -> ConversationSummary {
    ConversationSummary {
        counterpart_id: other.to_string(),
        counterpart: CounterpartProfile {
            name: name.to_string(),
            image: None,
        },
        latest_message: latest,
        unseen: false,
    }
}

/// In-memory REST backend with switchable failures and per-thread gates
pub struct FakeRest {
    conversations: Mutex<Option<Vec<ConversationSummary>>>,
    threads: Mutex<HashMap<String, Vec<Message>>>,
    gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    conversations_gate: Mutex<Option<oneshot::Receiver<()>>>,
    conversation_fetches: AtomicUsize,
    fail_threads: AtomicBool,
    pub posted: Mutex<Vec<Message>>,
    pub read_marks: Mutex<Vec<(String, String)>>,
}

impl FakeRest {
    pub fn new() -> Self {
        Self {
            conversations: Mutex::new(Some(Vec::new())),
            threads: Mutex::new(HashMap::new()),
            gates: Mutex::new(HashMap::new()),
            conversations_gate: Mutex::new(None),
            conversation_fetches: AtomicUsize::new(0),
            fail_threads: AtomicBool::new(false),
            posted: Mutex::new(Vec::new()),
            read_marks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_conversations(&self, list: Vec<ConversationSummary>) {
        *self.conversations.lock().unwrap() = Some(list);
    }

    pub fn fail_conversations(&self) {
        *self.conversations.lock().unwrap() = None;
    }

    pub fn fail_threads(&self) {
        self.fail_threads.store(true, Ordering::SeqCst);
    }

    pub fn set_thread(&self, counterpart: &str, messages: Vec<Message>) {
        self.threads
            .lock()
            .unwrap()
            .insert(counterpart.to_string(), messages);
    }

    /// Hold the next thread fetch for `counterpart` until the sender fires
    pub fn gate(&self, counterpart: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(counterpart.to_string(), rx);
        tx
    }

    /// Hold the next conversation list fetch; the list is read before waiting
    pub fn gate_conversations(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.conversations_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn conversation_fetches(&self) -> usize {
        self.conversation_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RestService for FakeRest {
    async fn fetch_latest_conversations(&self, _user_id: &str) -> Result<Vec<ConversationSummary>> {
        let list = self.conversations.lock().unwrap().clone();
        self.conversation_fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.conversations_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        list.ok_or_else(|| MessagingError::Fetch("backend down".to_string()))
    }

    async fn fetch_thread(&self, _self_id: &str, counterpart_id: &str) -> Result<Vec<Message>> {
        let gate = self.gates.lock().unwrap().remove(counterpart_id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_threads.load(Ordering::SeqCst) {
            return Err(MessagingError::Fetch("thread unavailable".to_string()));
        }
        let history = self
            .threads
            .lock()
            .unwrap()
            .get(counterpart_id)
            .cloned()
            .unwrap_or_default();
        Ok(history)
    }

    async fn post_message(&self, message: &Message) -> Result<()> {
        self.posted.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn mark_read(&self, recipient_id: &str, sender_id: &str) -> Result<()> {
        self.read_marks
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), sender_id.to_string()));
        Ok(())
    }
}

pub fn new_session(rest: &Arc<FakeRest>, hub: &MemoryHub, config: Config) -> MessagingSession {
    MessagingSession::new(config, rest.clone(), Arc::new(hub.clone()))
}

/// Wait for the first event matching `pred`
pub async fn wait_for<F>(rx: &mut broadcast::Receiver<MessengerEvent>, mut pred: F) -> MessengerEvent
where
    F: FnMut(&MessengerEvent) -> bool,
{
    timeout(Duration::from_secs(2), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Poll until `active_counterpart` equals `id`
pub async fn wait_until_active(session: &MessagingSession, id: &str) {
    timeout(Duration::from_secs(2), async {
        while session.active_counterpart().await.as_deref() != Some(id) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("conversation never became active");
}

/// Poll until `cond` holds
pub async fn wait_until<F: FnMut() -> bool>(mut cond: F) {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("condition never held");
}

pub fn bodies(messages: &[Message]) -> Vec<&str> {
    messages.iter().map(|m| m.body.as_str()).collect()
}
