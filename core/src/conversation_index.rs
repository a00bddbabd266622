/// Conversation index: one summary per counterpart, most recently active first
use crate::messenger_types::{ConversationSummary, CounterpartProfile, Message};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ConversationIndex {
    summaries: Vec<ConversationSummary>,
    placeholder_avatar: Option<String>,
}

impl ConversationIndex {
    pub fn new(placeholder_avatar: Option<String>) -> Self {
        Self {
            summaries: Vec::new(),
            placeholder_avatar,
        }
    }

    /// Ordered summaries, most recently active first
    pub fn summaries(&self) -> &[ConversationSummary] {
        &self.summaries
    }

    pub fn get(&self, counterpart_id: &str) -> Option<&ConversationSummary> {
        self.summaries
            .iter()
            .find(|s| s.counterpart_id == counterpart_id)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    /// Number of conversations with unseen messages
    pub fn unseen_count(&self) -> usize {
        self.summaries.iter().filter(|s| s.unseen).count()
    }

    pub fn clear(&mut self) {
        self.summaries.clear();
    }

    /// Merge a fetched list into the index.
    ///
    /// Live upserts may have landed while the fetch was in flight; a live
    /// message newer than the fetched one is kept along with its unseen flag,
    /// and counterparts only known from live traffic stay in the index.
    pub fn merge_loaded(&mut self, fetched: Vec<ConversationSummary>) {
        let mut live = std::mem::take(&mut self.summaries);
        let mut merged: Vec<ConversationSummary> = Vec::with_capacity(fetched.len() + live.len());

        for mut summary in fetched {
            if merged
                .iter()
                .any(|s| s.counterpart_id == summary.counterpart_id)
            {
                debug!("Dropping duplicate summary for {}", summary.counterpart_id);
                continue;
            }
            if let Some(pos) = live
                .iter()
                .position(|s| s.counterpart_id == summary.counterpart_id)
            {
                let known = live.remove(pos);
                if known.latest_message.created_at > summary.latest_message.created_at {
                    summary.latest_message = known.latest_message;
                }
                summary.unseen |= known.unseen;
            }
            merged.push(summary);
        }

        live.extend(merged);
        live.sort_by(|a, b| b.latest_message.created_at.cmp(&a.latest_message.created_at));
        self.summaries = live;
    }

    /// Record a live message for `counterpart_id` and move its summary to
    /// the front. A first-contact counterpart gets a placeholder display.
    pub fn upsert_from_live_message(
        &mut self,
        message: &Message,
        counterpart_id: &str,
        unseen: bool,
    ) -> &ConversationSummary {
        let summary = match self
            .summaries
            .iter()
            .position(|s| s.counterpart_id == counterpart_id)
        {
            Some(pos) => {
                let mut summary = self.summaries.remove(pos);
                if message.created_at >= summary.latest_message.created_at {
                    summary.latest_message = message.clone();
                }
                summary.unseen = unseen;
                summary
            }
            None => {
                debug!("First contact from {}, using placeholder display", counterpart_id);
                ConversationSummary {
                    counterpart_id: counterpart_id.to_string(),
                    counterpart: CounterpartProfile::placeholder(
                        counterpart_id,
                        self.placeholder_avatar.as_deref(),
                    ),
                    latest_message: message.clone(),
                    unseen,
                }
            }
        };
        self.summaries.insert(0, summary);
        &self.summaries[0]
    }

    /// Clear the unseen flag. Returns whether a summary exists.
    pub fn mark_seen(&mut self, counterpart_id: &str) -> bool {
        match self
            .summaries
            .iter_mut()
            .find(|s| s.counterpart_id == counterpart_id)
        {
            Some(summary) => {
                summary.unseen = false;
                true
            }
            None => false,
        }
    }
}
