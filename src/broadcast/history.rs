//! Recent conversation kept per chat.
//!
//! The text generator is conditioned on the last few messages people wrote in
//! a chat. Nothing here is persisted; history lives as long as the process.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use teloxide::types::ChatId;
use tokio::sync::Mutex;
use tracing::debug;

/// Default number of messages remembered per chat.
pub const STACK_SIZE: usize = 16;

/// History shared by the inbound loop (writer) and fires (readers).
pub type SharedHistory = Arc<Mutex<HistoryStore>>;

/// Bounded FIFO of one chat's recent messages.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<String>,
    capacity: usize,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a message, evicting the oldest one once over capacity.
    pub fn push(&mut self, text: impl Into<String>) {
        self.messages.push_back(text.into());
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Histories for every chat the bot has heard from.
pub struct HistoryStore {
    chats: HashMap<ChatId, ConversationHistory>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            chats: HashMap::new(),
            capacity,
        }
    }

    /// Record a message. The chat's history is created on first use.
    pub fn append(&mut self, chat_id: ChatId, text: impl Into<String>) {
        let capacity = self.capacity;
        let history = self
            .chats
            .entry(chat_id)
            .or_insert_with(|| ConversationHistory::new(capacity));
        history.push(text);
        debug!("History for chat {}: {} message(s)", chat_id.0, history.len());
    }

    /// Current history, oldest first. Empty for unknown chats.
    pub fn snapshot(&self, chat_id: ChatId) -> Vec<String> {
        self.chats
            .get(&chat_id)
            .map(ConversationHistory::to_vec)
            .unwrap_or_default()
    }

    pub fn len(&self, chat_id: ChatId) -> usize {
        self.chats.get(&chat_id).map_or(0, ConversationHistory::len)
    }

    pub fn shared(self) -> SharedHistory {
        Arc::new(Mutex::new(self))
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new(STACK_SIZE)
    }
}
