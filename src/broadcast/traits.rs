//! Collaborator seams: the transport and the two generators.

use async_trait::async_trait;
use teloxide::types::ChatId;

use crate::broadcast::error::{GenerationError, TransportError};

/// One inbound text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundUpdate {
    pub chat_id: ChatId,
    pub text: String,
    /// Authored by this bot.
    pub is_from_self: bool,
}

impl InboundUpdate {
    pub fn new(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            is_from_self: false,
        }
    }

    pub fn from_self(chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            is_from_self: true,
            ..Self::new(chat_id, text)
        }
    }
}

/// Messaging transport.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;

    /// Send an OGG/Opus voice note.
    async fn send_audio(&self, chat_id: ChatId, audio: Vec<u8>) -> Result<(), TransportError>;

    /// Long-poll for the next batch of updates. Each call resumes after the
    /// last update already returned, so the stream survives a failed call.
    async fn poll_updates(&self) -> Result<Vec<InboundUpdate>, TransportError>;
}

/// Writes the next message for a chat from its recent history.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, history: &[String]) -> Result<String, GenerationError>;
}

/// Turns text into speech.
#[async_trait]
pub trait VoiceGenerator: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Vec<u8>, GenerationError>;

    async fn list_voices(&self) -> Vec<String>;
}
