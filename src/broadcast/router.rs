//! Routes inbound messages to stream toggles or chat history.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::broadcast::command::{Command, Parsed};
use crate::broadcast::history::SharedHistory;
use crate::broadcast::registry::{SharedRegistry, Toggle};
use crate::broadcast::traits::InboundUpdate;

/// What the router did with an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Toggled { command: Command, toggle: Toggle },
    /// A stream command for a chat that never sent /start.
    NotScheduled(Command),
    /// Appended to the chat's history.
    Recorded,
    /// Written by the bot itself.
    IgnoredSelf,
    /// Command addressed to another bot.
    IgnoredForeign,
}

pub struct CommandRouter {
    registry: SharedRegistry,
    history: SharedHistory,
    bot_username: Option<String>,
}

impl CommandRouter {
    pub fn new(registry: SharedRegistry, history: SharedHistory, bot_username: Option<String>) -> Self {
        Self {
            registry,
            history,
            bot_username,
        }
    }

    pub async fn handle(&self, update: InboundUpdate, now: DateTime<Utc>) -> Routed {
        if update.is_from_self {
            return Routed::IgnoredSelf;
        }
        let chat_id = update.chat_id;

        match Command::parse(&update.text, self.bot_username.as_deref()) {
            Parsed::Command(command) => {
                let mut registry = self.registry.lock().await;
                if command == Command::Start {
                    registry.ensure_chat(chat_id);
                }
                match registry.toggle(chat_id, command.stream(), now) {
                    Some(toggle) => {
                        info!("/{} in chat {}: {:?}", command.name(), chat_id.0, toggle);
                        Routed::Toggled { command, toggle }
                    }
                    None => {
                        info!("Messaging is not scheduled for chat {}. Command: {}", chat_id.0, command.name());
                        Routed::NotScheduled(command)
                    }
                }
            }
            Parsed::ForeignCommand => {
                debug!("Ignoring command for another bot in chat {}", chat_id.0);
                Routed::IgnoredForeign
            }
            Parsed::Text => {
                self.history.lock().await.append(chat_id, update.text);
                Routed::Recorded
            }
        }
    }
}
