//! Telegram transport using teloxide.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::{AllowedUpdate, InputFile, UpdateKind};
use tracing::{info, warn};

use crate::broadcast::command::Command;
use crate::broadcast::error::TransportError;
use crate::broadcast::traits::{InboundUpdate, Messenger};

/// Telegram API client.
pub struct TelegramClient {
    bot: Bot,
    bot_user_id: Option<UserId>,
    bot_username: Option<String>,
    poll_timeout_secs: u32,
    /// Next update id to ask for.
    offset: AtomicI32,
}

impl TelegramClient {
    /// Build a client and look up who the bot is.
    pub async fn connect(bot: Bot, poll_timeout_secs: u32) -> Self {
        let (bot_user_id, bot_username) = match bot.get_me().await {
            Ok(me) => {
                info!("Bot user ID: {}, username: @{}", me.id, me.username());
                (Some(me.id), Some(me.username().to_string()))
            }
            Err(e) => {
                warn!("Failed to get bot info: {e}");
                (None, None)
            }
        };

        Self {
            bot,
            bot_user_id,
            bot_username,
            poll_timeout_secs,
            offset: AtomicI32::new(0),
        }
    }

    pub fn bot_username(&self) -> Option<&str> {
        self.bot_username.as_deref()
    }

    /// Register the command menu. Failure only costs the menu.
    pub async fn register_commands(&self) {
        match self.bot.set_my_commands(Command::bot_commands()).await {
            Ok(_) => info!("Registered bot commands"),
            Err(e) => warn!("Failed to register bot commands: {e}"),
        }
    }

    fn to_inbound(&self, msg: &Message) -> Option<InboundUpdate> {
        let text = msg.text()?;
        let is_from_self = match (&msg.from, self.bot_user_id) {
            (Some(user), Some(me)) => user.id == me,
            _ => false,
        };
        Some(InboundUpdate {
            chat_id: msg.chat.id,
            text: text.to_string(),
            is_from_self,
        })
    }
}

fn transport_error(e: RequestError) -> TransportError {
    match e {
        RequestError::Api(api) => TransportError::Api(api.to_string()),
        other => TransportError::Network(other.to_string()),
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.bot
            .send_message(chat_id, text)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to send message to chat {}: {e}", chat_id.0);
                transport_error(e)
            })
    }

    async fn send_audio(&self, chat_id: ChatId, audio: Vec<u8>) -> Result<(), TransportError> {
        info!("🔊 Sending voice to chat {} ({} bytes)", chat_id.0, audio.len());
        let input_file = InputFile::memory(audio).file_name("voice.ogg");

        self.bot
            .send_voice(chat_id, input_file)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!("Failed to send voice to chat {}: {e}", chat_id.0);
                transport_error(e)
            })
    }

    /// Long-poll for new messages. The offset moves past the whole batch as
    /// soon as it arrives, so delivery is at most once: Telegram will not
    /// resend an update the caller failed to handle.
    async fn poll_updates(&self) -> Result<Vec<InboundUpdate>, TransportError> {
        let updates = self
            .bot
            .get_updates()
            .offset(self.offset.load(Ordering::SeqCst))
            .timeout(self.poll_timeout_secs)
            .allowed_updates(vec![AllowedUpdate::Message])
            .await
            .map_err(transport_error)?;

        let mut inbound = Vec::with_capacity(updates.len());
        for update in updates {
            self.offset.store(update.id.0 as i32 + 1, Ordering::SeqCst);
            if let UpdateKind::Message(ref msg) = update.kind
                && let Some(converted) = self.to_inbound(msg)
            {
                inbound.push(converted);
            }
        }
        Ok(inbound)
    }
}
