//! Mirrors log lines into a Telegram chat.
//!
//! WARN and ERROR go out at once, INFO lines are batched and flushed every
//! few seconds. Only this crate's own events are forwarded, so the HTTP and
//! teloxide chatter produced while delivering a batch never loops back in.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

const FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const MAX_BATCH: usize = 50;
/// Telegram rejects messages over 4096 chars.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Debug, PartialEq, Eq)]
enum LogMessage {
    Urgent(String),
    Info(String),
}

/// INFO lines waiting for the next flush.
#[derive(Default)]
struct LogBatch {
    lines: Vec<String>,
}

impl LogBatch {
    /// Returns true once the batch is big enough to flush early.
    fn push(&mut self, line: String) -> bool {
        self.lines.push(line);
        self.lines.len() >= MAX_BATCH
    }

    fn take(&mut self) -> Option<String> {
        if self.lines.is_empty() {
            return None;
        }
        let combined = self.lines.join("\n");
        self.lines.clear();
        Some(combined)
    }
}

pub struct TelegramLogLayer {
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl TelegramLogLayer {
    pub fn new(bot: Bot, chat_id: ChatId) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<LogMessage>();

        tokio::spawn(async move {
            let mut batch = LogBatch::default();
            let mut interval = tokio::time::interval(FLUSH_INTERVAL);

            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(LogMessage::Urgent(text)) => send_log(&bot, chat_id, &text).await,
                        Some(LogMessage::Info(text)) => {
                            if batch.push(text)
                                && let Some(combined) = batch.take()
                            {
                                send_log(&bot, chat_id, &combined).await;
                            }
                        }
                        None => break,
                    },
                    _ = interval.tick() => {
                        if let Some(combined) = batch.take() {
                            send_log(&bot, chat_id, &combined).await;
                        }
                    }
                }
            }
        });

        Self { tx }
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_MESSAGE_CHARS {
        let truncated: String = text.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        text.to_string()
    }
}

async fn send_log(bot: &Bot, chat_id: ChatId, text: &str) {
    if let Err(e) = bot.send_message(chat_id, truncate(text)).await {
        eprintln!("Failed to send log to Telegram: {e}");
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if self.message.is_empty() {
            self.message = format!("{} = {:?}", field.name(), value);
        } else {
            self.message
                .push_str(&format!(", {} = {:?}", field.name(), value));
        }
    }
}

/// None for events that stay out of the chat.
fn classify(level: Level, target: &str, message: String) -> Option<LogMessage> {
    if level > Level::INFO || !target.starts_with(env!("CARGO_CRATE_NAME")) {
        return None;
    }
    Some(match level {
        Level::ERROR => LogMessage::Urgent(format!("❌ {}", message)),
        Level::WARN => LogMessage::Urgent(format!("⚠️ {}", message)),
        _ => LogMessage::Info(message),
    })
}

impl<S: Subscriber> Layer<S> for TelegramLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let Some(msg) = classify(*metadata.level(), metadata.target(), visitor.message) else {
            return;
        };
        if self.tx.send(msg).is_err() {
            eprintln!("Log channel closed, message dropped");
        }
    }
}
