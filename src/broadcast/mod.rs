//! Broadcast module - per-chat periodic posts with optional voice notes.

pub mod command;
pub mod error;
pub mod fire;
pub mod history;
pub mod poller;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod sender;
pub mod telegram;
pub mod timer;
pub mod traits;
pub mod translit;
pub mod tts;
pub mod writer;


pub use command::Command;
pub use error::{FireError, GenerationError, SchedulerError, TransportError};
pub use fire::{Broadcaster, FireReport, VoiceBox, VoiceOutcome, VoiceSkip};
pub use history::{HistoryStore, SharedHistory, STACK_SIZE};
pub use poller::Poller;
pub use registry::{SharedRegistry, StreamRegistry, Toggle};
pub use router::{CommandRouter, Routed};
pub use scheduler::Scheduler;
pub use sender::{IntervalRange, PeriodicSender, SenderKey, StreamKind};
pub use telegram::TelegramClient;
pub use traits::{ContentGenerator, InboundUpdate, Messenger, VoiceGenerator};
pub use tts::TtsClient;
pub use writer::NewsWriter;
