//! One fire: generate a post, send it, maybe voice it.

use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use tracing::{info, warn};

use crate::broadcast::error::FireError;
use crate::broadcast::history::SharedHistory;
use crate::broadcast::sender::SenderKey;
use crate::broadcast::traits::{ContentGenerator, Messenger, VoiceGenerator};
use crate::broadcast::translit;

/// Default voice draw threshold: a draw in `[0, 10)` must reach it.
pub const VOICE_THRESHOLD: u8 = 7;

/// Voice generator plus the voices it offered at startup.
pub struct VoiceBox {
    generator: Arc<dyn VoiceGenerator>,
    voices: Vec<String>,
}

impl VoiceBox {
    pub fn new(generator: Arc<dyn VoiceGenerator>, voices: Vec<String>) -> Self {
        Self { generator, voices }
    }

    /// Ask the generator for its voices once and keep them.
    pub async fn discover(generator: Arc<dyn VoiceGenerator>) -> Self {
        let voices = generator.list_voices().await;
        info!("Available voices: {:?}", voices);
        Self::new(generator, voices)
    }

    pub fn voices(&self) -> &[String] {
        &self.voices
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceSkip {
    /// No voice generator or no voices.
    Disabled,
    /// The draw said no this time.
    NotDrawn,
    /// The text stage failed, so there is nothing to voice.
    NoText,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceOutcome {
    Sent { voice_id: String },
    Skipped(VoiceSkip),
    Failed(FireError),
}

/// Per-stage result of one fire.
#[derive(Debug, Clone)]
pub struct FireReport {
    pub key: SenderKey,
    pub message: Option<String>,
    pub text: Result<(), FireError>,
    pub voice: VoiceOutcome,
}

impl FireReport {
    pub fn is_success(&self) -> bool {
        self.text.is_ok() && !matches!(self.voice, VoiceOutcome::Failed(_))
    }
}

/// Runs fires against the collaborators.
pub struct Broadcaster {
    messenger: Arc<dyn Messenger>,
    writer: Arc<dyn ContentGenerator>,
    voice: Option<VoiceBox>,
    history: SharedHistory,
    voice_threshold: u8,
}

impl Broadcaster {
    pub fn new(messenger: Arc<dyn Messenger>, writer: Arc<dyn ContentGenerator>, history: SharedHistory) -> Self {
        Self {
            messenger,
            writer,
            voice: None,
            history,
            voice_threshold: VOICE_THRESHOLD,
        }
    }

    pub fn with_voice(mut self, voice: VoiceBox) -> Self {
        self.voice = Some(voice);
        self
    }

    /// 0 voices every post, 10 never does.
    pub fn with_voice_threshold(mut self, threshold: u8) -> Self {
        self.voice_threshold = threshold;
        self
    }

    /// Generate and send one post for `key`, then maybe a voice note.
    ///
    /// Never fails as a whole; each stage reports into the returned report.
    pub async fn fire(&self, key: SenderKey) -> FireReport {
        let chat_id = key.chat_id;
        let history = self.history.lock().await.snapshot(chat_id);

        let message = match self.writer.generate(&history).await {
            Ok(message) => message,
            Err(e) => {
                let err = FireError::Generate(e);
                warn!("Chat {}: {}", chat_id.0, err);
                return FireReport {
                    key,
                    message: None,
                    text: Err(err),
                    voice: VoiceOutcome::Skipped(VoiceSkip::NoText),
                };
            }
        };

        if let Err(e) = self.messenger.send_text(chat_id, &message).await {
            let err = FireError::SendText(e);
            warn!("Chat {}: {}", chat_id.0, err);
            return FireReport {
                key,
                message: Some(message),
                text: Err(err),
                voice: VoiceOutcome::Skipped(VoiceSkip::NoText),
            };
        }
        info!("Sent {} message to chat {}: {}", key.kind, chat_id.0, preview(&message));

        let voice = self.send_voice(key, &message).await;
        FireReport {
            key,
            message: Some(message),
            text: Ok(()),
            voice,
        }
    }

    async fn send_voice(&self, key: SenderKey, message: &str) -> VoiceOutcome {
        let Some(ref voice) = self.voice else {
            return VoiceOutcome::Skipped(VoiceSkip::Disabled);
        };
        if voice.voices.is_empty() {
            return VoiceOutcome::Skipped(VoiceSkip::Disabled);
        }
        let drawn = {
            let mut rng = rand::rng();
            pick_voice(&mut rng, &voice.voices, self.voice_threshold)
        };
        let Some(voice_id) = drawn else {
            return VoiceOutcome::Skipped(VoiceSkip::NotDrawn);
        };

        let audio = match voice.generator.synthesize(&translit::to_cyrillic(message), &voice_id).await {
            Ok(audio) => audio,
            Err(e) => {
                let err = FireError::Synthesize(e);
                warn!("Chat {}: {}", key.chat_id.0, err);
                return VoiceOutcome::Failed(err);
            }
        };

        match self.messenger.send_audio(key.chat_id, audio).await {
            Ok(()) => {
                info!("Sent voice ({}) to chat {}", voice_id, key.chat_id.0);
                VoiceOutcome::Sent { voice_id }
            }
            Err(e) => {
                let err = FireError::SendVoice(e);
                warn!("Chat {}: {}", key.chat_id.0, err);
                VoiceOutcome::Failed(err)
            }
        }
    }
}

/// Draw in `[0, 10)`; at or above `threshold` pick a random voice.
fn pick_voice<R: Rng + ?Sized>(rng: &mut R, voices: &[String], threshold: u8) -> Option<String> {
    let draw: u8 = rng.random_range(0..10);
    if draw < threshold {
        return None;
    }
    voices.choose(rng).cloned()
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}
