//! Error types for the broadcast pipeline.
//!
//! None of these ever escape a loop: they are logged where they occur and the
//! affected fire or poll is simply skipped.

use std::fmt;

/// A Messenger call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Telegram rejected the request.
    Api(String),
    /// The request never got an answer.
    Network(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(e) => write!(f, "telegram API error: {e}"),
            Self::Network(e) => write!(f, "network error: {e}"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A content or voice generator failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    Http(String),
    Api(String),
    Parse(String),
    /// The generator answered with nothing usable.
    Empty,
    /// Audio could not be produced or re-encoded.
    Audio(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "HTTP error: {e}"),
            Self::Api(e) => write!(f, "API error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Empty => write!(f, "empty response"),
            Self::Audio(e) => write!(f, "audio error: {e}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Failure of one stage of a fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireError {
    Generate(GenerationError),
    SendText(TransportError),
    Synthesize(GenerationError),
    SendVoice(TransportError),
}

impl fmt::Display for FireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate(e) => write!(f, "text generation failed: {e}"),
            Self::SendText(e) => write!(f, "sending text failed: {e}"),
            Self::Synthesize(e) => write!(f, "voice synthesis failed: {e}"),
            Self::SendVoice(e) => write!(f, "sending voice failed: {e}"),
        }
    }
}

impl std::error::Error for FireError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Generate(e) | Self::Synthesize(e) => Some(e),
            Self::SendText(e) | Self::SendVoice(e) => Some(e),
        }
    }
}

/// A scheduler iteration could not run.
#[derive(Debug)]
pub enum SchedulerError {
    /// The fire worker pool was closed.
    PoolClosed,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PoolClosed => write!(f, "fire worker pool is closed"),
        }
    }
}

impl std::error::Error for SchedulerError {}
