use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use teloxide::types::ChatId;

use crate::broadcast::IntervalRange;
use crate::broadcast::history::STACK_SIZE;
use crate::broadcast::writer::DEFAULT_MODEL;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    telegram_bot_token: String,
    /// Anthropic API key for writing posts
    anthropic_api_key: String,
    model: Option<String>,
    /// TTS server base URL (e.g., "http://localhost:8880"); no voice notes without it.
    tts_endpoint: Option<String>,
    log_chat_id: Option<i64>,
    /// Directory for logs. Defaults to current directory.
    data_dir: Option<String>,
    #[serde(default = "default_history_size")]
    history_size: usize,
    /// [min, max] seconds between two news posts
    #[serde(default = "default_news_interval")]
    news_interval_secs: [u64; 2],
    #[serde(default = "default_voice_threshold")]
    voice_threshold: u8,
    #[serde(default = "default_tick_ms")]
    tick_ms: u64,
    #[serde(default = "default_retry_delay_secs")]
    retry_delay_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    poll_timeout_secs: u32,
    #[serde(default = "default_max_concurrent_fires")]
    max_concurrent_fires: usize,
    /// A fire running longer than this is aborted.
    #[serde(default = "default_fire_timeout_secs")]
    fire_timeout_secs: u64,
}

fn default_history_size() -> usize {
    STACK_SIZE
}

fn default_news_interval() -> [u64; 2] {
    [IntervalRange::NEWS.min_secs(), IntervalRange::NEWS.max_secs()]
}

fn default_voice_threshold() -> u8 {
    crate::broadcast::fire::VOICE_THRESHOLD
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_retry_delay_secs() -> u64 {
    5
}

fn default_poll_timeout_secs() -> u32 {
    10
}

fn default_max_concurrent_fires() -> usize {
    crate::broadcast::scheduler::DEFAULT_MAX_CONCURRENT_FIRES
}

fn default_fire_timeout_secs() -> u64 {
    crate::broadcast::scheduler::DEFAULT_FIRE_TIMEOUT.as_secs()
}

pub struct Config {
    pub telegram_bot_token: String,
    pub anthropic_api_key: String,
    pub model: String,
    pub tts_endpoint: Option<String>,
    pub log_chat_id: Option<ChatId>,
    pub data_dir: PathBuf,
    /// Messages remembered per chat.
    pub history_size: usize,
    pub news_interval: IntervalRange,
    /// Voice note when a draw in [0, 10) reaches this.
    pub voice_threshold: u8,
    pub tick: Duration,
    /// Pause after a failed loop iteration.
    pub retry_delay: Duration,
    pub poll_timeout_secs: u32,
    pub max_concurrent_fires: usize,
    pub fire_timeout: Duration,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config_path = path.as_ref().to_path_buf();
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
        let file: ConfigFile = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseJson { path: config_path.clone(), source: e })?;

        if file.telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation("telegram_bot_token is required".into()));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = file.telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into()
            ));
        }
        if file.anthropic_api_key.is_empty() {
            return Err(ConfigError::Validation("anthropic_api_key is required".into()));
        }
        if file.history_size == 0 {
            return Err(ConfigError::Validation("history_size must be at least 1".into()));
        }

        let [min_secs, max_secs] = file.news_interval_secs;
        if min_secs == 0 {
            return Err(ConfigError::Validation("news_interval_secs minimum must be positive".into()));
        }
        let news_interval = IntervalRange::new(min_secs, max_secs).ok_or_else(|| {
            ConfigError::Validation(format!("news_interval_secs [{min_secs}, {max_secs}] has min > max"))
        })?;

        if file.voice_threshold > 10 {
            return Err(ConfigError::Validation("voice_threshold must be between 0 and 10".into()));
        }
        if file.tick_ms == 0 {
            return Err(ConfigError::Validation("tick_ms must be positive".into()));
        }
        if file.max_concurrent_fires == 0 {
            return Err(ConfigError::Validation("max_concurrent_fires must be at least 1".into()));
        }
        if file.fire_timeout_secs == 0 {
            return Err(ConfigError::Validation("fire_timeout_secs must be positive".into()));
        }

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            telegram_bot_token: file.telegram_bot_token,
            anthropic_api_key: file.anthropic_api_key,
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            tts_endpoint: file.tts_endpoint.filter(|e| !e.is_empty()),
            log_chat_id: file.log_chat_id.map(ChatId),
            data_dir,
            history_size: file.history_size,
            news_interval,
            voice_threshold: file.voice_threshold,
            tick: Duration::from_millis(file.tick_ms),
            retry_delay: Duration::from_secs(file.retry_delay_secs),
            poll_timeout_secs: file.poll_timeout_secs,
            max_concurrent_fires: file.max_concurrent_fires,
            fire_timeout: Duration::from_secs(file.fire_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdefGHIjklMNOpqrsTUVwxyz",
            "anthropic_api_key": "sk-ant-test"
        }"#);
        let config = Config::load(file.path()).expect("should load valid config");
        assert_eq!(config.history_size, 16);
        assert_eq!(config.news_interval, IntervalRange::NEWS);
        assert_eq!(config.voice_threshold, 7);
        assert_eq!(config.tick, Duration::from_secs(1));
        assert_eq!(config.retry_delay, Duration::from_secs(5));
        assert_eq!(config.fire_timeout, Duration::from_secs(180));
        assert_eq!(config.model, DEFAULT_MODEL);
        assert!(config.tts_endpoint.is_none());
        assert!(config.log_chat_id.is_none());
        assert_eq!(config.data_dir, PathBuf::from("."));
    }

    #[test]
    fn test_overrides() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "sk-ant-test",
            "tts_endpoint": "http://localhost:8880",
            "log_chat_id": -1001,
            "news_interval_secs": [60, 120],
            "voice_threshold": 10,
            "history_size": 4
        }"#);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.news_interval, IntervalRange::new(60, 120).unwrap());
        assert_eq!(config.voice_threshold, 10);
        assert_eq!(config.history_size, 4);
        assert_eq!(config.log_chat_id, Some(ChatId(-1001)));
        assert_eq!(config.tts_endpoint.as_deref(), Some("http://localhost:8880"));
    }

    #[test]
    fn test_empty_token() {
        let file = write_config(r#"{
            "telegram_bot_token": "",
            "anthropic_api_key": "sk-ant-test"
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("telegram_bot_token"));
    }

    #[test]
    fn test_invalid_token_format() {
        for token in ["invalid_token_no_colon", "notanumber:ABCdef", "123456789:"] {
            let file = write_config(&format!(
                r#"{{"telegram_bot_token": "{token}", "anthropic_api_key": "k"}}"#
            ));
            let err = assert_err(Config::load(file.path()));
            assert!(matches!(err, ConfigError::Validation(_)), "token {token}");
        }
    }

    #[test]
    fn test_missing_api_key() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": ""
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("anthropic_api_key"));
    }

    #[test]
    fn test_inverted_interval() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "k",
            "news_interval_secs": [600, 60]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("min > max"));
    }

    #[test]
    fn test_zero_history_size() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "k",
            "history_size": 0
        }"#);
        assert!(matches!(assert_err(Config::load(file.path())), ConfigError::Validation(_)));
    }

    #[test]
    fn test_voice_threshold_out_of_range() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "k",
            "voice_threshold": 11
        }"#);
        assert!(matches!(assert_err(Config::load(file.path())), ConfigError::Validation(_)));
    }

    #[test]
    fn test_zero_fire_timeout() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "k",
            "fire_timeout_secs": 0
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("fire_timeout_secs"));
    }

    #[test]
    fn test_zero_interval_minimum() {
        let file = write_config(r#"{
            "telegram_bot_token": "123456789:ABCdef",
            "anthropic_api_key": "k",
            "news_interval_secs": [0, 0]
        }"#);
        let err = assert_err(Config::load(file.path()));
        assert!(err.to_string().contains("must be positive"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::load("/nonexistent/path/config.json"));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::load(file.path()));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
