use std::process::ExitCode;
use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use newscaster::broadcast::{
    Broadcaster, CommandRouter, HistoryStore, NewsWriter, Poller, Scheduler, StreamRegistry, TelegramClient,
    TtsClient, VoiceBox,
};
use newscaster::config::Config;
use newscaster::telegram_log::TelegramLogLayer;

#[tokio::main]
async fn main() -> ExitCode {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "newscaster.json".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("newscaster.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            return ExitCode::FAILURE;
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_chat_id) = config.log_chat_id {
        registry.with(TelegramLogLayer::new(bot.clone(), log_chat_id)).init();
    } else {
        registry.init();
    }

    info!("📰 Starting newscaster...");
    info!("Loaded config from {config_path}");
    info!(
        "News every {}..{}s, voice threshold {}/10",
        config.news_interval.min_secs(),
        config.news_interval.max_secs(),
        config.voice_threshold
    );

    let telegram = Arc::new(TelegramClient::connect(bot, config.poll_timeout_secs).await);
    telegram.register_commands().await;

    let history = HistoryStore::new(config.history_size).shared();
    let streams = StreamRegistry::new(config.news_interval).shared();
    let writer = Arc::new(NewsWriter::new(config.anthropic_api_key.clone(), config.model.clone()));

    let mut broadcaster = Broadcaster::new(telegram.clone(), writer, history.clone())
        .with_voice_threshold(config.voice_threshold);
    match config.tts_endpoint.clone() {
        Some(endpoint) => {
            let voice = VoiceBox::discover(Arc::new(TtsClient::new(endpoint))).await;
            if voice.voices().is_empty() {
                warn!("TTS server has no voices, posts go out as text only");
            }
            broadcaster = broadcaster.with_voice(voice);
        }
        None => info!("No tts_endpoint configured, voice notes disabled"),
    }

    let scheduler = Scheduler::new(streams.clone(), Arc::new(broadcaster), config.max_concurrent_fires)
        .with_tick(config.tick)
        .with_retry_delay(config.retry_delay)
        .with_fire_timeout(config.fire_timeout);
    let router = Arc::new(CommandRouter::new(
        streams,
        history,
        telegram.bot_username().map(str::to_string),
    ));
    let poller = Poller::new(telegram, router, config.retry_delay);

    tokio::select! {
        _ = poller.run() => warn!("Update poller exited"),
        _ = scheduler.clone().run() => warn!("Scheduler exited"),
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutting down");
            scheduler.close();
        }
    }

    ExitCode::SUCCESS
}
