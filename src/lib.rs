pub mod broadcast;
pub mod config;
pub mod telegram_log;
