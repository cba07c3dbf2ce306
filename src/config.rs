use std::env;
use std::time::Duration;

use crate::error::AppError;
use crate::tracker::ReporterSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    pub min_fix_interval_ms: u64,
    pub fix_timeout_ms: u64,
    pub fix_channel_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            min_fix_interval_ms: parse_or_default("MIN_FIX_INTERVAL_MS", 2_000)?,
            fix_timeout_ms: parse_or_default("FIX_TIMEOUT_MS", 30_000)?,
            fix_channel_size: parse_or_default("FIX_CHANNEL_SIZE", 16)?,
        })
    }

    pub fn reporter_settings(&self) -> ReporterSettings {
        ReporterSettings {
            min_fix_interval: Duration::from_millis(self.min_fix_interval_ms),
            fix_timeout: Duration::from_millis(self.fix_timeout_ms),
            fix_channel_size: self.fix_channel_size,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
