use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::profile::session::SessionSettings;

/// Where profile documents are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: Option<String>,
    pub store_backend: StoreBackend,
    pub port: u16,
    pub rust_log: String,
    pub autosave_delay_ms: u64,
    pub inline_save_delay_ms: u64,
    pub event_channel_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let store_backend: StoreBackend = optional_env("STORE_BACKEND", "postgres").parse()?;
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(require_env("DATABASE_URL")?),
            StoreBackend::Memory => std::env::var("DATABASE_URL").ok(),
        };

        Ok(Config {
            database_url,
            store_backend,
            port: optional_env("PORT", "8080")
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: optional_env("RUST_LOG", "info"),
            autosave_delay_ms: optional_env("AUTOSAVE_DELAY_MS", "2000")
                .parse()
                .context("AUTOSAVE_DELAY_MS must be a number of milliseconds")?,
            inline_save_delay_ms: optional_env("INLINE_SAVE_DELAY_MS", "1000")
                .parse()
                .context("INLINE_SAVE_DELAY_MS must be a number of milliseconds")?,
            event_channel_capacity: optional_env("EVENT_CHANNEL_CAPACITY", "256")
                .parse()
                .context("EVENT_CHANNEL_CAPACITY must be a positive integer")?,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            autosave_delay: Duration::from_millis(self.autosave_delay_ms),
            inline_save_delay: Duration::from_millis(self.inline_save_delay_ms),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("postgres".parse::<StoreBackend>().unwrap(), StoreBackend::Postgres);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_session_settings_from_millis() {
        let config = Config {
            database_url: None,
            store_backend: StoreBackend::Memory,
            port: 8080,
            rust_log: "info".to_string(),
            autosave_delay_ms: 2000,
            inline_save_delay_ms: 1000,
            event_channel_capacity: 256,
        };
        let settings = config.session_settings();
        assert_eq!(settings.autosave_delay, Duration::from_secs(2));
        assert_eq!(settings.inline_save_delay, Duration::from_secs(1));
    }
}
