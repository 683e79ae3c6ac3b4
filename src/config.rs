//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is honored for local development.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// REST API port
    pub port: u16,
    /// WebSocket relay port
    pub relay_port: u16,
    /// Persisted store (activities, totems, personnel, ...)
    pub data_file: Option<PathBuf>,
    /// Persisted relay occupancy state
    pub state_file: Option<PathBuf>,
    /// Base URL of the locker hardware API
    pub locker_device_url: String,
    /// Timeout applied to every locker hardware request
    pub device_timeout: Duration,
    /// Frontend URL allowed by CORS
    pub frontend_url: String,
    /// HMAC key used to digest personnel PINs (raw bytes)
    pub pin_secret: Vec<u8>,
    /// Release equipment claimed by a totem when its socket disconnects
    pub release_on_disconnect: bool,
}

impl Config {
    /// Offline configuration for tests: nothing is persisted.
    pub fn test_default() -> Self {
        Self {
            port: 12091,
            relay_port: 3003,
            data_file: None,
            state_file: None,
            locker_device_url: "http://localhost:4000".to_string(),
            device_timeout: Duration::from_secs(1),
            frontend_url: "http://localhost:4200".to_string(),
            pin_secret: b"test_pin_secret_32_bytes_minimum".to_vec(),
            release_on_disconnect: false,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            port: parse_var("PORT", 12091)?,
            relay_port: parse_var("RELAY_PORT", 3003)?,
            data_file: Some(PathBuf::from(
                env::var("DATA_FILE").unwrap_or_else(|_| "lockout-data.json".to_string()),
            )),
            state_file: Some(PathBuf::from(
                env::var("STATE_FILE").unwrap_or_else(|_| "equipment-state.json".to_string()),
            )),
            locker_device_url: env::var("LOCKER_DEVICE_URL")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:4000".to_string()),
            device_timeout: Duration::from_secs(parse_var("DEVICE_TIMEOUT_SECS", 5)?),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:4200".to_string()),
            pin_secret: env::var("PIN_SECRET")
                .map_err(|_| ConfigError::Missing("PIN_SECRET"))?
                .into_bytes(),
            release_on_disconnect: parse_var("RELEASE_ON_DISCONNECT", false)?,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
