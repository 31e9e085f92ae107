//! Server configuration loaded from the process environment.

pub mod utils;

use std::env;
use std::time::Duration;

use utils::parse_duration;

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("HTTP_PORT must be between 1 and 65535")]
    InvalidPort,

    #[error("MAX_TEXT_LENGTH must be at least 1")]
    InvalidMaxTextLength,

    #[error("QUEUE_CAPACITY must be at least 1")]
    InvalidQueueCapacity,

    #[error("LOG_LEVEL must be one of: debug, info, warn, error")]
    InvalidLogLevel,

    #[error("LOG_FORMAT must be one of: text, json")]
    InvalidLogFormat,
}

/// All announcer configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Discord settings
    pub discord_token: String,
    pub guild_id: String,
    pub default_voice_channel_id: String,

    // HTTP settings
    pub http_port: u16,
    /// Empty disables bearer authentication.
    pub bearer_token: String,

    // TTS settings
    pub piper_path: String,
    pub piper_model: String,
    pub default_voice: String,

    // Behavior settings
    pub auto_leave_idle: Duration,
    pub max_text_length: usize,
    pub queue_capacity: usize,
    pub default_ttl: Duration,

    // Logging settings
    pub log_level: String,
    pub log_format: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with sane defaults.
    /// Also reads a `.env` file when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let config = Self {
            discord_token: env::var("DISCORD_TOKEN").unwrap_or_default(),
            guild_id: env::var("GUILD_ID").unwrap_or_default(),
            default_voice_channel_id: env::var("DEFAULT_VOICE_CHANNEL_ID").unwrap_or_default(),

            http_port: env_parse("HTTP_PORT", 8080),
            bearer_token: env::var("BEARER_TOKEN").unwrap_or_default(),

            piper_path: env_string("PIPER_PATH", "piper"),
            piper_model: env::var("PIPER_MODEL").unwrap_or_default(),
            default_voice: env_string("DEFAULT_VOICE", "default"),

            auto_leave_idle: env_duration("AUTO_LEAVE_IDLE", Duration::from_secs(5 * 60)),
            max_text_length: env_parse("MAX_TEXT_LENGTH", 1000),
            queue_capacity: env_parse("QUEUE_CAPACITY", 100),
            default_ttl: env_duration("DEFAULT_TTL", Duration::from_secs(30)),

            log_level: env_string("LOG_LEVEL", "info"),
            log_format: env_string("LOG_FORMAT", "text"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Whether bearer token authentication is disabled.
    pub fn auth_disabled(&self) -> bool {
        self.bearer_token.is_empty()
    }

    /// The ingress bind address.
    pub fn address(&self) -> String {
        format!("0.0.0.0:{}", self.http_port)
    }

    /// Check that the loaded values are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        if self.max_text_length < 1 {
            return Err(ConfigError::InvalidMaxTextLength);
        }
        if self.queue_capacity < 1 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        if !matches!(self.log_level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err(ConfigError::InvalidLogLevel);
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(ConfigError::InvalidLogFormat);
        }
        Ok(())
    }
}

/// String environment value with a default for unset or empty.
pub(crate) fn env_string(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

/// Parsed environment value; unparsable values fall back to the default.
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Duration environment value; unparsable values fall back to the default.
pub(crate) fn env_duration(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| parse_duration(&v))
        .unwrap_or(default)
}
