use std::env;
use std::time::Duration;

use crate::config::{env_duration, env_parse, env_string, utils::parse_bool};

/// Relay configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum RelayConfigError {
    #[error("NTFY_TOPICS is required (comma-separated list of topics)")]
    TopicsRequired,

    #[error("NTFY_SERVER cannot be empty")]
    ServerRequired,

    #[error("DISCORGEOUS_API_URL cannot be empty")]
    ApiUrlRequired,

    #[error("NTFY_MAX_TEXT_LENGTH must be at least 1")]
    InvalidMaxTextLength,

    #[error("LOG_LEVEL must be one of: debug, info, warn, error")]
    InvalidLogLevel,

    #[error("LOG_FORMAT must be one of: text, json")]
    InvalidLogFormat,
}

/// All ntfy relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    // Ntfy settings
    pub ntfy_server: String,
    pub ntfy_topics: Vec<String>,

    // Announcer API settings
    pub api_url: String,
    pub bearer_token: String,

    // Formatting settings
    pub prefix: String,
    pub interrupt: bool,
    /// Zero disables deduplication.
    pub dedupe_window: Duration,
    pub max_text_length: usize,

    // Logging settings
    pub log_level: String,
    pub log_format: String,
}

impl RelayConfig {
    /// Load relay configuration from environment variables with sane
    /// defaults. Also reads a `.env` file when present.
    pub fn from_env() -> Result<Self, RelayConfigError> {
        let _ = dotenvy::dotenv();

        let topics = env::var("NTFY_TOPICS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            ntfy_server: env_string("NTFY_SERVER", "https://ntfy.sh"),
            ntfy_topics: topics,

            api_url: env_string("DISCORGEOUS_API_URL", "http://discorgeous:8080"),
            bearer_token: env::var("DISCORGEOUS_BEARER_TOKEN").unwrap_or_default(),

            prefix: env::var("NTFY_PREFIX").unwrap_or_default(),
            interrupt: env::var("NTFY_INTERRUPT")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(false),
            dedupe_window: env_duration("NTFY_DEDUPE_WINDOW", Duration::ZERO),
            max_text_length: env_parse("NTFY_MAX_TEXT_LENGTH", 1000),

            log_level: env_string("LOG_LEVEL", "info"),
            log_format: env_string("LOG_FORMAT", "text"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check that required values are present and usable.
    pub fn validate(&self) -> Result<(), RelayConfigError> {
        if self.ntfy_topics.is_empty() {
            return Err(RelayConfigError::TopicsRequired);
        }
        if self.ntfy_server.is_empty() {
            return Err(RelayConfigError::ServerRequired);
        }
        if self.api_url.is_empty() {
            return Err(RelayConfigError::ApiUrlRequired);
        }
        if self.max_text_length < 1 {
            return Err(RelayConfigError::InvalidMaxTextLength);
        }
        if !matches!(self.log_level.as_str(), "debug" | "info" | "warn" | "error") {
            return Err(RelayConfigError::InvalidLogLevel);
        }
        if !matches!(self.log_format.as_str(), "text" | "json") {
            return Err(RelayConfigError::InvalidLogFormat);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "NTFY_SERVER",
            "NTFY_TOPICS",
            "DISCORGEOUS_API_URL",
            "DISCORGEOUS_BEARER_TOKEN",
            "NTFY_PREFIX",
            "NTFY_INTERRUPT",
            "NTFY_DEDUPE_WINDOW",
            "NTFY_MAX_TEXT_LENGTH",
            "LOG_LEVEL",
            "LOG_FORMAT",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    #[serial]
    fn topics_are_required() {
        clear_env();
        let err = RelayConfig::from_env().unwrap_err();
        assert!(matches!(err, RelayConfigError::TopicsRequired));
    }

    #[test]
    #[serial]
    fn topics_are_split_and_trimmed() {
        clear_env();
        unsafe { env::set_var("NTFY_TOPICS", "alerts, builds ,,  deploys ") };

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.ntfy_topics, vec!["alerts", "builds", "deploys"]);
        assert_eq!(config.ntfy_server, "https://ntfy.sh");
        assert_eq!(config.api_url, "http://discorgeous:8080");
        assert_eq!(config.max_text_length, 1000);
        assert_eq!(config.dedupe_window, Duration::ZERO);
        assert!(!config.interrupt);

        clear_env();
    }

    #[test]
    #[serial]
    fn overrides() {
        clear_env();
        unsafe {
            env::set_var("NTFY_TOPICS", "alerts");
            env::set_var("NTFY_SERVER", "https://ntfy.example.com");
            env::set_var("NTFY_PREFIX", "Alert");
            env::set_var("NTFY_INTERRUPT", "true");
            env::set_var("NTFY_DEDUPE_WINDOW", "5m");
            env::set_var("NTFY_MAX_TEXT_LENGTH", "200");
        }

        let config = RelayConfig::from_env().unwrap();
        assert_eq!(config.ntfy_server, "https://ntfy.example.com");
        assert_eq!(config.prefix, "Alert");
        assert!(config.interrupt);
        assert_eq!(config.dedupe_window, Duration::from_secs(300));
        assert_eq!(config.max_text_length, 200);

        clear_env();
    }

    #[test]
    #[serial]
    fn invalid_log_format_rejected() {
        clear_env();
        unsafe {
            env::set_var("NTFY_TOPICS", "alerts");
            env::set_var("LOG_FORMAT", "xml");
        }

        let err = RelayConfig::from_env().unwrap_err();
        assert!(matches!(err, RelayConfigError::InvalidLogFormat));

        clear_env();
    }
}
