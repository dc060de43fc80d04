// ABOUTME: Server configuration read from environment variables
// ABOUTME: Validates ports, timeouts and paths before anything is started

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use marketwise_config::*;
use marketwise_questionnaire::EngineConfig;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid port number: {0}")]
    InvalidPort(String),
    #[error("Port {0} is out of valid range (1-65535)")]
    PortOutOfRange(u16),
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub cors_origin: String,
    /// Overrides the prompt templates bundled with the prompts package
    pub prompts_dir: Option<PathBuf>,
    pub response_language: String,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var(MARKETWISE_PORT).or_else(|| var(PORT)) {
            Some(raw) => {
                let port = raw
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidPort(raw.clone()))?;
                // Validate port is in valid range
                if port == 0 {
                    return Err(ConfigError::PortOutOfRange(port));
                }
                port
            }
            None => DEFAULT_PORT,
        };

        let host = var(MARKETWISE_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let database_url =
            var(MARKETWISE_DATABASE_URL).unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let cors_origin =
            var(MARKETWISE_CORS_ORIGIN).unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string());
        let prompts_dir = var(MARKETWISE_PROMPTS_DIR).map(PathBuf::from);
        let response_language = var(MARKETWISE_RESPONSE_LANGUAGE)
            .unwrap_or_else(|| DEFAULT_RESPONSE_LANGUAGE.to_string());

        let number = |name: &'static str, default: u64| -> Result<u64, ConfigError> {
            match var(name) {
                Some(raw) => match raw.parse::<u64>() {
                    Ok(value) if value > 0 => Ok(value),
                    _ => Err(ConfigError::InvalidValue { name, value: raw }),
                },
                None => Ok(default),
            }
        };
        let engine = EngineConfig {
            persist_timeout: Duration::from_millis(number(
                MARKETWISE_PERSIST_TIMEOUT_MS,
                DEFAULT_PERSIST_TIMEOUT_MS,
            )?),
            generation_timeout: Duration::from_secs(number(
                MARKETWISE_GENERATION_TIMEOUT_SECS,
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?),
        };

        Ok(Config {
            host,
            port,
            database_url,
            cors_origin,
            prompts_dir,
            response_language,
            engine,
        })
    }

    /// Apply command line overrides
    pub fn with_overrides(mut self, port: Option<u16>, database_url: Option<String>) -> Result<Self, ConfigError> {
        if let Some(port) = port {
            if port == 0 {
                return Err(ConfigError::PortOutOfRange(port));
            }
            self.port = port;
        }
        if let Some(url) = database_url {
            if url.trim().is_empty() {
                return Err(ConfigError::Empty("database url"));
            }
            self.database_url = url;
        }
        Ok(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
