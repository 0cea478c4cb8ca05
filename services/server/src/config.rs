//! services/server/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

const GEMINI_OPENAI_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub llm_api_key: String,
    /// `None` means the client library's default (api.openai.com).
    pub llm_api_base: Option<String>,
    pub chat_model: String,
    pub session_idle_minutes: i64,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Load Server and Database Settings ---
        let bind_address_str = var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8501".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            var("DATABASE_URL").unwrap_or_else(|| "sqlite://chatbot_users.db".to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Resolve the Remote Model Credentials ---
        // An OpenAI key wins; a Gemini key goes through Gemini's OpenAI-compatible endpoint.
        let (llm_api_key, default_base, default_model) =
            match (var("OPENAI_API_KEY"), var("GEMINI_API_KEY")) {
                (Some(key), _) => (key, None, "gpt-4o-mini"),
                (None, Some(key)) => (key, Some(GEMINI_OPENAI_BASE.to_string()), "gemini-1.5-flash"),
                (None, None) => {
                    return Err(ConfigError::MissingVar(
                        "OPENAI_API_KEY or GEMINI_API_KEY".to_string(),
                    ))
                }
            };
        let llm_api_base = var("LLM_API_BASE").or(default_base);
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| default_model.to_string());

        // --- Load Session Settings ---
        let session_idle_minutes = match var("SESSION_IDLE_MINUTES") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|minutes| *minutes > 0)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "SESSION_IDLE_MINUTES".to_string(),
                        format!("'{}' is not a positive number of minutes", raw),
                    )
                })?,
            None => 720,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            llm_api_key,
            llm_api_base,
            chat_model,
            session_idle_minutes,
        })
    }
}
