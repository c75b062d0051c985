//! Application Configuration Module
//!
//! Loads the interview service settings from the environment (and an optional
//! `.env` file) into a single struct handed to `main`.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use interview_core::evaluator_client::{DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_TIMEOUT};
use tracing::Level;

pub const DEFAULT_QUESTIONS_DIR: &str = "questions";
pub const DEFAULT_SESSIONS_FILE: &str = "sessions.json";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub evaluator_api_key: Option<String>,
    pub evaluator_url: String,
    pub evaluator_model: String,
    pub evaluator_timeout: Duration,
    pub tts_command: Option<String>,
    pub questions_dir: PathBuf,
    pub sessions_file: PathBuf,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {name}: {reason}")]
    InvalidVar { name: String, reason: String },
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `EVALUATOR_API_KEY`: (Optional) Bearer key for the scoring endpoint. Without it answers are recorded unscored.
    // *   `EVALUATOR_URL`: (Optional) Chat-completions endpoint. Defaults to OpenRouter.
    // *   `EVALUATOR_MODEL`: (Optional) Model used for scoring.
    // *   `EVALUATOR_TIMEOUT_SECS`: (Optional) Give up on a scoring request after this many seconds. Defaults to 45.
    // *   `TTS_COMMAND`: (Optional) External synthesiser, e.g. "espeak -s 160". Questions are printed when unset.
    // *   `QUESTIONS_DIR`: (Optional) Directory of per-role question files. Defaults to "questions".
    // *   `SESSIONS_FILE`: (Optional) Where finished sessions are appended. Defaults to "sessions.json".
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let evaluator_url = var("EVALUATOR_URL").unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        if !evaluator_url.starts_with("http://") && !evaluator_url.starts_with("https://") {
            return Err(ConfigError::InvalidVar {
                name: "EVALUATOR_URL".to_string(),
                reason: format!("expected an http(s) URL, got '{evaluator_url}'"),
            });
        }

        let evaluator_timeout = match var("EVALUATOR_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "EVALUATOR_TIMEOUT_SECS".to_string(),
                        reason: format!("expected a positive number of seconds, got '{value}'"),
                    });
                }
            },
            None => DEFAULT_TIMEOUT,
        };

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            evaluator_api_key: var("EVALUATOR_API_KEY"),
            evaluator_url,
            evaluator_model: var("EVALUATOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            evaluator_timeout,
            tts_command: var("TTS_COMMAND"),
            questions_dir: var("QUESTIONS_DIR")
                .unwrap_or_else(|| DEFAULT_QUESTIONS_DIR.to_string())
                .into(),
            sessions_file: var("SESSIONS_FILE")
                .unwrap_or_else(|| DEFAULT_SESSIONS_FILE.to_string())
                .into(),
            log_level,
        })
    }
}
