//! services/tutor/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use async_openai::config::OpenAIConfig;
use professor_core::router::SPLASH_MIN_DURATION;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// Gemini's OpenAI-compatible endpoint.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://professor_ai.db?mode=rwc";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

impl ConfigError {
    /// The variables the configuration-error screen should ask for.
    pub fn missing_vars(&self) -> Vec<String> {
        match self {
            Self::MissingVar(name) => name.split(" or ").map(str::to_string).collect(),
            Self::InvalidValue(name, _) => vec![name.clone()],
        }
    }
}

/// Which AI backend the key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AiProvider {
    OpenAi,
    Gemini,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub log_level: Level,
    pub provider: AiProvider,
    pub api_key: String,
    pub api_base: Option<String>,
    pub analysis_model: String,
    pub chat_model: String,
    pub export_dir: PathBuf,
    pub splash_min: Duration,
    pub accounts_enabled: bool,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Blank values count as unset.
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        // --- Load API Key (OpenAI wins when both are present) ---
        let (provider, api_key) = match (var("OPENAI_API_KEY"), var("GEMINI_API_KEY")) {
            (Some(key), _) => (AiProvider::OpenAi, key),
            (None, Some(key)) => (AiProvider::Gemini, key),
            (None, None) => {
                return Err(ConfigError::MissingVar(
                    "OPENAI_API_KEY or GEMINI_API_KEY".to_string(),
                ))
            }
        };

        let api_base = var("AI_API_BASE").or_else(|| match provider {
            AiProvider::Gemini => Some(GEMINI_API_BASE.to_string()),
            AiProvider::OpenAi => None,
        });

        // --- Load Adapter-specific Settings ---
        let (default_analysis, default_chat) = match provider {
            AiProvider::OpenAi => ("gpt-4o", "gpt-4o-mini"),
            AiProvider::Gemini => ("gemini-2.5-pro", "gemini-2.5-flash"),
        };
        let analysis_model = var("ANALYSIS_MODEL").unwrap_or_else(|| default_analysis.to_string());
        let chat_model = var("CHAT_MODEL").unwrap_or_else(|| default_chat.to_string());

        // --- Load Storage and Logging Settings ---
        let database_url = var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let export_dir = var("EXPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        let splash_min = match var("SPLASH_MIN_MS") {
            Some(ms) => Duration::from_millis(ms.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("SPLASH_MIN_MS".to_string(), e.to_string())
            })?),
            None => SPLASH_MIN_DURATION,
        };

        let accounts_enabled = match var("ACCOUNTS_ENABLED") {
            Some(value) => parse_flag("ACCOUNTS_ENABLED", &value)?,
            None => false,
        };

        Ok(Self {
            database_url,
            log_level,
            provider,
            api_key,
            api_base,
            analysis_model,
            chat_model,
            export_dir,
            splash_min,
            accounts_enabled,
        })
    }

    /// Client configuration for whichever backend the key belongs to.
    pub fn openai_config(&self) -> OpenAIConfig {
        let config = OpenAIConfig::new().with_api_key(&self.api_key);
        match &self.api_base {
            Some(base) => config.with_api_base(base),
            None => config,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", other),
        )),
    }
}
