//! services/tutor/src/error.rs
//!
//! Errors that end the `tutor` process. Everything recoverable is turned into
//! screen state inside `professor_core` and never reaches this type.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// Required settings are missing or invalid; nothing else was started.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Opening the database or migrating it failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The terminal went away.
    #[error("Terminal I/O error: {0}")]
    Io(#[from] std::io::Error),
}
