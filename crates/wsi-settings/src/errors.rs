//! Failures surfaced while reading `settings.json` or applying overrides.

use thiserror::Error;

/// Why a settings file could not be turned into [`crate::WsiSettings`].
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The file exists but could not be read.
    #[error("settings file unreadable: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON or does not match the settings shape.
    #[error("settings file malformed: {0}")]
    Json(#[from] serde_json::Error),
    /// A value parsed fine but is outside what the server accepts.
    #[error("settings rejected: {0}")]
    InvalidValue(String),
}

/// Shorthand used throughout the settings crate.
pub type Result<T> = std::result::Result<T, SettingsError>;
