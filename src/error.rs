//! Custom error types for precision-clicker.
//!
//! This module provides structured error types using `thiserror`. None of
//! them ever cross from a background click thread into the controlling
//! context as a panic; they are reported as status events or return values.

use std::io;
use thiserror::Error;

/// Failure reported by an [`InjectionPort`](crate::injection::InjectionPort).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    /// The OS refused synthetic input (e.g. missing accessibility permission).
    #[error("permission to inject input was denied")]
    PermissionDenied,

    /// No display server connection could be made.
    #[error("display is unavailable")]
    DisplayUnavailable,

    #[error("injection failed: {0}")]
    Unknown(String),
}

impl InjectionError {
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown(reason.into())
    }
}

/// Main error type for precision-clicker operations.
#[derive(Error, Debug)]
pub enum ClickerError {
    /// A click could not be performed.
    #[error(transparent)]
    Injection(#[from] InjectionError),

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Unknown click kind name.
    #[error("invalid click kind '{0}': expected left, right, middle or double")]
    InvalidClickKind(String),

    /// Unparseable screen coordinate.
    #[error("invalid position '{value}': {reason}")]
    InvalidPosition { value: String, reason: String },

    /// Settings validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing settings file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing settings file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// The explicit dispatch worker is gone.
    #[error("click dispatcher is shut down")]
    DispatcherClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for precision-clicker operations.
pub type Result<T> = std::result::Result<T, ClickerError>;

impl ClickerError {
    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_click_kind(value: impl Into<String>) -> Self {
        Self::InvalidClickKind(value.into())
    }

    pub fn invalid_position(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClickerError::invalid_duration("5x", "unknown unit");
        assert_eq!(err.to_string(), "invalid duration '5x': unknown unit");

        let err = ClickerError::invalid_click_kind("wheel");
        assert!(err.to_string().starts_with("invalid click kind 'wheel'"));

        let err = ClickerError::config_validation("toggle_hotkey cannot be empty");
        assert_eq!(
            err.to_string(),
            "configuration error: toggle_hotkey cannot be empty"
        );

        let err: ClickerError = InjectionError::DisplayUnavailable.into();
        assert_eq!(err.to_string(), "display is unavailable");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: ClickerError = io_err.into();
        assert!(matches!(err, ClickerError::Io(_)));
    }
}
