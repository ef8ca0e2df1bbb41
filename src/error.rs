//! Error types for mobhunt.

use thiserror::Error;

use crate::input::InputError;

/// Result type alias using the mobhunt error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for mobhunt.
///
/// Only `Config*` errors are fatal, and only at startup. Everything the loop
/// meets in steady state is logged and folded into a suppressed cycle.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration document could not be parsed
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Config serialize error: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame acquisition failed (retryable)
    #[error("Capture error: {0}")]
    Capture(String),

    /// Input injection failed
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Detection replay file is unusable
    #[error("Replay error: {0}")]
    Replay(String),

    /// Log subscriber could not be installed
    #[error("Logging error: {0}")]
    Logging(String),
}

impl Error {
    /// Create a configuration error with a custom message.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a capture error with a custom message.
    pub fn capture(msg: impl Into<String>) -> Self {
        Error::Capture(msg.into())
    }

    /// Create a replay error with a custom message.
    pub fn replay(msg: impl Into<String>) -> Self {
        Error::Replay(msg.into())
    }

    /// Check if this error must stop the program before the loop starts.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::ConfigParse(_) | Error::ConfigSerialize(_) | Error::Replay(_)
        )
    }

    /// Check if this is a transient I/O failure the loop should ride out.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Capture(_) | Error::Input(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::config("priority_targets is empty");
        assert_eq!(err.to_string(), "Configuration error: priority_targets is empty");
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::config("x").is_fatal());
        assert!(!Error::config("x").is_transient());

        let err = Error::capture("window not found");
        assert!(err.is_transient());
        assert!(!err.is_fatal());

        let err: Error = InputError::SimulationFailed("no display".into()).into();
        assert!(err.is_transient());
    }
}
