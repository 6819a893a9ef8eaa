//! Session error types.

use std::io;

use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while running a session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// IO error (config file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Transport error (bind, connect, transfer).
    #[error("Transport error: {0}")]
    Transport(#[from] dbgwire_transport::TransportError),

    /// A buffer the session writes itself was rejected.
    #[error("Write error: {0}")]
    Write(#[from] dbgwire_protocol::WriteError),

    /// Saved state does not have the expected shape.
    #[error("Saved state error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed.
    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    /// Logging settings are invalid.
    #[error("Logging error: {0}")]
    Tracing(#[from] dbgwire_core::TracingError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// No factory registered under this name.
    #[error("Unknown plugin: {name}")]
    UnknownPlugin { name: String },

    /// Saved state could not be restored.
    #[error("Invalid saved state: {message}")]
    State { message: String },

    /// Operation needs a mode the session is not in.
    #[error("Operation requires {expected} mode")]
    WrongMode { expected: &'static str },
}

impl SessionError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an unknown plugin error.
    pub fn unknown_plugin(name: impl Into<String>) -> Self {
        Self::UnknownPlugin { name: name.into() }
    }

    /// Creates a saved state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }
}
