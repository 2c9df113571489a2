//! Error types and handling for Soteria
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for Soteria operations
pub type Result<T> = std::result::Result<T, SoteriaError>;

/// Main error type for Soteria
#[derive(Debug, Error)]
pub enum SoteriaError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Durable store errors
    #[error("Store error: {message}")]
    Store { message: String },

    /// Device (power station / smart plug) errors
    #[error("Device error: {message}")]
    Device { message: String },

    /// HTTP/Web server errors
    #[error("Web server error: {message}")]
    Web { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Network-related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Notification channel errors
    #[error("Notify error: {message}")]
    Notify { message: String },

    /// Authentication/authorization errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl SoteriaError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        SoteriaError::Config {
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store<S: Into<String>>(message: S) -> Self {
        SoteriaError::Store {
            message: message.into(),
        }
    }

    /// Create a new device error
    pub fn device<S: Into<String>>(message: S) -> Self {
        SoteriaError::Device {
            message: message.into(),
        }
    }

    /// Create a new web error
    pub fn web<S: Into<String>>(message: S) -> Self {
        SoteriaError::Web {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        SoteriaError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        SoteriaError::Io {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        SoteriaError::Network {
            message: message.into(),
        }
    }

    /// Create a new notification error
    pub fn notify<S: Into<String>>(message: S) -> Self {
        SoteriaError::Notify {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        SoteriaError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new auth error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        SoteriaError::Auth {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        SoteriaError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SoteriaError {
    fn from(err: std::io::Error) -> Self {
        SoteriaError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for SoteriaError {
    fn from(err: serde_yaml::Error) -> Self {
        SoteriaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SoteriaError {
    fn from(err: serde_json::Error) -> Self {
        SoteriaError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for SoteriaError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SoteriaError::timeout(err.to_string())
        } else {
            SoteriaError::network(err.to_string())
        }
    }
}
