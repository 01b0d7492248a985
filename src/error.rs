//! Error types for livesub.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LivesubError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Frame and capture errors
    #[error("Invalid frame: expected {expected}, got {actual}")]
    InvalidFrame { expected: String, actual: String },

    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    // Session lifecycle errors
    #[error("A session is already recording")]
    AlreadyRecording,

    #[error("No session is recording")]
    NotRecording,

    // Transcription errors
    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Export errors
    #[error("Unsupported export format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, LivesubError>;
