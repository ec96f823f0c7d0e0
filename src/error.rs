use std::path::PathBuf;
use thiserror::Error;

/// Errors from the remote transcription service
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Invalid response from transcription service: {0}")]
    InvalidResponse(String),

    #[error("Transcription service error ({status}): {message}")]
    ServerError { status: u16, message: String },
}

/// Errors from the remote note generation service
#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("Invalid response from note service: {0}")]
    InvalidResponse(String),

    #[error("Note service error ({status}): {message}")]
    ServerError { status: u16, message: String },
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
