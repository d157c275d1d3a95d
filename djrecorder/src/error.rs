//! Error types for the recorder

use std::path::PathBuf;

/// Result type alias for recorder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while polling, streaming or recording
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Status endpoint returned an unusable response
    #[error("Status endpoint error: {0}")]
    Status(String),

    /// Audio endpoint returned an unusable response
    #[error("Stream error: {0}")]
    Stream(String),

    /// An output file could not be created
    #[error("Cannot create output file {}: {source}", path.display())]
    Sink {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration error (from djconfig/anyhow)
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a generic error from a string
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create an output-file creation error
    pub fn sink(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Sink {
            path: path.into(),
            source,
        }
    }

    /// Whether the process cannot keep running after this error
    ///
    /// Only a failure to create an output file is fatal: every other
    /// error affects a single poll or connection attempt.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Sink { .. })
    }
}
