//! Error types for the muxdl library.

use thiserror::Error;

/// Why a single stream transfer stopped before completing.
///
/// `Cancelled` is not a failure: it marks a deliberate stop requested through
/// [`StreamFetcher::destroy`](crate::fetcher::StreamFetcher::destroy).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The transfer was stopped on purpose.
    #[error("transfer cancelled")]
    Cancelled,

    /// The underlying transfer failed.
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Returns true for the cancellation sentinel.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

/// Errors that can occur during download operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON in a manifest or command body.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The conversion or merge backend reported a failure.
    #[error("Post-processing failed: {0}")]
    PostProcess(String),

    /// A start request named no streams.
    #[error("Download request contains no streams")]
    NoStreams,

    /// A format or container name that is not a plain file extension.
    #[error("Invalid file extension: {0:?}")]
    InvalidExtension(String),

    /// The HTTP API could not be started.
    #[error("API server error: {0}")]
    Api(String),
}

/// A specialized `Result` type for muxdl operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_become_transport_failures() {
        let err: FetchError = std::io::Error::other("disk full").into();
        assert_eq!(err, FetchError::Transport("disk full".to_string()));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn cancelled_is_the_sentinel() {
        assert!(FetchError::Cancelled.is_cancelled());
        assert_eq!(FetchError::Cancelled.to_string(), "transfer cancelled");
    }

    #[test]
    fn invalid_extension_quotes_the_input() {
        let err = Error::InvalidExtension("mp4/..".to_string());
        assert_eq!(err.to_string(), r#"Invalid file extension: "mp4/..""#);
    }
}
