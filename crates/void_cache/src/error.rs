//! Cache and transport errors
//!
//! Errors are `Clone` because one failed fetch is fanned out to every
//! request queued on the same entry.

use thiserror::Error;

/// Failures of the content fetch primitive
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Credentials were rejected; a refreshed authorization may succeed
    #[error("Authorization expired for {0}")]
    AuthorizationExpired(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error("Timeout fetching {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Resource cache errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("No decoder for extension '{0}'")]
    NoDecoder(String),

    #[error("Decode failed for {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Sub-asset '{0}' not found")]
    SubAssetNotFound(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    /// The entry was evicted or the cache cleared while the fetch was in flight
    #[error("Cache entry cleared: {0}")]
    Cleared(String),

    #[error("Manifest error: {0}")]
    Manifest(String),
}

impl CacheError {
    /// True for failures a retry policy may act on
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

pub type CacheResult<T> = Result<T, CacheError>;
pub type TransportResult<T> = Result<T, TransportError>;
