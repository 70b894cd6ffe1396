//! Environment errors
//!
//! Wraps the error of every component so callers driving an
//! [`Environment`](crate::Environment) handle a single type.

use std::path::PathBuf;

use thiserror::Error;
use void_cache::CacheError;
use void_dispatch::DispatchError;
use void_entity::EntityError;
use void_sync::SyncError;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Invalid protocol version '{0}'")]
    InvalidVersion(String),

    #[error("Invalid entity descriptors: {0}")]
    Descriptors(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

pub type EnvironmentResult<T> = Result<T, EnvironmentError>;
