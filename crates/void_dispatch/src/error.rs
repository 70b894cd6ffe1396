//! Dispatch errors

use thiserror::Error;
use void_cache::CacheError;
use void_core::EntityId;
use void_entity::{EntityError, EntityKind};

use crate::property::{PropertyKey, ValueKind};

/// Errors raised while routing attachments and property updates
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DispatchError {
    /// No node in the chain can attach this entity's payload
    #[error("No loader found for entity {entity} ({kind})")]
    NoLoaderFound { entity: EntityId, kind: EntityKind },

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Property {key} expects {expected}, got {found}")]
    ValueKind {
        key: PropertyKey,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("Malformed payload for property {key}: {message}")]
    Codec { key: PropertyKey, message: String },

    #[error("Unknown operation id {0}")]
    UnknownOperation(u8),

    #[error("Resource of entity {0} has no recognizable format")]
    UnknownFormat(EntityId),
}

pub type DispatchResult<T> = Result<T, DispatchError>;
