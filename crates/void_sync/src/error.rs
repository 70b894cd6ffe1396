//! Synchronizer errors

use thiserror::Error;
use void_core::EntityId;
use void_dispatch::{DispatchError, PropertyKey, ValueKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    #[error("Property {key} of entity {entity} is already filtered")]
    AlreadyFiltering { entity: EntityId, key: PropertyKey },

    #[error("Property {key} of entity {entity} is not filtered")]
    NotFiltering { entity: EntityId, key: PropertyKey },

    #[error("Property {key}: {kind} values cannot be filtered")]
    UnfilterableType { key: PropertyKey, kind: ValueKind },

    #[error("Property {key} is filtered as {expected}, got {found}")]
    KindMismatch {
        key: PropertyKey,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type SyncResult<T> = Result<T, SyncError>;
