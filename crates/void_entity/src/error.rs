//! Registry errors

use thiserror::Error;
use void_core::EntityId;

/// Errors reported by the entity registry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("Entity not found: {0}")]
    NotFound(EntityId),

    #[error("Type mismatch for entity {entity}: expected {expected}, found {found}")]
    TypeMismatch {
        entity: EntityId,
        expected: &'static str,
        found: String,
    },

    #[error("Entity {0} failed to load")]
    LoadFailed(EntityId),

    #[error("Wait for entity {0} was cancelled")]
    Cancelled(EntityId),
}

pub type EntityResult<T> = Result<T, EntityError>;
