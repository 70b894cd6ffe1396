//! Batch load results

use void_core::EntityId;
use void_dispatch::DispatchError;

/// What happened to each entity of a [`load_batch`](crate::Environment::load_batch)
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Attached synchronously; already loaded
    pub attached: Vec<EntityId>,
    /// Waiting on a resource; loaded by a later tick
    pub pending: Vec<EntityId>,
    /// Failed to attach; marked failed in the registry
    pub failed: Vec<(EntityId, DispatchError)>,
    /// Already registered; left untouched
    pub duplicates: Vec<EntityId>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.attached.len() + self.pending.len() + self.failed.len() + self.duplicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Error of a failed entity
    pub fn error(&self, id: EntityId) -> Option<&DispatchError> {
        self.failed.iter().find(|(e, _)| *e == id).map(|(_, err)| err)
    }
}

impl core::fmt::Display for BatchReport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} attached, {} pending, {} failed, {} duplicate",
            self.attached.len(),
            self.pending.len(),
            self.failed.len(),
            self.duplicates.len()
        )
    }
}
