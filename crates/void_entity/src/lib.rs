//! # void_entity - Entity Registry
//!
//! Tracks every entity a remote environment announces:
//! - Idempotent registration keyed by server id
//! - Load waiters for forward references, fired in registration order
//! - Completion futures with cooperative cancellation
//! - Deferred deletion of entities that are still loading
//! - By-id parent links resolved when the parent arrives
//!
//! ## Example
//!
//! ```ignore
//! use void_entity::prelude::*;
//!
//! let mut registry = EntityRegistry::new();
//! registry.wait_until_loaded(id, |id| log::info!("{} ready", id), |_| {});
//! registry.register(id, payload, None);
//! registry.notify_loaded(id);
//! ```

pub mod entity;
pub mod error;
pub mod payload;
pub mod registry;
pub mod waiter;

pub use entity::{DeleteHook, DeletedEntity, Entity, NodeData, Transform};
pub use error::{EntityError, EntityResult};
pub use payload::*;
pub use registry::{DeleteOutcome, EntityRegistry, Registration};
pub use waiter::{LoadWait, WaitCallback, WaitHandle};

pub use void_core::{CancellationToken, EntityId, NativeHandle};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::entity::{Entity, NodeData, Transform};
    pub use crate::error::{EntityError, EntityResult};
    pub use crate::payload::{EntityDescriptor, EntityKind, EntityPayload, PayloadDescriptor};
    pub use crate::registry::{DeleteOutcome, EntityRegistry, Registration};
    pub use crate::waiter::{LoadWait, WaitHandle};
    pub use void_core::{CancellationToken, EntityId, NativeHandle};
}
