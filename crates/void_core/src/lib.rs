//! # void_core - Environment Core Primitives
//!
//! Small, dependency-free building blocks shared by every crate that takes
//! part in loading a remote environment:
//! - [`EntityId`]: non-zero entity identifiers
//! - [`Version`] / [`VersionRange`]: protocol compatibility checks
//! - [`CancellationToken`]: cooperative cancellation of long waits
//! - [`NativeHandle`]: shared, type-erased loaded objects
//!
//! The optional `serde` feature derives (de)serialization for the id and
//! version types so they can travel inside wire descriptors.

pub mod cancel;
pub mod handle;
pub mod id;
pub mod version;

pub use cancel::CancellationToken;
pub use handle::NativeHandle;
pub use id::{EntityId, InvalidEntityId};
pub use version::{Version, VersionRange};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::handle::NativeHandle;
    pub use crate::id::EntityId;
    pub use crate::version::{Version, VersionRange};
}
