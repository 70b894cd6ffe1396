//! # void_dispatch - Entity Dispatch
//!
//! Routes entity attachment and property updates through an ordered chain of
//! capability-gated handlers:
//! - Immutable [`DispatchChain`] built once by [`DispatchChainBuilder`]
//! - Per-node protocol version ranges
//! - Raw `(entity, key, operation, payload)` tuples decoded by the chain that
//!   owns the key, then applied through the same path as structured updates
//! - Ordered-list deltas shared by every list-valued property
//! - Built-in handlers for every entity kind, plus runtime extension kinds
//!
//! ## Example
//!
//! ```ignore
//! use void_dispatch::prelude::*;
//!
//! let chain = standard_chain(Version::new(1, 0, 0)).build();
//! chain.attach(&mut ctx, id)?;
//! chain.set_raw(&mut ctx, &InboundOperation::set(id, PropertyKey::POSITION, Vec3::X)?)?;
//! ```

pub mod chain;
pub mod context;
pub mod delta;
pub mod error;
pub mod handlers;
pub mod node;
pub mod property;
pub mod sink;
pub mod wire;

pub use chain::{DispatchChain, DispatchChainBuilder};
pub use context::{
    complete_attach, finish_attach, release_deleted, AttachCompletion, AttachOutcome, DispatchContext,
    ResourceLinks,
};
pub use delta::{apply_list_delta, ListDelta};
pub use error::{DispatchError, DispatchResult};
pub use handlers::{
    request_resource, standard_chain, AudioHandler, ExtensionAttachFn, ExtensionHandler, GroupHandler,
    LightHandler, LineHandler, MaterialHandler, ModelHandler, NodeHandler, PropertyBag, UiHandler,
};
pub use node::{DispatchNode, DispatchNodeExt, Versioned};
pub use property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
pub use sink::{NullSink, SceneSink};
pub use wire::{decode_change, write_value, InboundOperation, OperationId, PropertyChange, PropertyUpdate};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::chain::{DispatchChain, DispatchChainBuilder};
    pub use crate::context::{AttachOutcome, DispatchContext};
    pub use crate::delta::ListDelta;
    pub use crate::error::{DispatchError, DispatchResult};
    pub use crate::handlers::standard_chain;
    pub use crate::node::{DispatchNode, DispatchNodeExt};
    pub use crate::property::{PropertyKey, PropertyValue, ValueKind};
    pub use crate::sink::SceneSink;
    pub use crate::wire::{InboundOperation, OperationId, PropertyUpdate};
    pub use void_core::Version;
}
