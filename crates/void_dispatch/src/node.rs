//! Dispatch node trait
//!
//! A node is one link of the chain. For each operation shape it answers a
//! capability question (`can_*`) and, when it says yes, handles the
//! operation. Every default declines, so a node only implements the shapes
//! it cares about.

use void_core::{EntityId, VersionRange};
use void_entity::{Entity, EntityPayload};

use crate::context::{AttachOutcome, DispatchContext};
use crate::error::{DispatchError, DispatchResult};
use crate::property::{PropertyKey, PropertyType};
use crate::wire::{decode_change, OperationId, PropertyChange, PropertyUpdate};

/// One link of a [`DispatchChain`](crate::DispatchChain)
pub trait DispatchNode {
    /// Name for logs
    fn name(&self) -> &str;

    /// Protocol versions this node understands
    fn versions(&self) -> VersionRange {
        VersionRange::any()
    }

    fn can_attach(&self, _payload: &EntityPayload) -> bool {
        false
    }

    /// Attach the entity's content. Only called after `can_attach` accepted.
    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let kind = ctx.registry.get(id)?.payload().kind();
        Err(DispatchError::NoLoaderFound { entity: id, kind })
    }

    fn can_set(&self, _entity: &Entity, _key: PropertyKey) -> bool {
        false
    }

    /// Apply an update. Only called after `can_set` accepted.
    fn set(
        &self,
        _ctx: &mut DispatchContext<'_>,
        _id: EntityId,
        _update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        Ok(false)
    }

    /// Declared type of a key this node reads
    fn property_type(&self, _key: PropertyKey) -> Option<PropertyType> {
        None
    }

    fn can_read(&self, key: PropertyKey) -> bool {
        self.property_type(key).is_some()
    }

    /// Decode raw payload bytes for `key`
    fn read(
        &self,
        key: PropertyKey,
        operation: OperationId,
        payload: &[u8],
    ) -> DispatchResult<Option<PropertyChange>> {
        match self.property_type(key) {
            Some(ty) => decode_change(key, ty, operation, payload).map(Some),
            None => Ok(None),
        }
    }
}

/// A node restricted to a protocol version range
pub struct Versioned<N> {
    inner: N,
    versions: VersionRange,
}

impl<N: DispatchNode> DispatchNode for Versioned<N> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn versions(&self) -> VersionRange {
        self.versions
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        self.inner.can_attach(payload)
    }

    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        self.inner.attach(ctx, id)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        self.inner.can_set(entity, key)
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        self.inner.set(ctx, id, update)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        self.inner.property_type(key)
    }

    fn can_read(&self, key: PropertyKey) -> bool {
        self.inner.can_read(key)
    }

    fn read(
        &self,
        key: PropertyKey,
        operation: OperationId,
        payload: &[u8],
    ) -> DispatchResult<Option<PropertyChange>> {
        self.inner.read(key, operation, payload)
    }
}

/// Adapters available on every node
pub trait DispatchNodeExt: DispatchNode + Sized {
    /// Only take part in dispatch for protocol versions in `versions`
    fn for_versions(self, versions: VersionRange) -> Versioned<Self> {
        Versioned {
            inner: self,
            versions,
        }
    }
}

impl<N: DispatchNode> DispatchNodeExt for N {}
