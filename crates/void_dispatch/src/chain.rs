//! The dispatch chain
//!
//! An ordered, immutable list of [`DispatchNode`]s built once by
//! [`DispatchChainBuilder`]. Each operation walks the list from the head and
//! hands the operation to the first node that matches the session's protocol
//! version and accepts it.
//!
//! - attach: running off the end is [`DispatchError::NoLoaderFound`]
//! - set / read: running off the end means the key does not apply here

use void_core::{EntityId, Version};
use void_entity::Entity;

use crate::context::{AttachOutcome, DispatchContext};
use crate::error::{DispatchError, DispatchResult};
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyValue};
use crate::wire::{InboundOperation, OperationId, PropertyChange, PropertyUpdate};

/// Builds a [`DispatchChain`]; nodes can only be appended
pub struct DispatchChainBuilder {
    protocol: Version,
    nodes: Vec<Box<dyn DispatchNode>>,
}

impl DispatchChainBuilder {
    pub fn new(protocol: Version) -> Self {
        Self {
            protocol,
            nodes: Vec::new(),
        }
    }

    /// Append a node after all previous ones
    pub fn with<N: DispatchNode + 'static>(mut self, node: N) -> Self {
        self.nodes.push(Box::new(node));
        self
    }

    pub fn with_boxed(mut self, node: Box<dyn DispatchNode>) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn build(self) -> DispatchChain {
        let active = self
            .nodes
            .iter()
            .map(|node| {
                let ok = node.versions().contains(&self.protocol);
                if !ok {
                    log::debug!(
                        "Dispatch node '{}' ({}) inactive for protocol {}",
                        node.name(),
                        node.versions(),
                        self.protocol
                    );
                }
                ok
            })
            .collect();
        DispatchChain {
            protocol: self.protocol,
            nodes: self.nodes,
            active,
        }
    }
}

/// Immutable chain of dispatch nodes
pub struct DispatchChain {
    protocol: Version,
    nodes: Vec<Box<dyn DispatchNode>>,
    active: Vec<bool>,
}

impl DispatchChain {
    pub fn builder(protocol: Version) -> DispatchChainBuilder {
        DispatchChainBuilder::new(protocol)
    }

    pub fn protocol(&self) -> Version {
        self.protocol
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node names in dispatch order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|n| n.name())
    }

    fn find(&self, mut accepts: impl FnMut(&dyn DispatchNode) -> bool) -> Option<&dyn DispatchNode> {
        self.nodes
            .iter()
            .zip(&self.active)
            .filter(|(_, active)| **active)
            .map(|(node, _)| node.as_ref())
            .find(|node| accepts(*node))
    }

    /// Attach the content of a registered entity
    pub fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let node = {
            let entity = ctx.registry.get(id)?;
            match self.find(|n| n.can_attach(entity.payload())) {
                Some(node) => node,
                None => {
                    return Err(DispatchError::NoLoaderFound {
                        entity: id,
                        kind: entity.payload().kind(),
                    })
                }
            }
        };
        log::trace!("Entity {} attached by '{}'", id, node.name());
        node.attach(ctx, id)
    }

    /// Apply a structured update. `Ok(false)` when no node handles the key
    /// for this entity.
    pub fn set_property(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let node = {
            let entity = ctx.registry.get(id)?;
            self.setter(entity, update.key)
        };
        match node {
            Some(node) => node.set(ctx, id, update),
            None => Ok(false),
        }
    }

    /// Decode and apply a raw operation
    pub fn set_raw(&self, ctx: &mut DispatchContext<'_>, op: &InboundOperation) -> DispatchResult<bool> {
        if !ctx.registry.contains(op.entity) {
            return Err(void_entity::EntityError::NotFound(op.entity).into());
        }
        match self.decode(op.key, op.operation, &op.payload)? {
            Some(change) => {
                let update = PropertyUpdate { key: op.key, change };
                self.set_property(ctx, op.entity, &update)
            }
            None => Ok(false),
        }
    }

    /// Decode raw `Set` payload bytes into a value
    pub fn read_property(&self, key: PropertyKey, payload: &[u8]) -> DispatchResult<Option<PropertyValue>> {
        Ok(match self.decode(key, OperationId::Set, payload)? {
            Some(PropertyChange::Set(value)) => Some(value),
            _ => None,
        })
    }

    /// Decode a raw operation of any kind
    pub fn decode(
        &self,
        key: PropertyKey,
        operation: OperationId,
        payload: &[u8],
    ) -> DispatchResult<Option<PropertyChange>> {
        match self.find(|n| n.can_read(key)) {
            Some(node) => node.read(key, operation, payload),
            None => Ok(None),
        }
    }

    /// True when some node would handle `key` for `entity`
    pub fn handles(&self, entity: &Entity, key: PropertyKey) -> bool {
        self.setter(entity, key).is_some()
    }

    fn setter(&self, entity: &Entity, key: PropertyKey) -> Option<&dyn DispatchNode> {
        self.find(|n| n.can_set(entity, key))
    }
}

impl core::fmt::Debug for DispatchChain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DispatchChain")
            .field("protocol", &self.protocol)
            .field("nodes", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
