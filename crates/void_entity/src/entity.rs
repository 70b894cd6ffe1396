//! Entity and node data
//!
//! An [`Entity`] is the registry's record of one remote entity: its payload,
//! the native object attached once content is loaded, the loaded flag and an
//! optional deletion hook. Spatial kinds additionally carry [`NodeData`].
//!
//! Parent and child links are ids, not owning pointers. A node never owns its
//! children; whichever subsystem created an entity owns it, and the registry
//! only keeps the back-references consistent.

use core::any::{Any, TypeId};
use std::collections::HashMap;

use glam::{Mat4, Quat, Vec3};
use void_core::{EntityId, NativeHandle};

use crate::payload::{EntityPayload, NodeDescriptor};

/// Hook run once when an entity is removed from the registry
pub type DeleteHook = Box<dyn FnOnce(&mut Entity)>;

type StateSlots = HashMap<TypeId, Box<dyn Any>>;

/// Local transform of a node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Spatial part of a node entity
#[derive(Debug, Default)]
pub struct NodeData {
    pub transform: Transform,
    pub active: bool,
    pub is_static: bool,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
    pub(crate) renderables: Vec<NativeHandle>,
    pub(crate) colliders: Vec<NativeHandle>,
}

impl NodeData {
    pub fn from_descriptor(descriptor: &NodeDescriptor) -> Self {
        Self {
            transform: Transform {
                position: descriptor.position,
                rotation: descriptor.rotation,
                scale: descriptor.scale,
            },
            active: descriptor.active,
            is_static: descriptor.is_static,
            parent: None,
            children: Vec::new(),
            renderables: Vec::new(),
            colliders: Vec::new(),
        }
    }

    /// Parent id; the parent itself may not be registered yet
    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn renderables(&self) -> &[NativeHandle] {
        &self.renderables
    }

    pub fn colliders(&self) -> &[NativeHandle] {
        &self.colliders
    }
}

/// Registry record of a remote entity
pub struct Entity {
    id: EntityId,
    payload: EntityPayload,
    native: Option<NativeHandle>,
    loaded: bool,
    node: Option<NodeData>,
    on_delete: Option<DeleteHook>,
    state: StateSlots,
}

impl Entity {
    pub(crate) fn new(id: EntityId, payload: EntityPayload, native: Option<NativeHandle>) -> Self {
        let node = payload.node().map(NodeData::from_descriptor);
        Self {
            id,
            payload,
            native,
            loaded: false,
            node,
            on_delete: None,
            state: HashMap::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn payload(&self) -> &EntityPayload {
        &self.payload
    }

    /// Mutable payload, for property handlers keeping descriptors current.
    /// Changing the payload's kind is not supported.
    pub fn payload_mut(&mut self) -> &mut EntityPayload {
        &mut self.payload
    }

    pub fn native(&self) -> Option<&NativeHandle> {
        self.native.as_ref()
    }

    /// Attach a native object, returning the one it replaces
    pub fn set_native(&mut self, native: NativeHandle) -> Option<NativeHandle> {
        self.native.replace(native)
    }

    pub fn take_native(&mut self) -> Option<NativeHandle> {
        self.native.take()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn mark_loaded(&mut self) -> bool {
        !core::mem::replace(&mut self.loaded, true)
    }

    pub fn is_node(&self) -> bool {
        self.node.is_some()
    }

    pub fn node(&self) -> Option<&NodeData> {
        self.node.as_ref()
    }

    pub fn node_mut(&mut self) -> Option<&mut NodeData> {
        self.node.as_mut()
    }

    /// Install the deletion hook, replacing any previous one
    pub fn set_on_delete(&mut self, hook: impl FnOnce(&mut Entity) + 'static) {
        self.on_delete = Some(Box::new(hook));
    }

    pub(crate) fn into_parts(self) -> (EntityPayload, Option<NativeHandle>, StateSlots) {
        (self.payload, self.native, self.state)
    }

    pub(crate) fn take_on_delete(&mut self) -> Option<DeleteHook> {
        self.on_delete.take()
    }

    /// Handler-owned state attached to this entity
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|s| s.downcast_ref::<T>())
    }

    /// Handler-owned state, created with `Default` on first access
    pub fn state_mut<T: Any + Default>(&mut self) -> &mut T {
        self.state
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("state slot keyed by its own TypeId")
    }

    pub fn remove_state<T: Any>(&mut self) -> Option<T> {
        self.state
            .remove(&TypeId::of::<T>())
            .and_then(|s| s.downcast::<T>().ok())
            .map(|b| *b)
    }
}

impl core::fmt::Debug for Entity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("kind", &self.payload.kind())
            .field("loaded", &self.loaded)
            .field("native", &self.native)
            .field("node", &self.node.is_some())
            .finish()
    }
}

/// What is left of an entity after deletion; the caller releases the handles
#[derive(Debug)]
pub struct DeletedEntity {
    pub id: EntityId,
    pub payload: EntityPayload,
    pub native: Option<NativeHandle>,
    pub renderables: Vec<NativeHandle>,
    pub colliders: Vec<NativeHandle>,
    pub(crate) state: StateSlots,
}

impl DeletedEntity {
    /// Handler state the entity carried when it was removed
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state
            .get(&TypeId::of::<T>())
            .and_then(|s| s.downcast_ref::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{GenericNodeDescriptor, GroupDescriptor};

    fn id(raw: u64) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    #[test]
    fn test_node_data_from_payload() {
        let mut node = NodeDescriptor::default();
        node.position = Vec3::new(1.0, 0.0, 0.0);
        let entity = Entity::new(id(1), GenericNodeDescriptor { node }.into(), None);
        assert!(entity.is_node());
        assert_eq!(entity.node().unwrap().transform.position.x, 1.0);

        let group = Entity::new(id(2), GroupDescriptor::default().into(), None);
        assert!(!group.is_node());
    }

    #[test]
    fn test_mark_loaded_once() {
        let mut entity = Entity::new(id(1), GroupDescriptor::default().into(), None);
        assert!(entity.mark_loaded());
        assert!(!entity.mark_loaded());
        assert!(entity.is_loaded());
    }

    #[test]
    fn test_state_slots() {
        #[derive(Default)]
        struct Counter(u32);

        let mut entity = Entity::new(id(1), GroupDescriptor::default().into(), None);
        assert!(entity.state::<Counter>().is_none());
        entity.state_mut::<Counter>().0 += 2;
        entity.state_mut::<Counter>().0 += 1;
        assert_eq!(entity.state::<Counter>().map(|c| c.0), Some(3));
        assert_eq!(entity.remove_state::<Counter>().map(|c| c.0), Some(3));
        assert!(entity.state::<Counter>().is_none());
    }
}
