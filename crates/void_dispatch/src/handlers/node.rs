use void_core::EntityId;
use void_entity::{Entity, EntityPayload, EntityRegistry, NodeData, Transform};

use super::{changed, expect_value, not_a_node};
use crate::context::{AttachOutcome, DispatchContext};
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::PropertyUpdate;

/// Base node: transform, parent, active and static flags of every spatial
/// entity. Attaches plain nodes and scenes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NodeHandler;

impl NodeHandler {
    pub fn new() -> Self {
        Self
    }

    /// Type of a base key
    pub fn base_type(key: PropertyKey) -> Option<PropertyType> {
        let kind = match key {
            PropertyKey::POSITION | PropertyKey::SCALE => ValueKind::Vec3,
            PropertyKey::ROTATION => ValueKind::Rotation,
            PropertyKey::PARENT => ValueKind::Entity,
            PropertyKey::ACTIVE | PropertyKey::STATIC => ValueKind::Bool,
            _ => return None,
        };
        Some(PropertyType::Scalar(kind))
    }

    pub fn is_base_key(key: PropertyKey) -> bool {
        Self::base_type(key).is_some()
    }
}

fn node_mut(registry: &mut EntityRegistry, id: EntityId) -> DispatchResult<&mut NodeData> {
    let entity = registry.get_mut(id)?;
    let kind = entity.payload().kind();
    entity.node_mut().ok_or_else(|| not_a_node(id, kind.name()))
}

fn update_transform(
    ctx: &mut DispatchContext<'_>,
    id: EntityId,
    apply: impl FnOnce(&mut Transform),
) -> DispatchResult<bool> {
    let transform = {
        let node = node_mut(ctx.registry, id)?;
        apply(&mut node.transform);
        node.transform
    };
    ctx.sink.transform_changed(id, &transform);
    Ok(true)
}

impl DispatchNode for NodeHandler {
    fn name(&self) -> &str {
        "node"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Scene(_) | EntityPayload::Node(_))
    }

    fn attach(&self, _ctx: &mut DispatchContext<'_>, _id: EntityId) -> DispatchResult<AttachOutcome> {
        Ok(AttachOutcome::Attached)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        entity.is_node() && Self::is_base_key(key)
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let key = update.key;
        match key {
            PropertyKey::POSITION => {
                let v = expect_value(update, ValueKind::Vec3, PropertyValue::as_vec3)?;
                update_transform(ctx, id, |t| t.position = v)
            }
            PropertyKey::ROTATION => {
                let q = expect_value(update, ValueKind::Rotation, PropertyValue::as_rotation)?;
                update_transform(ctx, id, |t| t.rotation = q.normalize())
            }
            PropertyKey::SCALE => {
                let v = expect_value(update, ValueKind::Vec3, PropertyValue::as_vec3)?;
                update_transform(ctx, id, |t| t.scale = v)
            }
            PropertyKey::PARENT => {
                let parent = expect_value(update, ValueKind::Entity, PropertyValue::as_entity)?;
                ctx.registry.set_parent(id, parent)?;
                changed(ctx, id, key, PropertyValue::Entity(parent))
            }
            PropertyKey::ACTIVE => {
                let active = expect_value(update, ValueKind::Bool, PropertyValue::as_bool)?;
                node_mut(ctx.registry, id)?.active = active;
                changed(ctx, id, key, PropertyValue::Bool(active))
            }
            PropertyKey::STATIC => {
                let is_static = expect_value(update, ValueKind::Bool, PropertyValue::as_bool)?;
                node_mut(ctx.registry, id)?.is_static = is_static;
                changed(ctx, id, key, PropertyValue::Bool(is_static))
            }
            _ => Ok(false),
        }
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        Self::base_type(key)
    }
}
