use glam::Vec2;
use void_core::EntityId;
use void_entity::{Entity, EntityPayload, UiRectDescriptor};

use super::{changed, expect_value, NodeHandler};
use crate::context::{AttachOutcome, DispatchContext};
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::PropertyUpdate;

/// UI rectangles: size, anchors, pivot and colour
#[derive(Debug, Default, Clone, Copy)]
pub struct UiHandler {
    base: NodeHandler,
}

impl UiHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn own_type(key: PropertyKey) -> Option<PropertyType> {
        match key {
            PropertyKey::UI_SIZE
            | PropertyKey::UI_ANCHOR_MIN
            | PropertyKey::UI_ANCHOR_MAX
            | PropertyKey::UI_PIVOT => Some(PropertyType::Scalar(ValueKind::Vec2)),
            PropertyKey::COLOR => Some(PropertyType::Scalar(ValueKind::Color)),
            _ => None,
        }
    }

    fn layout_field(rect: &mut UiRectDescriptor, key: PropertyKey) -> Option<&mut Vec2> {
        match key {
            PropertyKey::UI_SIZE => Some(&mut rect.size),
            PropertyKey::UI_ANCHOR_MIN => Some(&mut rect.anchor_min),
            PropertyKey::UI_ANCHOR_MAX => Some(&mut rect.anchor_max),
            PropertyKey::UI_PIVOT => Some(&mut rect.pivot),
            _ => None,
        }
    }
}

impl DispatchNode for UiHandler {
    fn name(&self) -> &str {
        "ui_rect"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::UiRect(_))
    }

    fn attach(&self, _ctx: &mut DispatchContext<'_>, _id: EntityId) -> DispatchResult<AttachOutcome> {
        Ok(AttachOutcome::Attached)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::UiRect(_))
            && (self.base.can_set(entity, key) || Self::own_type(key).is_some())
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let key = update.key;
        if NodeHandler::is_base_key(key) {
            return self.base.set(ctx, id, update);
        }

        let value = if key == PropertyKey::COLOR {
            let color = expect_value(update, ValueKind::Color, PropertyValue::as_color)?;
            ctx.registry.get_typed_mut::<UiRectDescriptor>(id)?.color = color;
            PropertyValue::Color(color)
        } else {
            let v = expect_value(update, ValueKind::Vec2, PropertyValue::as_vec2)?;
            let rect = ctx.registry.get_typed_mut::<UiRectDescriptor>(id)?;
            match Self::layout_field(rect, key) {
                Some(field) => *field = v,
                None => return Ok(false),
            }
            PropertyValue::Vec2(v)
        };
        changed(ctx, id, key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        NodeHandler::base_type(key).or_else(|| Self::own_type(key))
    }
}
