use void_core::EntityId;
use void_entity::{Entity, EntityPayload, LightDescriptor};

use super::{changed, expect_value, NodeHandler};
use crate::context::{AttachOutcome, DispatchContext};
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::PropertyUpdate;

/// Lights: colour, intensity and range
#[derive(Debug, Default, Clone, Copy)]
pub struct LightHandler {
    base: NodeHandler,
}

impl LightHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn own_type(key: PropertyKey) -> Option<PropertyType> {
        match key {
            PropertyKey::COLOR => Some(PropertyType::Scalar(ValueKind::Color)),
            PropertyKey::LIGHT_INTENSITY | PropertyKey::LIGHT_RANGE => {
                Some(PropertyType::Scalar(ValueKind::Float))
            }
            _ => None,
        }
    }
}

impl DispatchNode for LightHandler {
    fn name(&self) -> &str {
        "light"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Light(_))
    }

    fn attach(&self, _ctx: &mut DispatchContext<'_>, _id: EntityId) -> DispatchResult<AttachOutcome> {
        Ok(AttachOutcome::Attached)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Light(_))
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

        let value = match key {
            PropertyKey::COLOR => {
                let color = expect_value(update, ValueKind::Color, PropertyValue::as_color)?;
                ctx.registry.get_typed_mut::<LightDescriptor>(id)?.color = color;
                PropertyValue::Color(color)
            }
            PropertyKey::LIGHT_INTENSITY => {
                let intensity = expect_value(update, ValueKind::Float, PropertyValue::as_float)?;
                ctx.registry.get_typed_mut::<LightDescriptor>(id)?.intensity = intensity.max(0.0);
                PropertyValue::Float(intensity.max(0.0))
            }
            PropertyKey::LIGHT_RANGE => {
                let range = expect_value(update, ValueKind::Float, PropertyValue::as_float)?;
                ctx.registry.get_typed_mut::<LightDescriptor>(id)?.range = range.max(0.0);
                PropertyValue::Float(range.max(0.0))
            }
            _ => return Ok(false),
        };
        changed(ctx, id, key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        NodeHandler::base_type(key).or_else(|| Self::own_type(key))
    }
}
