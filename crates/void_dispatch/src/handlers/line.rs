use void_core::EntityId;
use void_entity::{Entity, EntityPayload, LineDescriptor};

use super::{changed, expect_list, expect_value, NodeHandler};
use crate::context::{AttachOutcome, DispatchContext};
use crate::delta::apply_list_delta;
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::PropertyUpdate;

/// Polylines: vertex list, width, colour and loop flag
#[derive(Debug, Default, Clone, Copy)]
pub struct LineHandler {
    base: NodeHandler,
}

impl LineHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn own_type(key: PropertyKey) -> Option<PropertyType> {
        Some(match key {
            PropertyKey::LINE_POSITIONS => PropertyType::List(ValueKind::Vec3),
            PropertyKey::LINE_WIDTH => PropertyType::Scalar(ValueKind::Float),
            PropertyKey::LINE_LOOP => PropertyType::Scalar(ValueKind::Bool),
            PropertyKey::COLOR => PropertyType::Scalar(ValueKind::Color),
            _ => return None,
        })
    }
}

impl DispatchNode for LineHandler {
    fn name(&self) -> &str {
        "line"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Line(_))
    }

    fn attach(&self, _ctx: &mut DispatchContext<'_>, _id: EntityId) -> DispatchResult<AttachOutcome> {
        // Geometry is built by the sink from the descriptor
        Ok(AttachOutcome::Attached)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Line(_))
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
            PropertyKey::LINE_POSITIONS => {
                let delta = expect_list(update, ValueKind::Vec3, PropertyValue::as_vec3)?;
                let line = ctx.registry.get_typed_mut::<LineDescriptor>(id)?;
                if !apply_list_delta(&mut line.positions, delta) {
                    return Ok(true);
                }
                PropertyValue::List(line.positions.iter().map(|p| PropertyValue::Vec3(*p)).collect())
            }
            PropertyKey::LINE_WIDTH => {
                let width = expect_value(update, ValueKind::Float, PropertyValue::as_float)?;
                ctx.registry.get_typed_mut::<LineDescriptor>(id)?.width = width;
                PropertyValue::Float(width)
            }
            PropertyKey::LINE_LOOP => {
                let looped = expect_value(update, ValueKind::Bool, PropertyValue::as_bool)?;
                ctx.registry.get_typed_mut::<LineDescriptor>(id)?.looped = looped;
                PropertyValue::Bool(looped)
            }
            PropertyKey::COLOR => {
                let color = expect_value(update, ValueKind::Color, PropertyValue::as_color)?;
                ctx.registry.get_typed_mut::<LineDescriptor>(id)?.color = color;
                PropertyValue::Color(color)
            }
            _ => return Ok(false),
        };
        changed(ctx, id, key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        NodeHandler::base_type(key).or_else(|| Self::own_type(key))
    }
}
