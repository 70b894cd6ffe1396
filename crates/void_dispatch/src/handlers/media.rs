use void_core::EntityId;
use void_entity::{AudioDescriptor, Entity, EntityPayload, MaterialDescriptor};

use super::{changed, expect_value, request_resource};
use crate::context::{AttachOutcome, DispatchContext};
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::PropertyUpdate;

/// Materials: optional texture through the cache, base colour
#[derive(Debug, Default, Clone, Copy)]
pub struct MaterialHandler;

impl MaterialHandler {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchNode for MaterialHandler {
    fn name(&self) -> &str {
        "material"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Material(_))
    }

    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let texture = ctx.registry.get_typed::<MaterialDescriptor>(id)?.texture.clone();
        match texture {
            Some(texture) => request_resource(ctx, id, &texture),
            None => Ok(AttachOutcome::Attached),
        }
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Material(_)) && key == PropertyKey::COLOR
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let color = expect_value(update, ValueKind::Color, PropertyValue::as_color)?;
        ctx.registry.get_typed_mut::<MaterialDescriptor>(id)?.color = color;
        changed(ctx, id, update.key, PropertyValue::Color(color))
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        (key == PropertyKey::COLOR).then_some(PropertyType::Scalar(ValueKind::Color))
    }
}

/// Audio clips: clip resource through the cache, volume and looping
#[derive(Debug, Default, Clone, Copy)]
pub struct AudioHandler;

impl AudioHandler {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchNode for AudioHandler {
    fn name(&self) -> &str {
        "audio"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Audio(_))
    }

    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let resource = ctx.registry.get_typed::<AudioDescriptor>(id)?.resource.clone();
        request_resource(ctx, id, &resource)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Audio(_))
            && matches!(key, PropertyKey::AUDIO_VOLUME | PropertyKey::AUDIO_LOOP)
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let value = match update.key {
            PropertyKey::AUDIO_VOLUME => {
                let volume = expect_value(update, ValueKind::Float, PropertyValue::as_float)?
                    .clamp(0.0, 1.0);
                ctx.registry.get_typed_mut::<AudioDescriptor>(id)?.volume = volume;
                PropertyValue::Float(volume)
            }
            PropertyKey::AUDIO_LOOP => {
                let looping = expect_value(update, ValueKind::Bool, PropertyValue::as_bool)?;
                ctx.registry.get_typed_mut::<AudioDescriptor>(id)?.looping = looping;
                PropertyValue::Bool(looping)
            }
            _ => return Ok(false),
        };
        changed(ctx, id, update.key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        match key {
            PropertyKey::AUDIO_VOLUME => Some(PropertyType::Scalar(ValueKind::Float)),
            PropertyKey::AUDIO_LOOP => Some(PropertyType::Scalar(ValueKind::Bool)),
            _ => None,
        }
    }
}
