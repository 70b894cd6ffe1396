use void_core::EntityId;
use void_entity::{Entity, EntityPayload, ModelDescriptor};

use super::{changed, entity_list, expect_list, request_resource, NodeHandler};
use crate::context::{AttachOutcome, DispatchContext};
use crate::delta::apply_list_delta;
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, ValueKind};
use crate::wire::PropertyUpdate;

/// Models: mesh resource through the cache, material override slots
#[derive(Debug, Default, Clone, Copy)]
pub struct ModelHandler {
    base: NodeHandler,
}

impl ModelHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DispatchNode for ModelHandler {
    fn name(&self) -> &str {
        "model"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Model(_))
    }

    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let resource = ctx.registry.get_typed::<ModelDescriptor>(id)?.resource.clone();
        request_resource(ctx, id, &resource)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Model(_))
            && (self.base.can_set(entity, key) || key == PropertyKey::MATERIAL_OVERRIDES)
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        if NodeHandler::is_base_key(update.key) {
            return self.base.set(ctx, id, update);
        }
        if update.key != PropertyKey::MATERIAL_OVERRIDES {
            return Ok(false);
        }

        let delta = expect_list(update, ValueKind::Entity, |v| v.as_entity().flatten())?;
        let model = ctx.registry.get_typed_mut::<ModelDescriptor>(id)?;
        if !apply_list_delta(&mut model.material_overrides, delta) {
            return Ok(true);
        }
        let value = entity_list(&model.material_overrides);
        changed(ctx, id, update.key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        match key {
            PropertyKey::MATERIAL_OVERRIDES => Some(PropertyType::List(ValueKind::Entity)),
            _ => NodeHandler::base_type(key),
        }
    }
}

