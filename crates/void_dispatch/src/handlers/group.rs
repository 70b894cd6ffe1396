use void_core::EntityId;
use void_entity::{Entity, EntityPayload, GroupDescriptor};

use super::{changed, entity_list, expect_list};
use crate::context::{AttachOutcome, DispatchContext};
use crate::delta::apply_list_delta;
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, ValueKind};
use crate::wire::PropertyUpdate;

/// Entity groups: an ordered member list
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupHandler;

impl GroupHandler {
    pub fn new() -> Self {
        Self
    }
}

impl DispatchNode for GroupHandler {
    fn name(&self) -> &str {
        "group"
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        matches!(payload, EntityPayload::Group(_))
    }

    fn attach(&self, _ctx: &mut DispatchContext<'_>, _id: EntityId) -> DispatchResult<AttachOutcome> {
        Ok(AttachOutcome::Attached)
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        matches!(entity.payload(), EntityPayload::Group(_)) && key == PropertyKey::GROUP_MEMBERS
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let delta = expect_list(update, ValueKind::Entity, |v| v.as_entity().flatten())?;
        let group = ctx.registry.get_typed_mut::<GroupDescriptor>(id)?;
        if !apply_list_delta(&mut group.members, delta) {
            return Ok(true);
        }
        let value = entity_list(&group.members);
        changed(ctx, id, update.key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        (key == PropertyKey::GROUP_MEMBERS).then_some(PropertyType::List(ValueKind::Entity))
    }
}
