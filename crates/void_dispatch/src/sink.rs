//! Scene attachment contract
//!
//! The renderer side of the system. Dispatch tells the sink when an entity's
//! content is ready, when it goes away and when a property changed; what the
//! sink does with that is outside this crate.

use void_core::EntityId;
use void_entity::{DeletedEntity, Entity, Transform};

use crate::property::{PropertyKey, PropertyValue};

/// Receives scene-side effects of dispatch
pub trait SceneSink {
    /// Entity finished loading; its native object, if any, is on the entity
    fn attach(&mut self, entity: &Entity);

    /// Entity was removed; release whatever was attached for it
    fn detach(&mut self, entity: &DeletedEntity);

    fn transform_changed(&mut self, _id: EntityId, _transform: &Transform) {}

    fn property_changed(&mut self, _id: EntityId, _key: PropertyKey, _value: &PropertyValue) {}
}

/// Sink that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl SceneSink for NullSink {
    fn attach(&mut self, entity: &Entity) {
        log::trace!("NullSink: attach {}", entity.id());
    }

    fn detach(&mut self, entity: &DeletedEntity) {
        log::trace!("NullSink: detach {}", entity.id);
    }
}
