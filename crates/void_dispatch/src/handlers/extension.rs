use std::collections::BTreeMap;

use void_core::{EntityId, VersionRange};
use void_entity::{Entity, EntityPayload, ExtensionDescriptor};

use super::{changed, expect_list, mismatch};
use crate::context::{AttachOutcome, DispatchContext};
use crate::delta::apply_list_delta;
use crate::error::DispatchResult;
use crate::node::DispatchNode;
use crate::property::{PropertyKey, PropertyType, PropertyValue, ValueKind};
use crate::wire::{PropertyChange, PropertyUpdate};

/// Attach hook of an extension kind
pub type ExtensionAttachFn =
    Box<dyn Fn(&mut DispatchContext<'_>, EntityId, &ExtensionDescriptor) -> DispatchResult<AttachOutcome>>;

/// Property values of an extension entity
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyBag {
    values: BTreeMap<PropertyKey, PropertyValue>,
}

impl PropertyBag {
    pub fn get(&self, key: PropertyKey) -> Option<&PropertyValue> {
        self.values.get(&key)
    }

    pub fn insert(&mut self, key: PropertyKey, value: PropertyValue) -> Option<PropertyValue> {
        self.values.insert(key, value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyKey, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Dispatch node for a payload kind registered at runtime.
///
/// Entities whose payload is `Extension { kind, .. }` with a matching kind are
/// attached by the hook; declared properties are stored in the entity's
/// [`PropertyBag`].
pub struct ExtensionHandler {
    kind: String,
    versions: VersionRange,
    on_attach: Option<ExtensionAttachFn>,
    properties: BTreeMap<PropertyKey, PropertyType>,
}

impl ExtensionHandler {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            versions: VersionRange::any(),
            on_attach: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn with_versions(mut self, versions: VersionRange) -> Self {
        self.versions = versions;
        self
    }

    pub fn on_attach<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut DispatchContext<'_>, EntityId, &ExtensionDescriptor) -> DispatchResult<AttachOutcome>
            + 'static,
    {
        self.on_attach = Some(Box::new(f));
        self
    }

    /// Declare a property the extension stores
    pub fn with_property(mut self, key: PropertyKey, ty: PropertyType) -> Self {
        self.properties.insert(key, ty);
        self
    }

    fn owns(&self, entity: &Entity) -> bool {
        entity.payload().extension_kind() == Some(self.kind.as_str())
    }
}

impl DispatchNode for ExtensionHandler {
    fn name(&self) -> &str {
        &self.kind
    }

    fn versions(&self) -> VersionRange {
        self.versions
    }

    fn can_attach(&self, payload: &EntityPayload) -> bool {
        payload.extension_kind() == Some(self.kind.as_str())
    }

    fn attach(&self, ctx: &mut DispatchContext<'_>, id: EntityId) -> DispatchResult<AttachOutcome> {
        let descriptor = ctx.registry.get_typed::<ExtensionDescriptor>(id)?.clone();
        match &self.on_attach {
            Some(hook) => hook(ctx, id, &descriptor),
            None => Ok(AttachOutcome::Attached),
        }
    }

    fn can_set(&self, entity: &Entity, key: PropertyKey) -> bool {
        self.owns(entity) && self.properties.contains_key(&key)
    }

    fn set(
        &self,
        ctx: &mut DispatchContext<'_>,
        id: EntityId,
        update: &PropertyUpdate,
    ) -> DispatchResult<bool> {
        let key = update.key;
        let Some(ty) = self.properties.get(&key).copied() else {
            return Ok(false);
        };

        let bag = ctx.registry.get_mut(id)?.state_mut::<PropertyBag>();
        let value = match ty {
            PropertyType::Scalar(kind) => match &update.change {
                PropertyChange::Set(value) if value.kind() == kind => value.clone(),
                PropertyChange::Set(value) => return Err(mismatch(key, kind, value.kind())),
                PropertyChange::List(_) => return Err(mismatch(key, kind, ValueKind::List)),
            },
            PropertyType::List(kind) => {
                let delta = expect_list(update, kind, |v| (v.kind() == kind).then(|| v.clone()))?;
                let mut items = match bag.get(key) {
                    Some(PropertyValue::List(items)) => items.clone(),
                    _ => Vec::new(),
                };
                if !apply_list_delta(&mut items, delta) {
                    return Ok(true);
                }
                PropertyValue::List(items)
            }
        };
        bag.insert(key, value.clone());
        changed(ctx, id, key, value)
    }

    fn property_type(&self, key: PropertyKey) -> Option<PropertyType> {
        self.properties.get(&key).copied()
    }
}

impl core::fmt::Debug for ExtensionHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExtensionHandler")
            .field("kind", &self.kind)
            .field("versions", &self.versions)
            .field("properties", &self.properties.keys().collect::<Vec<_>>())
            .finish()
    }
}
