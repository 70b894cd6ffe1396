//! Built-in dispatch nodes
//!
//! [`NodeHandler`] owns the keys every spatial entity shares. The specialised
//! handlers for spatial kinds wrap one and let it try each update first, so
//! the base keys are implemented once.

mod extension;
mod group;
mod light;
mod line;
mod media;
mod model;
mod node;
mod ui;

pub use extension::{ExtensionAttachFn, ExtensionHandler, PropertyBag};
pub use group::GroupHandler;
pub use light::LightHandler;
pub use line::LineHandler;
pub use media::{AudioHandler, MaterialHandler};
pub use model::ModelHandler;
pub use node::NodeHandler;
pub use ui::UiHandler;

use std::path::Path;

use void_cache::{AssetBundle, CacheRequest};
use void_core::{EntityId, Version};
use void_entity::{EntityError, ResourceRef};

use crate::chain::DispatchChainBuilder;
use crate::context::{AttachCompletion, AttachOutcome, DispatchContext, ResourceLinks};
use crate::delta::ListDelta;
use crate::error::{DispatchError, DispatchResult};
use crate::property::{PropertyKey, PropertyValue, ValueKind};
use crate::wire::{PropertyChange, PropertyUpdate};

/// Builder preloaded with every built-in handler
pub fn standard_chain(protocol: Version) -> DispatchChainBuilder {
    DispatchChainBuilder::new(protocol)
        .with(ModelHandler::new())
        .with(LineHandler::new())
        .with(LightHandler::new())
        .with(UiHandler::new())
        .with(GroupHandler::new())
        .with(MaterialHandler::new())
        .with(AudioHandler::new())
        .with(NodeHandler::new())
}

/// Request an entity's resource through the cache.
///
/// The result arrives as an [`AttachCompletion`] on the context's channel.
/// The cache key is recorded on the entity so deleting it drops the
/// reference.
pub fn request_resource(
    ctx: &mut DispatchContext<'_>,
    id: EntityId,
    resource: &ResourceRef,
) -> DispatchResult<AttachOutcome> {
    let extension = resource
        .extension()
        .ok_or(DispatchError::UnknownFormat(id))?;
    let library = resource.library.as_deref();
    let key = ctx.cache.resolve_key(&resource.url, library)?;
    let local = ctx.cache.local_path(&key).map(Path::to_path_buf);
    let fetch = ctx.pipeline.fetch_fn(&resource.url, &extension, local);

    let loaded_tx = ctx.completions.clone();
    let failed_tx = ctx.completions.clone();
    let mut request = CacheRequest::new(resource.url.clone(), fetch)
        .referrer(id)
        .on_success(move |native| {
            let _ = loaded_tx.send(AttachCompletion::loaded(id, native));
        })
        .on_failure(move |e| {
            let _ = failed_tx.send(AttachCompletion::failed(id, e.into()));
        });
    if let Some(library) = library {
        request = request.library(library);
    }
    if let Some(name) = resource.sub_asset.clone() {
        request = request.extract(move |value| AssetBundle::extract(value, &name));
    }

    let requested = ctx.cache.request(request)?;
    log::debug!(
        "Entity {} requested {} ({:?})",
        id,
        requested.key,
        requested.status
    );
    ctx.registry
        .get_mut(id)?
        .state_mut::<ResourceLinks>()
        .keys
        .push(requested.key);
    Ok(AttachOutcome::Pending)
}

pub(crate) fn mismatch(key: PropertyKey, expected: ValueKind, found: ValueKind) -> DispatchError {
    DispatchError::ValueKind {
        key,
        expected,
        found,
    }
}

/// The value of a scalar update, converted by `get`
pub(crate) fn expect_value<T>(
    update: &PropertyUpdate,
    expected: ValueKind,
    get: impl FnOnce(&PropertyValue) -> Option<T>,
) -> DispatchResult<T> {
    let value = match &update.change {
        PropertyChange::Set(value) => value,
        PropertyChange::List(_) => return Err(mismatch(update.key, expected, ValueKind::List)),
    };
    get(value).ok_or_else(|| mismatch(update.key, expected, value.kind()))
}

/// The delta of a list update with elements converted by `get`. Setting a
/// whole list is a `ReplaceAll`.
pub(crate) fn expect_list<T>(
    update: &PropertyUpdate,
    element: ValueKind,
    mut get: impl FnMut(&PropertyValue) -> Option<T>,
) -> DispatchResult<ListDelta<T>> {
    let delta = match &update.change {
        PropertyChange::List(delta) => delta.clone(),
        PropertyChange::Set(PropertyValue::List(values)) => ListDelta::ReplaceAll(values.clone()),
        PropertyChange::Set(other) => {
            return Err(mismatch(update.key, ValueKind::List, other.kind()))
        }
    };
    let key = update.key;
    delta.try_map(|value| get(&value).ok_or_else(|| mismatch(key, element, value.kind())))
}

/// Report a changed value to the sink
pub(crate) fn changed(
    ctx: &mut DispatchContext<'_>,
    id: EntityId,
    key: PropertyKey,
    value: PropertyValue,
) -> DispatchResult<bool> {
    ctx.sink.property_changed(id, key, &value);
    Ok(true)
}

pub(crate) fn entity_list(ids: &[EntityId]) -> PropertyValue {
    PropertyValue::List(ids.iter().map(|id| PropertyValue::Entity(Some(*id))).collect())
}

pub(crate) fn not_a_node(id: EntityId, found: &str) -> DispatchError {
    EntityError::TypeMismatch {
        entity: id,
        expected: "node",
        found: found.to_string(),
    }
    .into()
}
