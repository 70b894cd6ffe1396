//! Dispatch context and attach completion
//!
//! Handlers never own the components they touch. Each call receives a
//! [`DispatchContext`] borrowing the registry, cache, asset pipeline and scene
//! sink of the owning environment. Attachments that need a download finish
//! later: the cache callback sends an [`AttachCompletion`] down a channel and
//! the owner applies it with [`complete_attach`] on its own thread.

use crossbeam_channel::Sender;
use void_cache::{AssetPipeline, CacheKey, ResourceCache};
use void_core::{EntityId, NativeHandle};
use void_entity::{DeletedEntity, EntityRegistry};

use crate::error::{DispatchError, DispatchResult};
use crate::sink::SceneSink;

/// Borrowed components a dispatch call works on
pub struct DispatchContext<'a> {
    pub registry: &'a mut EntityRegistry,
    pub cache: &'a mut ResourceCache,
    pub pipeline: &'a AssetPipeline,
    pub sink: &'a mut dyn SceneSink,
    pub completions: &'a Sender<AttachCompletion>,
}

/// How an attach call left the entity
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Ready now
    Attached,
    /// Waiting on a resource; an [`AttachCompletion`] follows
    Pending,
}

/// Deferred result of an attachment
#[derive(Debug)]
pub struct AttachCompletion {
    pub entity: EntityId,
    pub result: DispatchResult<Option<NativeHandle>>,
}

impl AttachCompletion {
    pub fn loaded(entity: EntityId, native: NativeHandle) -> Self {
        Self {
            entity,
            result: Ok(Some(native)),
        }
    }

    pub fn failed(entity: EntityId, error: DispatchError) -> Self {
        Self {
            entity,
            result: Err(error),
        }
    }
}

/// Cache entries an entity holds a reference to
#[derive(Debug, Default)]
pub struct ResourceLinks {
    pub keys: Vec<CacheKey>,
}

/// Finish an attach call: apply synchronous results, leave pending ones
pub fn finish_attach(
    ctx: &mut DispatchContext<'_>,
    entity: EntityId,
    outcome: DispatchResult<AttachOutcome>,
) -> DispatchResult<AttachOutcome> {
    match outcome {
        Ok(AttachOutcome::Pending) => Ok(AttachOutcome::Pending),
        Ok(AttachOutcome::Attached) => {
            complete_attach(
                ctx,
                AttachCompletion {
                    entity,
                    result: Ok(None),
                },
            );
            Ok(AttachOutcome::Attached)
        }
        Err(e) => {
            complete_attach(ctx, AttachCompletion::failed(entity, e.clone()));
            Err(e)
        }
    }
}

/// Apply an attachment result on the owning context.
///
/// On success the native object is set on the entity (and registered as a
/// renderable of nodes), the sink attaches it and waiters are released. On
/// failure the entity is marked failed. Deletes deferred behind the load run
/// afterwards.
pub fn complete_attach(ctx: &mut DispatchContext<'_>, completion: AttachCompletion) {
    let AttachCompletion { entity: id, result } = completion;
    if !ctx.registry.contains(id) {
        log::debug!("Dropping attach result for removed entity {}", id);
        return;
    }

    match result {
        Ok(native) => {
            if let Some(native) = native {
                if let Ok(entity) = ctx.registry.get_mut(id) {
                    entity.set_native(native.clone());
                    if entity.is_node() {
                        if let Err(e) = ctx.registry.attach_renderable(id, native) {
                            log::warn!("Entity {} loaded without a renderable: {}", id, e);
                        }
                    }
                }
            }
            if let Ok(entity) = ctx.registry.get(id) {
                ctx.sink.attach(entity);
            }
            log::debug!("Entity {} loaded", id);
            ctx.registry.notify_loaded(id);
        }
        Err(e) => {
            log::error!("Entity {} failed to load: {}", id, e);
            ctx.registry.notify_failed(id);
        }
    }

    for deleted in ctx.registry.take_deleted() {
        release_deleted(ctx, &deleted);
    }
}

/// Release what a removed entity held: scene objects and cache references
pub fn release_deleted(ctx: &mut DispatchContext<'_>, deleted: &DeletedEntity) {
    ctx.sink.detach(deleted);
    if let Some(links) = deleted.state::<ResourceLinks>() {
        for key in &links.keys {
            ctx.cache.unload(key, deleted.id);
        }
    }
}
