//! The environment context
//!
//! [`Environment`] owns every component of a loaded environment and is the
//! only thing that touches them. Background fetches hand their results back
//! through channels; [`Environment::tick`] applies them on the owning thread
//! together with the synchronizer's per-frame regression.
//!
//! ```text
//! descriptors ──► registry ──► dispatch chain ──► cache ──► (fetch)
//!                    ▲              ▲                          │
//!                    │              └── synchronizer ◄── ops   │
//!                    └────────── tick ◄── completions ◄────────┘
//! ```

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use void_cache::{AssetPipeline, AuthExpiryRetry, DecoderRegistry, LibraryManifest, ResourceCache};
use void_core::{CancellationToken, EntityId, Version};
use void_dispatch::{
    complete_attach, finish_attach, release_deleted, standard_chain, AttachCompletion, AttachOutcome,
    DispatchChain, DispatchContext, DispatchNode, InboundOperation, NullSink, OperationId,
    PropertyChange, PropertyKey, PropertyUpdate, PropertyValue, SceneSink,
};
use void_entity::{DeleteOutcome, EntityDescriptor, EntityRegistry, LoadWait, WaitHandle};
use void_sync::{ChainSink, PropertySynchronizer};

use crate::batch::BatchReport;
use crate::config::EnvironmentConfig;
use crate::error::EnvironmentResult;

/// Components a dispatch call borrows
struct Components<S> {
    registry: EntityRegistry,
    cache: ResourceCache,
    pipeline: AssetPipeline,
    sink: S,
    completions: Sender<AttachCompletion>,
}

impl<S: SceneSink> Components<S> {
    fn ctx(&mut self) -> DispatchContext<'_> {
        DispatchContext {
            registry: &mut self.registry,
            cache: &mut self.cache,
            pipeline: &self.pipeline,
            sink: &mut self.sink,
            completions: &self.completions,
        }
    }
}

/// Result of one [`Environment::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Cache fetches that finished
    pub fetches: usize,
    /// Deferred attachments applied
    pub attachments: usize,
    /// Filtered updates applied
    pub filtered: usize,
    /// Cancelled or abandoned load waits dropped
    pub purged_waits: usize,
}

/// Builds an [`Environment`]
pub struct EnvironmentBuilder<S = NullSink> {
    config: EnvironmentConfig,
    pipeline: Option<AssetPipeline>,
    sink: S,
    nodes: Vec<Box<dyn DispatchNode>>,
    runtime: Option<tokio::runtime::Handle>,
}

impl EnvironmentBuilder<NullSink> {
    pub fn new(config: EnvironmentConfig) -> Self {
        Self {
            config,
            pipeline: None,
            sink: NullSink,
            nodes: Vec::new(),
            runtime: None,
        }
    }
}

impl<S: SceneSink> EnvironmentBuilder<S> {
    /// Scene sink receiving attach, detach and property effects
    pub fn sink<T: SceneSink>(self, sink: T) -> EnvironmentBuilder<T> {
        EnvironmentBuilder {
            config: self.config,
            pipeline: self.pipeline,
            sink,
            nodes: self.nodes,
            runtime: self.runtime,
        }
    }

    /// Fetch-and-decode pipeline; defaults to one without decoders
    pub fn pipeline(mut self, pipeline: AssetPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Shorthand for a default pipeline with `decoders`
    pub fn decoders(self, decoders: DecoderRegistry) -> Self {
        self.pipeline(AssetPipeline::new(decoders))
    }

    /// Extra dispatch node, consulted after the built-in handlers
    pub fn node<N: DispatchNode + 'static>(mut self, node: N) -> Self {
        self.nodes.push(Box::new(node));
        self
    }

    /// Run fetches on a tokio runtime instead of polling them on tick
    pub fn runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> EnvironmentResult<Environment<S>> {
        let config = self.config;
        let protocol = config.protocol()?;

        let chain = self
            .nodes
            .into_iter()
            .fold(standard_chain(protocol), |chain, node| chain.with_boxed(node))
            .build();

        let mut pipeline = self
            .pipeline
            .unwrap_or_else(|| AssetPipeline::new(DecoderRegistry::new()));
        if let Some(root) = &config.cache.library_root {
            pipeline = pipeline.with_library_root(root.clone());
        }
        if let Some(authorization) = &config.cache.authorization {
            pipeline.set_authorization(Some(authorization.clone()));
        }

        let mut cache = ResourceCache::new();
        if config.cache.retry_attempts > 1 {
            cache.set_retry_policy(AuthExpiryRetry::new(config.cache.retry_attempts));
        }
        if let Some(handle) = self.runtime {
            cache = cache.with_runtime(handle);
        }

        let (tx, rx) = unbounded();
        log::info!(
            "Environment ready: protocol {}, {} dispatch nodes",
            protocol,
            chain.len()
        );

        Ok(Environment {
            sync: PropertySynchronizer::new(config.sync),
            config,
            chain,
            parts: Components {
                registry: EntityRegistry::new(),
                cache,
                pipeline,
                sink: self.sink,
                completions: tx,
            },
            completion_rx: rx,
            now: Duration::ZERO,
        })
    }
}

/// Owns and drives every component of one loaded environment
pub struct Environment<S = NullSink> {
    config: EnvironmentConfig,
    chain: DispatchChain,
    sync: PropertySynchronizer,
    parts: Components<S>,
    completion_rx: Receiver<AttachCompletion>,
    now: Duration,
}

impl Environment<NullSink> {
    pub fn builder(config: EnvironmentConfig) -> EnvironmentBuilder<NullSink> {
        EnvironmentBuilder::new(config)
    }
}

impl<S: SceneSink> Environment<S> {
    // Accessors

    pub fn config(&self) -> &EnvironmentConfig {
        &self.config
    }

    pub fn protocol(&self) -> Version {
        self.chain.protocol()
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.parts.registry
    }

    pub fn cache(&self) -> &ResourceCache {
        &self.parts.cache
    }

    pub fn pipeline(&self) -> &AssetPipeline {
        &self.parts.pipeline
    }

    pub fn chain(&self) -> &DispatchChain {
        &self.chain
    }

    pub fn synchronizer(&self) -> &PropertySynchronizer {
        &self.sync
    }

    pub fn sink(&self) -> &S {
        &self.parts.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.parts.sink
    }

    /// Time of the last tick
    pub fn now(&self) -> Duration {
        self.now
    }

    // Loading

    /// Register every descriptor, then attach the new ones.
    ///
    /// A failed attachment only fails its own entity. Entities already
    /// registered are reported as duplicates and not attached again.
    pub fn load_batch(&mut self, descriptors: Vec<EntityDescriptor>) -> BatchReport {
        let mut report = BatchReport::default();
        let mut created = Vec::with_capacity(descriptors.len());

        // Register all first so references inside the batch resolve
        for EntityDescriptor { id, payload } in descriptors {
            let registration = self.parts.registry.register(id, payload, None);
            if registration.created {
                created.push(id);
            } else {
                report.duplicates.push(id);
            }
        }

        for id in created {
            let mut ctx = self.parts.ctx();
            let outcome = self.chain.attach(&mut ctx, id);
            match finish_attach(&mut ctx, id, outcome) {
                Ok(AttachOutcome::Attached) => report.attached.push(id),
                Ok(AttachOutcome::Pending) => report.pending.push(id),
                Err(e) => report.failed.push((id, e)),
            }
        }

        log::debug!("Batch loaded: {}", report);
        report
    }

    /// Register a library's files with the cache. Returns true when the
    /// server has a newer version than the one on disk.
    pub fn load_library(&mut self, manifest: &LibraryManifest, server_date: &str) -> bool {
        self.parts.cache.add_library(manifest);
        let stale = !manifest.is_up_to_date(server_date);
        if stale {
            log::info!(
                "Library '{}' is out of date (local {:?}, server {:?})",
                manifest.key,
                manifest.date,
                server_date
            );
        } else {
            log::debug!("Library '{}' is up to date", manifest.key);
        }
        stale
    }

    /// [`load_library`](Self::load_library) from a manifest file
    pub fn load_library_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
        server_date: &str,
    ) -> EnvironmentResult<bool> {
        let manifest = LibraryManifest::load(path)?;
        Ok(self.load_library(&manifest, server_date))
    }

    // Waiting

    pub fn wait_until_loaded(
        &mut self,
        id: EntityId,
        on_loaded: impl FnOnce(EntityId) + 'static,
        on_failed: impl FnOnce(EntityId) + 'static,
    ) -> Option<WaitHandle> {
        self.parts.registry.wait_until_loaded(id, on_loaded, on_failed)
    }

    pub fn wait_until_loaded_with(
        &mut self,
        id: EntityId,
        token: &CancellationToken,
        on_loaded: impl FnOnce(EntityId) + 'static,
        on_failed: impl FnOnce(EntityId) + 'static,
    ) -> Option<WaitHandle> {
        self.parts
            .registry
            .wait_until_loaded_with(id, token, on_loaded, on_failed)
    }

    pub fn cancel_wait(&mut self, handle: WaitHandle) -> bool {
        self.parts.registry.cancel_wait(handle)
    }

    /// Future resolving once `id` loads or fails
    pub fn loaded(&mut self, id: EntityId, token: Option<&CancellationToken>) -> LoadWait {
        self.parts.registry.loaded(id, token)
    }

    // Updates

    /// Apply an inbound operation.
    ///
    /// `Set` operations on filtered properties become measurements stamped
    /// with the last tick time; everything else goes straight to the chain.
    pub fn apply(&mut self, op: &InboundOperation) -> EnvironmentResult<bool> {
        if op.operation == OperationId::Set && self.sync.is_filtering(op.entity, op.key) {
            return match self.chain.decode(op.key, op.operation, &op.payload)? {
                Some(PropertyChange::Set(value)) => {
                    self.sync.on_measurement(op.entity, op.key, &value, self.now)?;
                    Ok(true)
                }
                _ => Ok(false),
            };
        }
        Ok(self.chain.set_raw(&mut self.parts.ctx(), op)?)
    }

    /// Structured form of [`apply`](Self::apply)
    pub fn apply_update(&mut self, entity: EntityId, update: &PropertyUpdate) -> EnvironmentResult<bool> {
        if let (PropertyChange::Set(value), true) =
            (&update.change, self.sync.is_filtering(entity, update.key))
        {
            self.sync.on_measurement(entity, update.key, value, self.now)?;
            return Ok(true);
        }
        Ok(self.chain.set_property(&mut self.parts.ctx(), entity, update)?)
    }

    /// Smooth `key` of `entity` from now on, starting from `initial`
    pub fn start_filter(
        &mut self,
        entity: EntityId,
        key: PropertyKey,
        initial: PropertyValue,
    ) -> EnvironmentResult<()> {
        let target = self.parts.registry.get(entity)?;
        if !self.chain.handles(target, key) {
            log::warn!("Filtering {} of entity {}, which nothing handles", key, entity);
        }
        Ok(self.sync.start(entity, key, initial, self.now)?)
    }

    /// Stop smoothing and apply `value` exactly
    pub fn stop_filter(
        &mut self,
        entity: EntityId,
        key: PropertyKey,
        value: PropertyValue,
    ) -> EnvironmentResult<bool> {
        let mut ctx = self.parts.ctx();
        let mut sink = ChainSink::new(&self.chain, &mut ctx);
        Ok(self.sync.stop(entity, key, value, &mut sink)?)
    }

    // Lifecycle

    /// Delete an entity, releasing its scene objects and cache references.
    /// Loading entities are released once their load resolves.
    pub fn delete(&mut self, id: EntityId) -> DeleteOutcome {
        let dropped = self.sync.remove_entity(id);
        if dropped > 0 {
            log::debug!("Dropped {} filters of deleted entity {}", dropped, id);
        }
        let outcome = self.parts.registry.delete(id);
        if let DeleteOutcome::Deleted(deleted) = &outcome {
            release_deleted(&mut self.parts.ctx(), deleted);
        }
        outcome
    }

    /// Advance to `now`: apply finished fetches and attachments, drop
    /// cancelled waits, then emit filtered values
    pub fn tick(&mut self, now: Duration) -> TickReport {
        if now < self.now {
            log::warn!("Tick went back in time ({:?} < {:?})", now, self.now);
        }
        self.now = now;

        let fetches = self.parts.cache.process();

        let mut attachments = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            complete_attach(&mut self.parts.ctx(), completion);
            attachments += 1;
        }

        let purged_waits = self.parts.registry.purge_cancelled();
        if purged_waits > 0 {
            log::trace!("Purged {} cancelled waits", purged_waits);
        }

        let filtered = {
            let mut ctx = self.parts.ctx();
            let mut sink = ChainSink::new(&self.chain, &mut ctx);
            self.sync.tick(now, &mut sink)
        };

        TickReport {
            fetches,
            attachments,
            filtered,
            purged_waits,
        }
    }

    /// Tear everything down. Waiters are told their entities failed.
    pub fn clear(&mut self) {
        self.sync.clear();
        let removed = self.parts.registry.clear();
        let count = removed.len();
        for deleted in &removed {
            release_deleted(&mut self.parts.ctx(), deleted);
        }
        self.parts.cache.clear_all();
        while self.completion_rx.try_recv().is_ok() {}
        log::info!("Environment cleared ({} entities removed)", count);
    }
}
