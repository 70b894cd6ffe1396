//! Where filtered values go
//!
//! Filtered updates are applied through the same dispatch path as
//! authoritative ones. [`ChainSink`] is that path; tests and tools can use any
//! closure instead.

use void_core::EntityId;
use void_dispatch::{DispatchChain, DispatchContext, DispatchResult, PropertyUpdate};

/// Receives updates produced by the synchronizer
pub trait UpdateSink {
    /// Apply `update` to `entity`; `Ok(false)` when nothing handled it
    fn apply(&mut self, entity: EntityId, update: &PropertyUpdate) -> DispatchResult<bool>;
}

impl<F> UpdateSink for F
where
    F: FnMut(EntityId, &PropertyUpdate) -> DispatchResult<bool>,
{
    fn apply(&mut self, entity: EntityId, update: &PropertyUpdate) -> DispatchResult<bool> {
        self(entity, update)
    }
}

/// Applies updates through a dispatch chain
pub struct ChainSink<'c, 'a> {
    chain: &'c DispatchChain,
    ctx: &'c mut DispatchContext<'a>,
}

impl<'c, 'a> ChainSink<'c, 'a> {
    pub fn new(chain: &'c DispatchChain, ctx: &'c mut DispatchContext<'a>) -> Self {
        Self { chain, ctx }
    }
}

impl UpdateSink for ChainSink<'_, '_> {
    fn apply(&mut self, entity: EntityId, update: &PropertyUpdate) -> DispatchResult<bool> {
        self.chain.set_property(self.ctx, entity, update)
    }
}
