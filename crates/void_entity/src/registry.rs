//! Entity registry
//!
//! Maps server ids to [`Entity`] records and resolves forward references:
//! anything may wait on an id before it is registered, and the wait is
//! resolved when the entity is later reported loaded or failed.
//!
//! All mutation happens on one logical context. Waiter callbacks run
//! synchronously inside `notify_loaded` / `notify_failed`, in the order they
//! were registered, after the registry's own bookkeeping for that id is done.
//!
//! Deleting an entity that is still loading is deferred until its load
//! resolves; the removed entity is then queued and can be collected with
//! [`EntityRegistry::take_deleted`].

use std::collections::{HashMap, HashSet};

use tokio::sync::oneshot;
use void_core::{CancellationToken, EntityId, NativeHandle};

use crate::entity::{DeletedEntity, Entity};
use crate::error::{EntityError, EntityResult};
use crate::payload::{EntityPayload, PayloadDescriptor};
use crate::waiter::{load_wait_callbacks, LoadWait, WaitCallback, WaitHandle, Waiter};

/// Result of [`EntityRegistry::register`]
#[derive(Debug)]
pub struct Registration {
    /// False when the id was already registered
    pub created: bool,
    /// Handle supplied to an idempotent registration; the caller releases it
    pub discarded: Option<NativeHandle>,
}

/// Result of [`EntityRegistry::delete`]
#[derive(Debug)]
pub enum DeleteOutcome {
    /// Removed now; the caller releases the detached handles
    Deleted(DeletedEntity),
    /// Still loading; removal happens after the load resolves
    Deferred,
    /// The id had only failed to load; its failure record was cleared
    ClearedFailure,
    /// Never seen. Logged, never fatal.
    Unknown,
}

impl DeleteOutcome {
    pub fn is_deleted(&self) -> bool {
        matches!(self, Self::Deleted(_))
    }
}

/// Id to entity table with load waiters and deferred deletion
#[derive(Default)]
pub struct EntityRegistry {
    entities: HashMap<EntityId, Entity>,
    waiters: HashMap<EntityId, Vec<Waiter>>,
    failed: HashSet<EntityId>,
    pending_deletes: HashSet<EntityId>,
    /// Children whose parent is not registered yet, keyed by parent id
    orphans: HashMap<EntityId, Vec<EntityId>>,
    deleted: Vec<DeletedEntity>,
    next_slot: u64,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity. Idempotent: a second registration of the same id
    /// keeps the existing entity and hands the new native handle back.
    pub fn register(
        &mut self,
        id: EntityId,
        payload: EntityPayload,
        native: Option<NativeHandle>,
    ) -> Registration {
        if self.entities.contains_key(&id) {
            log::debug!("Entity {} already registered, keeping existing", id);
            return Registration {
                created: false,
                discarded: native,
            };
        }

        let parent = payload.node().and_then(|n| n.parent);
        let entity = Entity::new(id, payload, native);
        let is_node = entity.is_node();
        log::debug!("Registered entity {} ({})", id, entity.payload().kind());
        self.entities.insert(id, entity);

        if is_node {
            if let Some(parent) = parent {
                // Fresh entity, so the only possible failure is a non-node parent
                if let Err(e) = self.set_parent(id, Some(parent)) {
                    log::warn!("Entity {}: {}", id, e);
                }
            }
        }
        self.adopt_orphans(id);

        Registration {
            created: true,
            discarded: None,
        }
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> EntityResult<&Entity> {
        self.entities.get(&id).ok_or(EntityError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: EntityId) -> EntityResult<&mut Entity> {
        self.entities.get_mut(&id).ok_or(EntityError::NotFound(id))
    }

    /// Payload descriptor of a given kind
    pub fn get_typed<D: PayloadDescriptor>(&self, id: EntityId) -> EntityResult<&D> {
        let entity = self.get(id)?;
        D::from_payload(entity.payload()).ok_or_else(|| EntityError::TypeMismatch {
            entity: id,
            expected: D::KIND.name(),
            found: entity.payload().kind().name().to_string(),
        })
    }

    /// Mutable payload descriptor of a given kind
    pub fn get_typed_mut<D: PayloadDescriptor>(&mut self, id: EntityId) -> EntityResult<&mut D> {
        let entity = self.get_mut(id)?;
        let found = entity.payload().kind();
        D::from_payload_mut(entity.payload_mut()).ok_or_else(|| EntityError::TypeMismatch {
            entity: id,
            expected: D::KIND.name(),
            found: found.name().to_string(),
        })
    }

    /// Attached native object of a given type
    pub fn get_native<T: core::any::Any>(&self, id: EntityId) -> EntityResult<&T> {
        let entity = self.get(id)?;
        let native = entity.native();
        native
            .and_then(|n| n.downcast_ref::<T>())
            .ok_or_else(|| EntityError::TypeMismatch {
                entity: id,
                expected: core::any::type_name::<T>(),
                found: native.map_or("none", |n| n.type_name()).to_string(),
            })
    }

    pub fn is_loaded(&self, id: EntityId) -> bool {
        self.entities.get(&id).map_or(false, |e| e.is_loaded())
    }

    pub fn is_failed(&self, id: EntityId) -> bool {
        self.failed.contains(&id)
    }

    /// Registered but neither loaded nor failed
    pub fn is_pending(&self, id: EntityId) -> bool {
        self.entities
            .get(&id)
            .map_or(false, |e| !e.is_loaded() && !self.failed.contains(&id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    // Waiters

    /// Run `on_loaded` once the entity is loaded, or `on_failed` if it fails.
    ///
    /// Fires synchronously and returns `None` when the outcome is already
    /// known. The id does not have to be registered yet.
    pub fn wait_until_loaded(
        &mut self,
        id: EntityId,
        on_loaded: impl FnOnce(EntityId) + 'static,
        on_failed: impl FnOnce(EntityId) + 'static,
    ) -> Option<WaitHandle> {
        self.add_waiter(id, None, None, Box::new(on_loaded), Box::new(on_failed))
    }

    /// Like [`wait_until_loaded`](Self::wait_until_loaded), but the wait is
    /// dropped without firing once `token` is cancelled
    pub fn wait_until_loaded_with(
        &mut self,
        id: EntityId,
        token: &CancellationToken,
        on_loaded: impl FnOnce(EntityId) + 'static,
        on_failed: impl FnOnce(EntityId) + 'static,
    ) -> Option<WaitHandle> {
        self.add_waiter(
            id,
            Some(token.clone()),
            None,
            Box::new(on_loaded),
            Box::new(on_failed),
        )
    }

    /// Completion future for an entity's load
    pub fn loaded(&mut self, id: EntityId, token: Option<&CancellationToken>) -> LoadWait {
        if token.map_or(false, |t| t.is_cancelled()) {
            return LoadWait::ready(id, Err(EntityError::Cancelled(id)));
        }
        if let Some(result) = self.resolved(id) {
            return LoadWait::ready(id, result);
        }
        let (tx, rx) = oneshot::channel();
        let (on_loaded, on_failed) = load_wait_callbacks(tx);
        let released = CancellationToken::new();
        self.add_waiter(id, token.cloned(), Some(released.clone()), on_loaded, on_failed);
        LoadWait::pending(id, token.cloned(), rx, released)
    }

    /// Remove a stored waiter. Returns false if it already fired.
    pub fn cancel_wait(&mut self, handle: WaitHandle) -> bool {
        let Some(list) = self.waiters.get_mut(&handle.entity) else {
            return false;
        };
        let before = list.len();
        list.retain(|w| w.slot != handle.slot);
        let removed = list.len() != before;
        if list.is_empty() {
            self.waiters.remove(&handle.entity);
        }
        removed
    }

    /// Drop every waiter whose token was cancelled. Returns how many went.
    pub fn purge_cancelled(&mut self) -> usize {
        let mut purged = 0;
        self.waiters.retain(|_, list| {
            let before = list.len();
            list.retain(|w| !w.is_cancelled());
            purged += before - list.len();
            !list.is_empty()
        });
        purged
    }

    /// Stored waiter records across all ids, cancelled ones included
    pub fn waiter_slots(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    /// Live waiters stored for `id`
    pub fn waiter_count(&self, id: EntityId) -> usize {
        self.waiters
            .get(&id)
            .map_or(0, |list| list.iter().filter(|w| !w.is_cancelled()).count())
    }

    /// Mark an entity loaded and fire its waiters. Idempotent.
    pub fn notify_loaded(&mut self, id: EntityId) {
        match self.entities.get_mut(&id) {
            Some(entity) => {
                if !entity.mark_loaded() {
                    return;
                }
                log::debug!("Entity {} loaded", id);
            }
            None => log::warn!("Entity {} reported loaded but was never registered", id),
        }
        self.failed.remove(&id);

        for waiter in self.take_waiters(id) {
            (waiter.on_loaded)(id);
        }
        self.run_deferred_delete(id);
    }

    /// Record a load failure and fire the failure callbacks
    pub fn notify_failed(&mut self, id: EntityId) {
        if self.is_loaded(id) {
            log::warn!("Entity {} reported failed after it loaded", id);
            return;
        }
        if !self.failed.insert(id) {
            return;
        }
        log::debug!("Entity {} failed to load", id);

        for waiter in self.take_waiters(id) {
            (waiter.on_failed)(id);
        }
        self.run_deferred_delete(id);
    }

    // Hierarchy

    /// Link `child` under `parent`, or detach it with `None`.
    ///
    /// The parent does not have to exist yet; the link is kept by id and the
    /// parent's child list is filled in when it registers.
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) -> EntityResult<()> {
        if parent == Some(child) {
            log::warn!("Entity {} cannot be its own parent", child);
            return Ok(());
        }
        if let Some(parent_id) = parent {
            if let Some(p) = self.entities.get(&parent_id) {
                if !p.is_node() {
                    return Err(EntityError::TypeMismatch {
                        entity: parent_id,
                        expected: "node",
                        found: p.payload().kind().name().to_string(),
                    });
                }
            }
        }

        let node = self.node_data_mut(child)?;
        let old = core::mem::replace(&mut node.parent, parent);
        if let Some(old) = old {
            self.unlink_child(old, child);
        }

        if let Some(parent_id) = parent {
            match self.entities.get_mut(&parent_id).and_then(|p| p.node_mut()) {
                Some(p) => {
                    if !p.children.contains(&child) {
                        p.children.push(child);
                    }
                }
                None => {
                    log::debug!("Entity {} parked until parent {} registers", child, parent_id);
                    self.orphans.entry(parent_id).or_default().push(child);
                }
            }
        }
        Ok(())
    }

    pub fn attach_renderable(&mut self, id: EntityId, handle: NativeHandle) -> EntityResult<()> {
        self.node_data_mut(id)?.renderables.push(handle);
        Ok(())
    }

    pub fn attach_collider(&mut self, id: EntityId, handle: NativeHandle) -> EntityResult<()> {
        self.node_data_mut(id)?.colliders.push(handle);
        Ok(())
    }

    // Deletion

    /// Delete an entity.
    ///
    /// Loading entities are deleted once their load resolves. Ids that only
    /// failed have their failure record cleared. Unknown ids are logged.
    pub fn delete(&mut self, id: EntityId) -> DeleteOutcome {
        if self.is_pending(id) {
            log::debug!("Deferring delete of loading entity {}", id);
            self.pending_deletes.insert(id);
            return DeleteOutcome::Deferred;
        }
        if let Some(deleted) = self.remove_entity(id) {
            return DeleteOutcome::Deleted(deleted);
        }
        if self.failed.remove(&id) {
            return DeleteOutcome::ClearedFailure;
        }
        log::warn!("Delete of unknown entity {}", id);
        DeleteOutcome::Unknown
    }

    /// Entities removed by deferred deletes since the last call
    pub fn take_deleted(&mut self) -> Vec<DeletedEntity> {
        core::mem::take(&mut self.deleted)
    }

    /// Remove everything. Outstanding waiters are told their entity failed.
    pub fn clear(&mut self) -> Vec<DeletedEntity> {
        let mut waiters: Vec<(EntityId, Vec<Waiter>)> = self.waiters.drain().collect();
        waiters.sort_by_key(|(id, _)| *id);
        for (id, list) in waiters {
            for waiter in list.into_iter().filter(|w| !w.is_cancelled()) {
                (waiter.on_failed)(id);
            }
        }

        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort();
        let mut removed = core::mem::take(&mut self.deleted);
        for id in ids {
            if let Some(deleted) = self.remove_entity(id) {
                removed.push(deleted);
            }
        }

        self.failed.clear();
        self.pending_deletes.clear();
        self.orphans.clear();
        log::debug!("Registry cleared, {} entities removed", removed.len());
        removed
    }

    // Internals

    fn resolved(&self, id: EntityId) -> Option<EntityResult<()>> {
        if self.is_loaded(id) {
            Some(Ok(()))
        } else if self.failed.contains(&id) {
            Some(Err(EntityError::LoadFailed(id)))
        } else {
            None
        }
    }

    fn add_waiter(
        &mut self,
        id: EntityId,
        token: Option<CancellationToken>,
        released: Option<CancellationToken>,
        on_loaded: WaitCallback,
        on_failed: WaitCallback,
    ) -> Option<WaitHandle> {
        if token.as_ref().map_or(false, |t| t.is_cancelled()) {
            return None;
        }
        match self.resolved(id) {
            Some(Ok(())) => {
                on_loaded(id);
                return None;
            }
            Some(Err(_)) => {
                on_failed(id);
                return None;
            }
            None => {}
        }

        self.next_slot += 1;
        let slot = self.next_slot;
        let list = self.waiters.entry(id).or_default();
        list.retain(|w| !w.is_cancelled());
        list.push(Waiter {
            slot,
            token,
            released,
            on_loaded,
            on_failed,
        });
        Some(WaitHandle { entity: id, slot })
    }

    fn take_waiters(&mut self, id: EntityId) -> impl Iterator<Item = Waiter> {
        self.waiters
            .remove(&id)
            .unwrap_or_default()
            .into_iter()
            .filter(|w| !w.is_cancelled())
    }

    fn run_deferred_delete(&mut self, id: EntityId) {
        if self.pending_deletes.remove(&id) {
            if let Some(deleted) = self.remove_entity(id) {
                log::debug!("Deferred delete of entity {} done", id);
                self.deleted.push(deleted);
            }
        }
    }

    fn node_data_mut(&mut self, id: EntityId) -> EntityResult<&mut crate::entity::NodeData> {
        let entity = self.entities.get_mut(&id).ok_or(EntityError::NotFound(id))?;
        let kind = entity.payload().kind();
        entity.node_mut().ok_or_else(|| EntityError::TypeMismatch {
            entity: id,
            expected: "node",
            found: kind.name().to_string(),
        })
    }

    fn unlink_child(&mut self, parent: EntityId, child: EntityId) {
        if let Some(p) = self.entities.get_mut(&parent).and_then(|p| p.node_mut()) {
            p.children.retain(|c| *c != child);
        }
        if let Some(parked) = self.orphans.get_mut(&parent) {
            parked.retain(|c| *c != child);
            if parked.is_empty() {
                self.orphans.remove(&parent);
            }
        }
    }

    fn adopt_orphans(&mut self, parent: EntityId) {
        let Some(children) = self.orphans.remove(&parent) else {
            return;
        };
        let is_node = self.entities.get(&parent).map_or(false, |p| p.is_node());
        if !is_node {
            log::warn!(
                "Entity {} is not a node, dropping {} parent links",
                parent,
                children.len()
            );
            for child in children {
                if let Some(node) = self.entities.get_mut(&child).and_then(|c| c.node_mut()) {
                    node.parent = None;
                }
            }
            return;
        }

        let adopted: Vec<EntityId> = children
            .into_iter()
            .filter(|c| {
                self.entities
                    .get(c)
                    .and_then(|e| e.node())
                    .map_or(false, |n| n.parent == Some(parent))
            })
            .collect();
        if let Some(node) = self.entities.get_mut(&parent).and_then(|p| p.node_mut()) {
            for child in adopted {
                if !node.children.contains(&child) {
                    node.children.push(child);
                }
            }
        }
    }

    /// Destruction order: detach attachments, unlink parent and children,
    /// run the hook, drop the record
    fn remove_entity(&mut self, id: EntityId) -> Option<DeletedEntity> {
        let entity = self.entities.get_mut(&id)?;
        let (renderables, colliders, parent, children) = match entity.node_mut() {
            Some(node) => (
                core::mem::take(&mut node.renderables),
                core::mem::take(&mut node.colliders),
                node.parent.take(),
                core::mem::take(&mut node.children),
            ),
            None => (Vec::new(), Vec::new(), None, Vec::new()),
        };

        if let Some(parent) = parent {
            self.unlink_child(parent, id);
        }
        for child in children {
            if let Some(node) = self.entities.get_mut(&child).and_then(|c| c.node_mut()) {
                node.parent = None;
            }
        }

        let mut entity = self.entities.remove(&id)?;
        if let Some(hook) = entity.take_on_delete() {
            hook(&mut entity);
        }
        self.failed.remove(&id);
        self.pending_deletes.remove(&id);
        self.waiters.remove(&id);
        log::debug!("Deleted entity {}", id);

        let (payload, native, state) = entity.into_parts();
        Some(DeletedEntity {
            id,
            payload,
            native,
            renderables,
            colliders,
            state,
        })
    }
}

impl core::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entities.len())
            .field("waiting_ids", &self.waiters.len())
            .field("failed", &self.failed.len())
            .field("pending_deletes", &self.pending_deletes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{GenericNodeDescriptor, GroupDescriptor, NodeDescriptor};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn id(raw: u64) -> EntityId {
        EntityId::new(raw).unwrap()
    }

    fn node(parent: Option<EntityId>) -> EntityPayload {
        let mut node = NodeDescriptor::default();
        node.parent = parent;
        GenericNodeDescriptor { node }.into()
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = EntityRegistry::new();
        let first = registry.register(id(42), node(None), Some(NativeHandle::new(1u32)));
        assert!(first.created);
        assert!(first.discarded.is_none());

        let second = registry.register(id(42), node(None), Some(NativeHandle::new(2u32)));
        assert!(!second.created);
        assert_eq!(second.discarded.and_then(|h| h.downcast_ref::<u32>().copied()), Some(2));
        assert_eq!(registry.get_native::<u32>(id(42)), Ok(&1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_notify_loaded_fires_once() {
        let mut registry = EntityRegistry::new();
        let hits = Rc::new(RefCell::new(0));
        registry.register(id(1), node(None), None);

        let h = hits.clone();
        registry.wait_until_loaded(id(1), move |_| *h.borrow_mut() += 1, |_| {});
        registry.notify_loaded(id(1));
        registry.notify_loaded(id(1));
        assert_eq!(*hits.borrow(), 1);
        assert!(registry.is_loaded(id(1)));
    }

    #[test]
    fn test_wait_on_loaded_entity_fires_synchronously() {
        let mut registry = EntityRegistry::new();
        registry.register(id(1), node(None), None);
        registry.notify_loaded(id(1));

        let hit = Rc::new(RefCell::new(false));
        let h = hit.clone();
        let handle = registry.wait_until_loaded(id(1), move |_| *h.borrow_mut() = true, |_| {});
        assert!(handle.is_none());
        assert!(*hit.borrow());
    }

    #[test]
    fn test_get_typed_mismatch() {
        let mut registry = EntityRegistry::new();
        registry.register(id(3), GroupDescriptor::default().into(), None);
        assert!(registry.get_typed::<GroupDescriptor>(id(3)).is_ok());
        match registry.get_typed::<GenericNodeDescriptor>(id(3)) {
            Err(EntityError::TypeMismatch { expected, found, .. }) => {
                assert_eq!(expected, "node");
                assert_eq!(found, "group");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            registry.get_typed::<GroupDescriptor>(id(4)).err(),
            Some(EntityError::NotFound(id(4)))
        );
    }

    #[test]
    fn test_get_native_mismatch() {
        let mut registry = EntityRegistry::new();
        registry.register(id(5), node(None), Some(NativeHandle::new(String::from("mesh"))));
        assert_eq!(registry.get_native::<String>(id(5)).map(|s| s.as_str()), Ok("mesh"));
        assert!(matches!(
            registry.get_native::<u64>(id(5)),
            Err(EntityError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_cancel_wait_removes_slot() {
        let mut registry = EntityRegistry::new();
        let handle = registry
            .wait_until_loaded(id(9), |_| panic!("cancelled waiter fired"), |_| {})
            .unwrap();
        assert_eq!(registry.waiter_count(id(9)), 1);
        assert!(registry.cancel_wait(handle));
        assert!(!registry.cancel_wait(handle));
        assert_eq!(registry.waiter_count(id(9)), 0);
        registry.register(id(9), node(None), None);
        registry.notify_loaded(id(9));
    }

    #[test]
    fn test_delete_unknown_is_not_fatal() {
        let mut registry = EntityRegistry::new();
        assert!(matches!(registry.delete(id(77)), DeleteOutcome::Unknown));
    }

    #[test]
    fn test_parent_resolved_when_registered_later() {
        let mut registry = EntityRegistry::new();
        registry.register(id(2), node(Some(id(1))), None);
        assert_eq!(registry.get(id(2)).unwrap().node().unwrap().parent(), Some(id(1)));

        registry.register(id(1), node(None), None);
        assert_eq!(registry.get(id(1)).unwrap().node().unwrap().children(), &[id(2)]);
    }
}
