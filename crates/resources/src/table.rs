//! Strongly-typed facade over [`ResourceArena`] with deferred destruction.
//!
//! `destroy` never frees a slot. It queues a [`DestroyEntry`] that only runs
//! when the owner of the table has proven that no submitted GPU work can still
//! reference the resource, normally right after a frame fence wait.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, trace};

use crate::arena::ResourceArena;
use crate::error::{ResourceError, ResourceResult};
use crate::handle::{Handle, ResourceId};
use crate::resource::Resource;

type DestroyAction = Box<dyn FnOnce(&mut ResourceArena) -> bool>;

/// A queued teardown of one slot.
pub struct DestroyEntry {
    id: ResourceId,
    type_name: &'static str,
    action: DestroyAction,
}

impl DestroyEntry {
    fn new(id: ResourceId, type_name: &'static str) -> Self {
        Self {
            id,
            type_name,
            action: Box::new(move |arena| arena.remove(id)),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for DestroyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DestroyEntry")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Destroy entries detached from the table, in insertion order.
///
/// A batch is parked with the frame that was recorded while its entries were
/// queued and handed back to [`ResourceTable::flush_batch`] once that frame's
/// fence has signalled.
#[derive(Debug, Default)]
pub struct DestroyBatch {
    entries: Vec<DestroyEntry>,
}

impl DestroyBatch {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.entries.iter().map(DestroyEntry::id)
    }

    /// Append `other` after the entries already in `self`.
    pub fn append(&mut self, mut other: DestroyBatch) {
        self.entries.append(&mut other.entries);
    }
}

/// The resource registry shared by the renderer and its collaborators.
///
/// There is one table per renderer instance; it is passed by reference to
/// anything that allocates or destroys GPU-visible objects.
pub struct ResourceTable {
    arena: ResourceArena,
    pending: Vec<DestroyEntry>,
    scheduled: HashSet<ResourceId>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::from_arena(ResourceArena::new())
    }

    /// Create a table whose arena reserves `capacity` slots on first allocation.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_arena(ResourceArena::with_capacity(capacity))
    }

    fn from_arena(arena: ResourceArena) -> Self {
        Self {
            arena,
            pending: Vec::new(),
            scheduled: HashSet::new(),
        }
    }

    /// Take ownership of `value` and return its id. Never fails.
    pub fn allocate<T: Resource>(&mut self, value: T) -> ResourceId {
        self.arena.add(value)
    }

    /// Build a resource that needs its own id before construction.
    pub fn allocate_with<T, F>(&mut self, build: F) -> ResourceId
    where
        T: Resource,
        F: FnOnce(ResourceId) -> T,
    {
        self.arena.add_with(build)
    }

    /// Same as [`allocate`](Self::allocate) but returns a typed handle.
    pub fn allocate_handle<T: Resource>(&mut self, value: T) -> Handle<T> {
        Handle::new(self.allocate(value))
    }

    /// The id the next allocation will receive.
    pub fn peek(&mut self) -> ResourceId {
        self.arena.peek()
    }

    pub fn get<T: Resource>(&self, id: ResourceId) -> Option<&T> {
        self.arena.get(id)
    }

    pub fn get_mut<T: Resource>(&mut self, id: ResourceId) -> Option<&mut T> {
        self.arena.get_mut(id)
    }

    /// Look up through a typed handle.
    pub fn resolve<T: Resource>(&self, handle: Handle<T>) -> Option<&T> {
        self.arena.get(handle.id())
    }

    /// Checked lookup that explains why it failed.
    ///
    /// # Errors
    ///
    /// [`ResourceError::InvalidHandle`] if `id` is not live and
    /// [`ResourceError::TypeMismatch`] if it holds something other than `T`.
    pub fn try_get<T: Resource>(&self, id: ResourceId) -> ResourceResult<&T> {
        match self.arena.get::<T>(id) {
            Some(value) => Ok(value),
            None => match self.arena.type_name(id) {
                Some(found) => Err(ResourceError::TypeMismatch {
                    id,
                    expected: std::any::type_name::<T>(),
                    found,
                }),
                None => Err(ResourceError::InvalidHandle(id)),
            },
        }
    }

    /// `true` while the slot holds a resource, including one queued for destruction.
    pub fn is_alive(&self, id: ResourceId) -> bool {
        self.arena.contains(id)
    }

    /// `true` if `destroy` was called for `id` and the entry has not run yet.
    pub fn is_pending_destroy(&self, id: ResourceId) -> bool {
        self.scheduled.contains(&id)
    }

    /// Queue `id` for destruction.
    ///
    /// The resource stays reachable through [`get`](Self::get) until the entry
    /// is flushed. Invalid ids and ids that are already queued are ignored.
    pub fn destroy(&mut self, id: ResourceId) {
        let Some(type_name) = self.arena.type_name(id) else {
            debug!("Ignoring destroy of invalid resource {}", id);
            return;
        };
        if !self.scheduled.insert(id) {
            debug!("Resource {} is already queued for destruction", id);
            return;
        }

        trace!("Queued destroy of {} ({})", id, type_name);
        self.pending.push(DestroyEntry::new(id, type_name));
    }

    /// Run every pending destroy in reverse insertion order.
    ///
    /// Returns the number of slots released. Only call this once the GPU can
    /// no longer reference anything in the pending list.
    pub fn flush(&mut self) -> usize {
        let batch = self.retire_pending();
        self.flush_batch(batch)
    }

    /// Detach the pending list so it can be flushed later.
    pub fn retire_pending(&mut self) -> DestroyBatch {
        DestroyBatch {
            entries: std::mem::take(&mut self.pending),
        }
    }

    /// Run a previously retired batch in reverse insertion order.
    pub fn flush_batch(&mut self, batch: DestroyBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let mut released = 0;
        for entry in batch.entries.into_iter().rev() {
            self.scheduled.remove(&entry.id);
            if (entry.action)(&mut self.arena) {
                released += 1;
            }
        }

        debug!("Flushed {} destroy entries, released {} slots", total, released);
        released
    }

    /// Number of live resources, including ones queued for destruction.
    pub fn live_count(&self) -> usize {
        self.arena.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub fn arena(&self) -> &ResourceArena {
        &self.arena
    }
}

impl Default for ResourceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceTable {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "Dropping resource table with {} pending destroys",
                self.pending.len()
            );
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Blob(u32);
    impl Resource for Blob {}

    #[test]
    fn test_destroy_is_deferred_until_flush() {
        let mut table = ResourceTable::new();
        let id = table.allocate(Blob(1));

        table.destroy(id);
        assert!(table.is_pending_destroy(id));
        assert_eq!(table.get::<Blob>(id).map(|b| b.0), Some(1));

        assert_eq!(table.flush(), 1);
        assert!(table.get::<Blob>(id).is_none());
        assert!(!table.is_pending_destroy(id));
    }

    #[test]
    fn test_double_destroy_is_ignored() {
        let mut table = ResourceTable::new();
        let id = table.allocate(Blob(1));

        table.destroy(id);
        table.destroy(id);
        assert_eq!(table.pending_count(), 1);
        assert_eq!(table.flush(), 1);
    }

    #[test]
    fn test_destroy_invalid_is_ignored() {
        let mut table = ResourceTable::new();
        table.destroy(ResourceId::INVALID);
        table.destroy(ResourceId::from_index(12));
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_try_get_reports_cause() {
        struct Other;
        impl Resource for Other {}

        let mut table = ResourceTable::new();
        let id = table.allocate(Blob(3));

        assert!(table.try_get::<Blob>(id).is_ok());
        assert!(matches!(
            table.try_get::<Other>(id),
            Err(ResourceError::TypeMismatch { .. })
        ));
        assert_eq!(
            table.try_get::<Blob>(ResourceId::from_index(40)).err(),
            Some(ResourceError::InvalidHandle(ResourceId::from_index(40)))
        );
    }

    #[test]
    fn test_retired_batch_flushes_later() {
        let mut table = ResourceTable::new();
        let a = table.allocate(Blob(0));
        table.destroy(a);

        let batch = table.retire_pending();
        assert_eq!(table.pending_count(), 0);
        assert!(table.is_pending_destroy(a));
        assert!(table.is_alive(a));

        assert_eq!(table.flush_batch(batch), 1);
        assert!(!table.is_alive(a));
    }
}
