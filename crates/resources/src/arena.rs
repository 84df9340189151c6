//! Type-erased slot table.
//!
//! [`ResourceArena`] owns heap objects behind integer ids. Released slots are
//! recycled through a FIFO free-index queue; when the queue runs dry the
//! backing storage doubles and every new index is queued as free.
//!
//! The arena is a primitive: [`remove`](ResourceArena::remove) frees a slot
//! immediately and knows nothing about in-flight GPU work. Use
//! [`ResourceTable`](crate::ResourceTable) for deferred destruction.

use std::any::{Any, TypeId, type_name};
use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::handle::ResourceId;
use crate::resource::Resource;

/// Capacity reserved on the first allocation when none was requested.
pub const DEFAULT_ARENA_CAPACITY: usize = 64;

/// Per-slot type tag and destroy entry point.
#[derive(Clone, Copy)]
struct SlotDescriptor {
    type_id: TypeId,
    type_name: &'static str,
    destroy: fn(&mut dyn Any),
}

impl SlotDescriptor {
    fn of<T: Resource>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            destroy: destroy_erased::<T>,
        }
    }
}

fn destroy_erased<T: Resource>(value: &mut dyn Any) {
    if let Some(resource) = value.downcast_mut::<T>() {
        resource.destroy();
    }
}

struct Slot {
    value: Box<dyn Any>,
    descriptor: SlotDescriptor,
}

/// Vector-backed object pool keyed by [`ResourceId`].
///
/// Single-threaded by construction: all mutation goes through `&mut self`.
pub struct ResourceArena {
    slots: Vec<Option<Slot>>,
    free: VecDeque<u64>,
    initial_capacity: usize,
    len: usize,
}

impl ResourceArena {
    /// Create an empty arena that reserves [`DEFAULT_ARENA_CAPACITY`] slots on first use.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ARENA_CAPACITY)
    }

    /// Create an empty arena whose first growth reserves `capacity` slots.
    ///
    /// A zero capacity is treated as one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: VecDeque::new(),
            initial_capacity: capacity.max(1),
            len: 0,
        }
    }

    /// Store `value` and return its id.
    pub fn add<T: Resource>(&mut self, value: T) -> ResourceId {
        self.add_with(|_| value)
    }

    /// Construct a resource that needs to know its own id.
    ///
    /// `build` receives the id the resource will live under.
    pub fn add_with<T, F>(&mut self, build: F) -> ResourceId
    where
        T: Resource,
        F: FnOnce(ResourceId) -> T,
    {
        let index = self.next_free_index();
        let id = ResourceId::from_index(index);

        let mut value = build(id);
        value.on_allocated(id);

        self.slots[index as usize] = Some(Slot {
            value: Box::new(value),
            descriptor: SlotDescriptor::of::<T>(),
        });
        self.len += 1;

        trace!("Arena slot {} <- {}", id, type_name::<T>());
        id
    }

    /// The id the next [`add`](Self::add) will return. Grows storage if no slot is free.
    pub fn peek(&mut self) -> ResourceId {
        if self.free.is_empty() {
            self.grow();
        }
        self.free
            .front()
            .map_or(ResourceId::INVALID, |&index| ResourceId::from_index(index))
    }

    /// Borrow the resource in `id` if it is live and of type `T`.
    pub fn get<T: Resource>(&self, id: ResourceId) -> Option<&T> {
        self.slot(id)?.value.downcast_ref::<T>()
    }

    /// Mutably borrow the resource in `id` if it is live and of type `T`.
    pub fn get_mut<T: Resource>(&mut self, id: ResourceId) -> Option<&mut T> {
        let index = usize::try_from(id.index()).ok()?;
        self.slots
            .get_mut(index)?
            .as_mut()?
            .value
            .downcast_mut::<T>()
    }

    /// Run the resource's destroy hook, drop it and queue its index as free.
    ///
    /// Returns `false` if the slot was already empty.
    pub fn remove(&mut self, id: ResourceId) -> bool {
        let Some(index) = usize::try_from(id.index())
            .ok()
            .filter(|&index| index < self.slots.len())
        else {
            return false;
        };

        let Some(mut slot) = self.slots[index].take() else {
            return false;
        };

        (slot.descriptor.destroy)(slot.value.as_mut());
        drop(slot);

        self.free.push_back(id.index());
        self.len -= 1;
        true
    }

    /// `true` if `id` names a live resource of any type.
    pub fn contains(&self, id: ResourceId) -> bool {
        self.slot(id).is_some()
    }

    /// `true` if `id` names a live resource of type `T`.
    pub fn is<T: Resource>(&self, id: ResourceId) -> bool {
        self.slot(id)
            .is_some_and(|slot| slot.descriptor.type_id == TypeId::of::<T>())
    }

    /// Type name recorded for the resource in `id`.
    pub fn type_name(&self, id: ResourceId) -> Option<&'static str> {
        self.slot(id).map(|slot| slot.descriptor.type_name)
    }

    /// Number of slots currently backed by storage.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of live resources.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Ids of all live resources in slot order.
    pub fn live_ids(&self) -> impl Iterator<Item = ResourceId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| ResourceId::from_index(index as u64))
    }

    /// Destroy every live resource, highest slot first.
    pub fn clear(&mut self) {
        let live: Vec<ResourceId> = self.live_ids().collect();
        for id in live.into_iter().rev() {
            self.remove(id);
        }
    }

    fn slot(&self, id: ResourceId) -> Option<&Slot> {
        let index = usize::try_from(id.index()).ok()?;
        self.slots.get(index)?.as_ref()
    }

    fn next_free_index(&mut self) -> u64 {
        loop {
            if let Some(index) = self.free.pop_front() {
                return index;
            }
            self.grow();
        }
    }

    fn grow(&mut self) {
        let old = self.slots.len();
        let new = if old == 0 {
            self.initial_capacity
        } else {
            old * 2
        };

        self.slots.resize_with(new, || None);
        self.free.extend(old as u64..new as u64);

        debug!("Resource arena grew from {} to {} slots", old, new);
    }
}

impl Default for ResourceArena {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ResourceArena {
    fn drop(&mut self) {
        if self.len > 0 {
            debug!("Destroying {} resources left in the arena", self.len);
            self.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    struct Counter(u32);
    impl Resource for Counter {}

    struct Named(&'static str);
    impl Resource for Named {}

    struct SelfAware {
        id: ResourceId,
        seen_in_build: ResourceId,
    }

    impl Resource for SelfAware {
        fn on_allocated(&mut self, id: ResourceId) {
            self.id = id;
        }
    }

    struct Tracked {
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Resource for Tracked {
        fn destroy(&mut self) {
            self.log.borrow_mut().push("destroy");
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push("drop");
        }
    }

    #[test]
    fn test_first_add_reserves_initial_capacity() {
        let mut arena = ResourceArena::new();
        assert_eq!(arena.capacity(), 0);

        let id = arena.add(Counter(1));
        assert_eq!(id.index(), 0);
        assert_eq!(arena.capacity(), DEFAULT_ARENA_CAPACITY);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_get_checks_type_tag() {
        let mut arena = ResourceArena::new();
        let id = arena.add(Counter(5));

        assert_eq!(arena.get::<Counter>(id).map(|c| c.0), Some(5));
        assert!(arena.get::<Named>(id).is_none());
        assert!(arena.is::<Counter>(id));
        assert!(!arena.is::<Named>(id));
        assert!(arena.type_name(id).unwrap().ends_with("Counter"));
    }

    #[test]
    fn test_get_out_of_range_is_none() {
        let arena = ResourceArena::new();
        for _ in 0..3 {
            assert!(arena.get::<Counter>(ResourceId::from_index(1000)).is_none());
            assert!(arena.get::<Counter>(ResourceId::INVALID).is_none());
        }
    }

    #[test]
    fn test_peek_matches_next_add() {
        let mut arena = ResourceArena::with_capacity(4);
        arena.add(Counter(0));

        let peeked = arena.peek();
        let added = arena.add(Counter(1));
        assert_eq!(peeked, added);
    }

    #[test]
    fn test_peek_grows_when_full() {
        let mut arena = ResourceArena::with_capacity(2);
        arena.add(Counter(0));
        arena.add(Counter(1));
        assert_eq!(arena.capacity(), 2);

        let peeked = arena.peek();
        assert_eq!(arena.capacity(), 4);
        assert_eq!(peeked.index(), 2);
    }

    #[test]
    fn test_add_with_sees_own_id() {
        let mut arena = ResourceArena::new();
        arena.add(Counter(0));

        let id = arena.add_with(|id| SelfAware {
            id: ResourceId::INVALID,
            seen_in_build: id,
        });

        let resource = arena.get::<SelfAware>(id).unwrap();
        assert_eq!(resource.id, id);
        assert_eq!(resource.seen_in_build, id);
    }

    #[test]
    fn test_remove_runs_destroy_then_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut arena = ResourceArena::new();
        let id = arena.add(Tracked { log: log.clone() });

        assert!(arena.remove(id));
        assert_eq!(*log.borrow(), vec!["destroy", "drop"]);
        assert!(!arena.contains(id));
        assert!(!arena.remove(id));
    }

    #[test]
    fn test_removed_index_is_reused_last() {
        let mut arena = ResourceArena::with_capacity(4);
        let a = arena.add(Counter(0));
        arena.remove(a);

        // Indices 1..4 were already free, so they are handed out first.
        let next: Vec<u64> = (0..3).map(|i| arena.add(Counter(i)).index()).collect();
        assert_eq!(next, vec![1, 2, 3]);
        assert_eq!(arena.add(Counter(9)), a);
    }

    #[test]
    fn test_growth_doubles_and_keeps_entries() {
        let mut arena = ResourceArena::with_capacity(8);
        let ids: Vec<ResourceId> = (0..100).map(|i| arena.add(Counter(i))).collect();

        assert!(arena.capacity().is_power_of_two());
        assert_eq!(arena.capacity(), 128);
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(arena.get::<Counter>(*id).unwrap().0, i as u32);
        }
    }

    #[test]
    fn test_clear_destroys_everything() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut arena = ResourceArena::new();
        arena.add(Tracked { log: log.clone() });
        arena.add(Tracked { log: log.clone() });

        arena.clear();
        assert!(arena.is_empty());
        assert_eq!(log.borrow().len(), 4);
    }

    #[test]
    fn test_live_ids() {
        let mut arena = ResourceArena::new();
        let a = arena.add(Counter(0));
        let b = arena.add(Counter(1));
        let c = arena.add(Counter(2));
        arena.remove(b);

        let live: Vec<ResourceId> = arena.live_ids().collect();
        assert_eq!(live, vec![a, c]);
    }
}
