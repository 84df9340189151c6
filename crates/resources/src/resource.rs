//! The trait implemented by everything the arena owns.

use std::any::Any;

use crate::handle::ResourceId;

/// An object owned by a [`ResourceArena`](crate::ResourceArena).
///
/// Both hooks are optional. GPU wrappers usually release their API objects in
/// `Drop`; `destroy` exists for resources that need explicit teardown before
/// the value is dropped.
pub trait Resource: Any {
    /// Called once, right after the resource is placed in its slot.
    fn on_allocated(&mut self, _id: ResourceId) {}

    /// Called once, right before the slot is released.
    fn destroy(&mut self) {}
}
