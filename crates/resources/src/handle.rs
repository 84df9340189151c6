//! Resource handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Opaque identifier of a slot in a [`ResourceArena`](crate::ResourceArena).
///
/// A `ResourceId` is a weak reference: the resource behind it may be destroyed
/// and the index later reissued to a different resource once the deferred
/// destroy has run. Holders must re-resolve it through the
/// [`ResourceTable`](crate::ResourceTable) on every use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Sentinel that is never issued by an arena.
    pub const INVALID: Self = Self(u64::MAX);

    /// Wrap a raw slot index.
    #[inline]
    pub const fn from_index(index: u64) -> Self {
        Self(index)
    }

    /// Raw slot index.
    #[inline]
    pub const fn index(self) -> u64 {
        self.0
    }

    /// `false` only for [`ResourceId::INVALID`].
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u64::MAX
    }
}

impl Default for ResourceId {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "ResourceId({})", self.0)
        } else {
            f.write_str("ResourceId(INVALID)")
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "#{}", self.0)
        } else {
            f.write_str("#invalid")
        }
    }
}

/// A [`ResourceId`] that carries the expected resource type in its signature.
///
/// The type is only a hint for call sites; the arena still checks the stored
/// type tag on every lookup.
pub struct Handle<T> {
    id: ResourceId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    pub const fn new(id: ResourceId) -> Self {
        Self {
            id,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub const fn id(self) -> ResourceId {
        self.id
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.id.is_valid()
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle<{}>({})", std::any::type_name::<T>(), self.id)
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::new(ResourceId::INVALID)
    }
}

impl<T> From<Handle<T>> for ResourceId {
    fn from(handle: Handle<T>) -> Self {
        handle.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Texture;

    #[test]
    fn test_invalid_id() {
        assert!(!ResourceId::INVALID.is_valid());
        assert!(!ResourceId::default().is_valid());
        assert!(ResourceId::from_index(0).is_valid());
    }

    #[test]
    fn test_handle_converts_to_id() {
        let handle: Handle<Texture> = Handle::new(ResourceId::from_index(7));
        let id: ResourceId = handle.into();
        assert_eq!(id.index(), 7);
        assert_eq!(handle, Handle::new(id));
    }

    #[test]
    fn test_display() {
        assert_eq!(ResourceId::from_index(3).to_string(), "#3");
        assert_eq!(ResourceId::INVALID.to_string(), "#invalid");
    }
}
