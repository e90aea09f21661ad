//! Managed handles handed out by the [`Heap`](super::Heap).

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use super::HeapInner;
use crate::identity::ObjectId;

struct GcBox<T> {
    id: ObjectId,
    heap: Arc<HeapInner>,
    value: T,
}

impl<T> Drop for GcBox<T> {
    fn drop(&mut self) {
        // Runs before `value` is dropped; observers never see the value itself.
        self.heap.reclaim(self.id);
    }
}

/// Strong handle to a managed object.
///
/// The object is reachable while at least one `Gc` exists. Dropping the last
/// one reclaims it and notifies every observer registered for its identity.
///
/// # Examples
///
/// ```
/// use finalguard::Heap;
///
/// let heap = Heap::new();
/// let a = heap.alloc(String::from("socket"));
/// let b = a.clone();
///
/// assert_eq!(a.id(), b.id());
/// assert_eq!(&*a, "socket");
/// assert_eq!(heap.stats().live, 1);
/// ```
pub struct Gc<T> {
    ptr: Arc<GcBox<T>>,
}

impl<T> Gc<T> {
    pub(super) fn new(id: ObjectId, heap: Arc<HeapInner>, value: T) -> Self {
        Self {
            ptr: Arc::new(GcBox { id, heap, value }),
        }
    }

    /// Identity of the managed object.
    pub fn id(&self) -> ObjectId {
        self.ptr.id
    }

    /// Creates a handle that does not keep the object alive.
    pub fn downgrade(this: &Self) -> WeakGc<T> {
        WeakGc {
            id: this.ptr.id,
            ptr: Arc::downgrade(&this.ptr),
        }
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.ptr, &b.ptr)
    }

    /// Number of strong handles currently keeping the object reachable.
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.ptr)
    }
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        Self {
            ptr: Arc::clone(&self.ptr),
        }
    }
}

impl<T> Deref for Gc<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.ptr.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gc")
            .field("id", &self.ptr.id)
            .field("value", &self.ptr.value)
            .finish()
    }
}

/// Non-owning handle to a managed object.
pub struct WeakGc<T> {
    id: ObjectId,
    ptr: Weak<GcBox<T>>,
}

impl<T> WeakGc<T> {
    /// Returns a strong handle if the object has not been reclaimed.
    pub fn upgrade(&self) -> Option<Gc<T>> {
        self.ptr.upgrade().map(|ptr| Gc { ptr })
    }

    pub fn is_alive(&self) -> bool {
        self.ptr.strong_count() > 0
    }

    /// Identity of the observed object, still available after reclamation.
    pub fn id(&self) -> ObjectId {
        self.id
    }
}

impl<T> Clone for WeakGc<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            ptr: self.ptr.clone(),
        }
    }
}

impl<T> fmt::Debug for WeakGc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakGc")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}
