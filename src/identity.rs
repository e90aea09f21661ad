//! Object identity for managed allocations.

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one managed object.
///
/// Identities come from a process-wide monotonic counter, so two distinct
/// objects never share one even when the allocator reuses an address.
///
/// # Examples
///
/// ```
/// use finalguard::ObjectId;
///
/// let a = ObjectId::next();
/// let b = ObjectId::next();
/// assert_ne!(a, b);
/// assert!(b.as_u64() > a.as_u64());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(NonZeroU64);

impl ObjectId {
    /// Allocates a fresh identity.
    pub fn next() -> Self {
        let raw = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        // The counter starts at 1 and would need 2^64 allocations to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Rebuilds an identity from its numeric form. Zero maps to `#1`.
    pub fn from_raw(raw: u64) -> Self {
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
