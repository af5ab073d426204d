use std::{
    fmt,
    ptr::{self, null_mut},
    sync::atomic::{AtomicPtr, Ordering::*},
};

/// A single pointer-sized slot with explicit memory ordering on every access.
///
/// The skip list publishes nodes exclusively through this type: a node is
/// filled in with relaxed stores while nothing can reach it, then made
/// reachable with one `release_store`. Readers follow links with
/// `acquire_load` and therefore never see a half-built node.
#[repr(transparent)]
pub struct AtomicSlot<T> {
    rep: AtomicPtr<T>,
}

impl<T> AtomicSlot<T> {
    pub const fn new(p: *mut T) -> Self {
        Self {
            rep: AtomicPtr::new(p),
        }
    }

    pub const fn null() -> Self {
        Self::new(null_mut())
    }

    #[inline]
    pub fn relaxed_load(&self) -> *mut T {
        self.rep.load(Relaxed)
    }

    #[inline]
    pub fn relaxed_store(&self, p: *mut T) {
        self.rep.store(p, Relaxed)
    }

    /// Everything written before the matching `release_store` is visible
    /// through the returned pointer.
    #[inline]
    pub fn acquire_load(&self) -> *mut T {
        self.rep.load(Acquire)
    }

    #[inline]
    pub fn release_store(&self, p: *mut T) {
        self.rep.store(p, Release)
    }
}

// Plain counters (list height, arena usage) live in the same kind of slot.
impl AtomicSlot<()> {
    pub const fn word(value: usize) -> Self {
        Self::new(ptr::without_provenance_mut(value))
    }

    #[inline]
    pub fn relaxed_load_word(&self) -> usize {
        self.relaxed_load().addr()
    }

    #[inline]
    pub fn relaxed_store_word(&self, value: usize) {
        self.relaxed_store(ptr::without_provenance_mut(value))
    }
}

impl<T> Default for AtomicSlot<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicSlot")
            .field(&self.relaxed_load())
            .finish()
    }
}
