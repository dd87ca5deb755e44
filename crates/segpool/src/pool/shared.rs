//! Shared-ownership pool
//!
//! Wraps a [`Pool`] in `Arc<Mutex<_>>` so many owners (and threads) can
//! allocate from the same pool. Cloning is cheap; the pool is purged and
//! destroyed when the last clone drops. Callers must quiesce before
//! letting that happen: destruction is not safe against in-flight
//! operations on still-outstanding chunks.

use core::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use super::engine::Pool;
use crate::allocator::{RawAllocator, SystemAllocator};
use crate::error::AllocResult;

/// A cheaply clonable handle to a mutex-guarded [`Pool`].
///
/// Every operation locks the pool for the duration of the engine call,
/// making operations on one pool linearizable. Two handles are the *same*
/// pool iff [`SharedPool::same_pool`] returns true (clones compare equal,
/// independently created pools do not).
pub struct SharedPool<U: RawAllocator = SystemAllocator> {
    inner: Arc<Mutex<Pool<U>>>,
}

impl SharedPool<SystemAllocator> {
    /// Creates a shared pool over the system allocator with the default
    /// growth schedule.
    pub fn new(requested_size: usize) -> Self {
        Self::from_pool(Pool::new(requested_size))
    }
}

impl<U: RawAllocator + Default + Send> SharedPool<U> {
    /// Creates a shared pool with an explicit growth schedule.
    pub fn with_sizes(requested_size: usize, next_size: usize, max_size: usize) -> Self {
        Self::from_pool(Pool::with_sizes(requested_size, next_size, max_size))
    }
}

impl<U: RawAllocator + Send> SharedPool<U> {
    /// Wraps an existing pool.
    pub fn from_pool(pool: Pool<U>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(pool)),
        }
    }

    /// Whether `self` and `other` refer to the same pool.
    #[inline]
    pub fn same_pool(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Runs `f` with the pool locked.
    ///
    /// Escape hatch for multi-step sequences that must be atomic with
    /// respect to other handles.
    pub fn with_pool<R>(&self, f: impl FnOnce(&mut Pool<U>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// See [`Pool::allocate`].
    pub fn allocate(&self) -> AllocResult<NonNull<u8>> {
        self.inner.lock().allocate()
    }

    /// See [`Pool::ordered_allocate`].
    pub fn ordered_allocate(&self) -> AllocResult<NonNull<u8>> {
        self.inner.lock().ordered_allocate()
    }

    /// See [`Pool::ordered_allocate_contiguous`].
    pub fn ordered_allocate_contiguous(&self, n: usize) -> AllocResult<NonNull<u8>> {
        self.inner.lock().ordered_allocate_contiguous(n)
    }

    /// See [`Pool::deallocate`].
    ///
    /// # Safety
    /// `chunk` must have been returned by this pool and not freed since.
    pub unsafe fn deallocate(&self, chunk: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.lock().deallocate(chunk) }
    }

    /// See [`Pool::ordered_deallocate`].
    ///
    /// # Safety
    /// As [`Self::deallocate`], plus the ordered discipline.
    pub unsafe fn ordered_deallocate(&self, chunk: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.lock().ordered_deallocate(chunk) }
    }

    /// See [`Pool::deallocate_contiguous`].
    ///
    /// # Safety
    /// `chunks` must be the start of `n` contiguous chunks previously
    /// returned by this pool in one allocation.
    pub unsafe fn deallocate_contiguous(&self, chunks: NonNull<u8>, n: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.lock().deallocate_contiguous(chunks, n) }
    }

    /// See [`Pool::ordered_deallocate_contiguous`].
    ///
    /// # Safety
    /// As [`Self::deallocate_contiguous`], plus the ordered discipline.
    pub unsafe fn ordered_deallocate_contiguous(&self, chunks: NonNull<u8>, n: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.inner.lock().ordered_deallocate_contiguous(chunks, n) }
    }

    /// See [`Pool::is_from`].
    pub fn is_from(&self, ptr: *const u8) -> bool {
        self.inner.lock().is_from(ptr)
    }

    /// See [`Pool::release_memory`].
    pub fn release_memory(&self) -> bool {
        self.inner.lock().release_memory()
    }

    /// See [`Pool::purge_memory`].
    pub fn purge_memory(&self) -> bool {
        self.inner.lock().purge_memory()
    }

    /// See [`Pool::requested_size`].
    pub fn requested_size(&self) -> usize {
        self.inner.lock().requested_size()
    }

    /// See [`Pool::chunk_size`].
    pub fn chunk_size(&self) -> usize {
        self.inner.lock().chunk_size()
    }

    /// See [`Pool::next_size`].
    pub fn next_size(&self) -> usize {
        self.inner.lock().next_size()
    }

    /// See [`Pool::start_size`].
    pub fn start_size(&self) -> usize {
        self.inner.lock().start_size()
    }

    /// See [`Pool::max_size`].
    pub fn max_size(&self) -> usize {
        self.inner.lock().max_size()
    }

    /// See [`Pool::stats`].
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> super::stats::PoolStats {
        self.inner.lock().stats()
    }
}

impl<U: RawAllocator> Clone for SharedPool<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<U: RawAllocator> core::fmt::Debug for SharedPool<U> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedPool")
            .field("handles", &Arc::strong_count(&self.inner))
            .finish_non_exhaustive()
    }
}
