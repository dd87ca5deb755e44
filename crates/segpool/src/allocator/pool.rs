//! Typed pool-backed allocator facades
//!
//! Container-facing allocators that draw storage from the pools:
//!
//! - [`PoolAllocator`]: stateless, backed by a process-wide singleton,
//!   ordered discipline throughout (contiguous array allocation works and
//!   fully-free super-blocks stay reclaimable via `release_memory`)
//! - [`FastPoolAllocator`]: stateless, singleton-backed, unordered O(1)
//!   fast path for single objects
//! - [`SharedPoolAllocator`]: holds shared ownership of one specific
//!   pool; clones and rebinds reference the same pool
//!
//! The singleton-backed facades never free their pool (see
//! [`SingletonPool`]), so storage allocated through them may legally be
//! released after `main` returns.
//!
//! Element counts are converted to chunk counts with
//! `ceil(n * size_of::<T>() / P)`; a pool sized for `T` always fits one
//! `T` per chunk, and rebound facades with larger element types simply
//! take more chunks per element.

use core::marker::PhantomData;
use core::mem;
use core::ptr::NonNull;

use super::system::SystemAllocator;
use super::traits::{RawAllocator, TypedAllocator};
use crate::error::{AllocError, AllocResult};
use crate::pool::{DefaultPoolTag, FastPoolTag, PoolTag, SharedPool, SingletonPool};
use crate::utils::{chunk_align, chunk_size};

/// Converts an element count to a chunk count for chunks of `chunk` bytes.
#[inline]
fn chunk_count<T>(n: usize, chunk: usize) -> AllocResult<usize> {
    let bytes = n
        .checked_mul(mem::size_of::<T>())
        .ok_or_else(|| AllocError::size_overflow("element count"))?;
    Ok(bytes.div_ceil(chunk))
}

/// Pools place chunks at the chunk-alignment granularity and nothing
/// stricter.
#[inline]
fn check_element_align<T>() -> AllocResult<()> {
    if mem::align_of::<T>() > chunk_align() {
        return Err(AllocError::invalid_alignment()
            .with_message("element alignment exceeds the pool chunk granularity"));
    }
    Ok(())
}

/// Stateless allocator for `T` over a process-wide singleton pool.
///
/// The singleton is keyed by `(Tag, size_of::<T>(), NEXT_SIZE, MAX_SIZE,
/// U)`: every facade value with the same parameterisation, including
/// independently constructed ones, is interchangeable and compares
/// equal. Rebinding to another element type selects the singleton keyed by
/// that type's size under the same tag.
pub struct PoolAllocator<
    T,
    Tag = DefaultPoolTag,
    U = SystemAllocator,
    const NEXT_SIZE: usize = 32,
    const MAX_SIZE: usize = 0,
> where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    _marker: PhantomData<fn() -> (T, Tag, U)>,
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    /// Creates the facade. Free; the pool materialises on first use.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// The facade for element type `V` sharing this facade's tag and
    /// shape parameters.
    pub const fn rebind<V>(&self) -> PoolAllocator<V, Tag, U, NEXT_SIZE, MAX_SIZE> {
        PoolAllocator::new()
    }

    /// Handle to the backing singleton.
    pub const fn pool(&self) -> SingletonPool<Tag, U> {
        SingletonPool::with_sizes(mem::size_of::<T>(), NEXT_SIZE, MAX_SIZE)
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> TypedAllocator<T>
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_align::<T>()?;
        let chunks = chunk_count::<T>(n, chunk_size(mem::size_of::<T>()))?;
        if chunks == 0 {
            return Ok(NonNull::dangling());
        }
        let ptr = self.pool().ordered_allocate_contiguous(chunks)?;
        Ok(ptr.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        let Ok(chunks) = chunk_count::<T>(n, chunk_size(mem::size_of::<T>())) else {
            debug_assert!(false, "deallocate with overflowing element count");
            return;
        };
        if chunks == 0 {
            return;
        }
        // SAFETY: ptr came from allocate(n) on this parameterisation
        // (caller's contract), i.e. from the same singleton, covering
        // exactly `chunks` chunks.
        unsafe {
            self.pool()
                .ordered_deallocate_contiguous(ptr.cast(), chunks)
        };
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Default
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Clone
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Copy
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

/// All facades of one parameterisation are the same allocator.
impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> PartialEq
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Eq
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> core::fmt::Debug
    for PoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("element", &core::any::type_name::<T>())
            .field("tag", &core::any::type_name::<Tag>())
            .finish()
    }
}

/// Stateless allocator for `T` optimised for single-object churn.
///
/// Single-object calls take the unordered O(1) free-list path; array
/// calls fall back to the ordered contiguous path. The unordered frees
/// mean the backing pool's free list loses address order, so
/// `release_memory` on it may reclaim less than it could; that is the
/// price of the fast path.
pub struct FastPoolAllocator<
    T,
    Tag = FastPoolTag,
    U = SystemAllocator,
    const NEXT_SIZE: usize = 32,
    const MAX_SIZE: usize = 0,
> where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    _marker: PhantomData<fn() -> (T, Tag, U)>,
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize>
    FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    /// Creates the facade. Free; the pool materialises on first use.
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }

    /// The facade for element type `V` sharing this facade's tag and
    /// shape parameters.
    pub const fn rebind<V>(&self) -> FastPoolAllocator<V, Tag, U, NEXT_SIZE, MAX_SIZE> {
        FastPoolAllocator::new()
    }

    /// Handle to the backing singleton.
    pub const fn pool(&self) -> SingletonPool<Tag, U> {
        SingletonPool::with_sizes(mem::size_of::<T>(), NEXT_SIZE, MAX_SIZE)
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> TypedAllocator<T>
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_align::<T>()?;
        if n == 1 && mem::size_of::<T>() != 0 {
            // One element always fits one chunk.
            return Ok(self.pool().allocate()?.cast());
        }
        let chunks = chunk_count::<T>(n, chunk_size(mem::size_of::<T>()))?;
        if chunks == 0 {
            return Ok(NonNull::dangling());
        }
        let ptr = self.pool().ordered_allocate_contiguous(chunks)?;
        Ok(ptr.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        if n == 1 && mem::size_of::<T>() != 0 {
            // SAFETY: single-object allocations come from the unordered
            // single-chunk path (caller's contract).
            unsafe { self.pool().deallocate(ptr.cast()) };
            return;
        }
        let Ok(chunks) = chunk_count::<T>(n, chunk_size(mem::size_of::<T>())) else {
            debug_assert!(false, "deallocate with overflowing element count");
            return;
        };
        if chunks == 0 {
            return;
        }
        // SAFETY: ptr came from allocate(n) on this parameterisation
        // (caller's contract).
        unsafe { self.pool().deallocate_contiguous(ptr.cast(), chunks) };
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Default
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Clone
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Copy
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

/// All facades of one parameterisation are the same allocator.
impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> PartialEq
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> Eq
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

impl<T, Tag, U, const NEXT_SIZE: usize, const MAX_SIZE: usize> core::fmt::Debug
    for FastPoolAllocator<T, Tag, U, NEXT_SIZE, MAX_SIZE>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FastPoolAllocator")
            .field("element", &core::any::type_name::<T>())
            .field("tag", &core::any::type_name::<Tag>())
            .finish()
    }
}

/// Allocator for `T` over one specific shared pool.
///
/// Unlike the singleton facades, identity is per pool instance: two
/// facades compare equal iff they reference the same pool. Cloning and
/// rebinding preserve the pool; a rebound facade allocates elements of
/// another type out of the *same* chunks (sized by the original pool),
/// taking however many chunks each element needs.
pub struct SharedPoolAllocator<T, U = SystemAllocator>
where
    U: RawAllocator + Send,
{
    pool: SharedPool<U>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SharedPoolAllocator<T, SystemAllocator> {
    /// Creates a fresh pool sized for `T` over the system allocator.
    pub fn new() -> Self {
        Self::from_pool(SharedPool::new(mem::size_of::<T>()))
    }
}

impl<T, U> SharedPoolAllocator<T, U>
where
    U: RawAllocator + Default + Send,
{
    /// Creates a fresh pool sized for `T` with an explicit growth
    /// schedule.
    pub fn with_sizes(next_size: usize, max_size: usize) -> Self {
        Self::from_pool(SharedPool::with_sizes(
            mem::size_of::<T>(),
            next_size,
            max_size,
        ))
    }
}

impl<T, U> SharedPoolAllocator<T, U>
where
    U: RawAllocator + Send,
{
    /// Wraps an existing shared pool.
    pub fn from_pool(pool: SharedPool<U>) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    /// The facade for element type `V` over the *same* pool.
    pub fn rebind<V>(&self) -> SharedPoolAllocator<V, U> {
        SharedPoolAllocator {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }

    /// The backing pool.
    pub fn pool(&self) -> &SharedPool<U> {
        &self.pool
    }
}

impl<T, U> TypedAllocator<T> for SharedPoolAllocator<T, U>
where
    U: RawAllocator + Send,
{
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        check_element_align::<T>()?;
        let chunks = chunk_count::<T>(n, self.pool.chunk_size())?;
        if chunks == 0 {
            return Ok(NonNull::dangling());
        }
        let ptr = self.pool.ordered_allocate_contiguous(chunks)?;
        Ok(ptr.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        let Ok(chunks) = chunk_count::<T>(n, self.pool.chunk_size()) else {
            debug_assert!(false, "deallocate with overflowing element count");
            return;
        };
        if chunks == 0 {
            return;
        }
        // SAFETY: ptr came from allocate(n) on a facade over this pool
        // (caller's contract).
        unsafe { self.pool.ordered_deallocate_contiguous(ptr.cast(), chunks) };
    }
}

impl<T, U> Clone for SharedPoolAllocator<T, U>
where
    U: RawAllocator + Send,
{
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for SharedPoolAllocator<T, SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

/// Facades are equal iff they reference the same pool.
impl<T, U> PartialEq for SharedPoolAllocator<T, U>
where
    U: RawAllocator + Send,
{
    fn eq(&self, other: &Self) -> bool {
        self.pool.same_pool(&other.pool)
    }
}

impl<T, U> Eq for SharedPoolAllocator<T, U> where U: RawAllocator + Send {}

impl<T, U> core::fmt::Debug for SharedPoolAllocator<T, U>
where
    U: RawAllocator + Send,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedPoolAllocator")
            .field("element", &core::any::type_name::<T>())
            .finish_non_exhaustive()
    }
}
