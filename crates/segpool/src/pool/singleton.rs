//! Process-wide singleton pools
//!
//! A [`SingletonPool`] is a zero-cost handle to a process-wide pool keyed
//! by a tag type, an upstream allocator type, and the pool shape
//! (requested size, growth schedule, cap). Exactly one pool exists per key
//! per process; handles with the same key reach the same pool from
//! anywhere, with no value to thread through the program.
//!
//! Pools are created lazily on first use (the registry's shard lock
//! provides the usual double-checked initialisation guarantee) and are
//! **intentionally never destroyed**: each entry is `Box::leak`ed, so
//! allocating during static initialisation and freeing during late
//! teardown both remain legal. Memory checkers will report the pools as
//! reachable leaks; that is the documented trade-off.

use core::any::{Any, TypeId};
use core::marker::PhantomData;
use core::ptr::NonNull;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::engine::{Pool, DEFAULT_NEXT_SIZE};
use crate::allocator::{RawAllocator, SystemAllocator};
use crate::error::AllocResult;

/// Marker trait for singleton pool tags.
///
/// A tag is an empty type whose only job is to partition the singleton
/// space: two handles with different tags never share a pool, even with
/// identical shapes.
pub trait PoolTag: 'static {}

/// Tag used by the ordered pool facade.
#[derive(Debug)]
pub struct DefaultPoolTag;
impl PoolTag for DefaultPoolTag {}

/// Tag used by the fast (unordered) pool facade.
#[derive(Debug)]
pub struct FastPoolTag;
impl PoolTag for FastPoolTag {}

/// Registry key: tag + upstream types and the pool shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PoolKey {
    tag: TypeId,
    upstream: TypeId,
    requested_size: usize,
    next_size: usize,
    max_size: usize,
}

/// The process-wide pool registry. Entries are leaked on purpose; see the
/// module docs.
static REGISTRY: Lazy<DashMap<PoolKey, &'static (dyn Any + Send + Sync)>> =
    Lazy::new(DashMap::new);

/// Zero-cost handle to a process-wide, mutex-guarded pool.
///
/// Construction does not touch the registry; the backing pool
/// materialises on the first operation. Every operation locks the pool's
/// mutex for the duration of the engine call, so operations on one
/// singleton are linearizable.
pub struct SingletonPool<Tag = DefaultPoolTag, U = SystemAllocator>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    requested_size: usize,
    next_size: usize,
    max_size: usize,
    _marker: PhantomData<fn() -> (Tag, U)>,
}

impl<Tag, U> SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    /// Handle to the singleton for `requested_size`-byte chunks with the
    /// default growth schedule.
    pub const fn new(requested_size: usize) -> Self {
        Self::with_sizes(requested_size, DEFAULT_NEXT_SIZE, 0)
    }

    /// Handle with an explicit growth schedule. The shape is part of the
    /// key: different shapes are different pools.
    pub const fn with_sizes(requested_size: usize, next_size: usize, max_size: usize) -> Self {
        let next_size = if next_size == 0 { 1 } else { next_size };
        Self {
            requested_size,
            next_size,
            max_size,
            _marker: PhantomData,
        }
    }

    /// Requested chunk size of this handle's pool.
    #[inline]
    pub const fn requested_size(&self) -> usize {
        self.requested_size
    }

    /// Looks up the backing pool, creating it on first use.
    fn entry(&self) -> &'static Mutex<Pool<U>> {
        let key = PoolKey {
            tag: TypeId::of::<Tag>(),
            upstream: TypeId::of::<U>(),
            requested_size: self.requested_size,
            next_size: self.next_size,
            max_size: self.max_size,
        };

        let leaked: &'static (dyn Any + Send + Sync) = *REGISTRY.entry(key).or_insert_with(|| {
            let pool = Pool::<U>::with_sizes(self.requested_size, self.next_size, self.max_size);
            // Leaked on purpose: the singleton must outlive everything,
            // including static destructors in linked C code.
            let entry: &'static Mutex<Pool<U>> = Box::leak(Box::new(Mutex::new(pool)));
            entry
        });

        leaked
            .downcast_ref::<Mutex<Pool<U>>>()
            .expect("singleton registry entry has the keyed pool type")
    }

    /// See [`Pool::allocate`].
    pub fn allocate(&self) -> AllocResult<NonNull<u8>> {
        self.entry().lock().allocate()
    }

    /// See [`Pool::ordered_allocate`].
    pub fn ordered_allocate(&self) -> AllocResult<NonNull<u8>> {
        self.entry().lock().ordered_allocate()
    }

    /// See [`Pool::ordered_allocate_contiguous`].
    pub fn ordered_allocate_contiguous(&self, n: usize) -> AllocResult<NonNull<u8>> {
        self.entry().lock().ordered_allocate_contiguous(n)
    }

    /// See [`Pool::deallocate`].
    ///
    /// # Safety
    /// `chunk` must have been returned by this singleton (same key) and
    /// not freed since.
    pub unsafe fn deallocate(&self, chunk: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.entry().lock().deallocate(chunk) }
    }

    /// See [`Pool::ordered_deallocate`].
    ///
    /// # Safety
    /// As [`Self::deallocate`], plus the ordered discipline.
    pub unsafe fn ordered_deallocate(&self, chunk: NonNull<u8>) {
        // SAFETY: forwarded caller contract.
        unsafe { self.entry().lock().ordered_deallocate(chunk) }
    }

    /// See [`Pool::deallocate_contiguous`].
    ///
    /// # Safety
    /// `chunks` must be the start of `n` contiguous chunks previously
    /// returned by this singleton in one allocation.
    pub unsafe fn deallocate_contiguous(&self, chunks: NonNull<u8>, n: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.entry().lock().deallocate_contiguous(chunks, n) }
    }

    /// See [`Pool::ordered_deallocate_contiguous`].
    ///
    /// # Safety
    /// As [`Self::deallocate_contiguous`], plus the ordered discipline.
    pub unsafe fn ordered_deallocate_contiguous(&self, chunks: NonNull<u8>, n: usize) {
        // SAFETY: forwarded caller contract.
        unsafe { self.entry().lock().ordered_deallocate_contiguous(chunks, n) }
    }

    /// See [`Pool::is_from`].
    pub fn is_from(&self, ptr: *const u8) -> bool {
        self.entry().lock().is_from(ptr)
    }

    /// See [`Pool::release_memory`].
    pub fn release_memory(&self) -> bool {
        self.entry().lock().release_memory()
    }

    /// See [`Pool::purge_memory`].
    ///
    /// The pool object itself survives (singletons are never destroyed);
    /// only its super-blocks are returned to the upstream.
    pub fn purge_memory(&self) -> bool {
        self.entry().lock().purge_memory()
    }

    /// See [`Pool::chunk_size`].
    pub fn chunk_size(&self) -> usize {
        self.entry().lock().chunk_size()
    }

    /// See [`Pool::next_size`].
    pub fn next_size(&self) -> usize {
        self.entry().lock().next_size()
    }

    /// See [`Pool::start_size`].
    pub fn start_size(&self) -> usize {
        self.entry().lock().start_size()
    }

    /// See [`Pool::max_size`].
    pub fn max_size(&self) -> usize {
        self.entry().lock().max_size()
    }

    /// See [`Pool::stats`].
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> super::stats::PoolStats {
        self.entry().lock().stats()
    }
}

impl<Tag, U> Clone for SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<Tag, U> Copy for SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

/// Handles are equal iff they name the same singleton.
impl<Tag, U> PartialEq for SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        self.requested_size == other.requested_size
            && self.next_size == other.next_size
            && self.max_size == other.max_size
    }
}

impl<Tag, U> Eq for SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
}

impl<Tag, U> core::fmt::Debug for SingletonPool<Tag, U>
where
    Tag: PoolTag,
    U: RawAllocator + Default + Send + 'static,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SingletonPool")
            .field("tag", &core::any::type_name::<Tag>())
            .field("requested_size", &self.requested_size)
            .field("next_size", &self.next_size)
            .field("max_size", &self.max_size)
            .finish()
    }
}
