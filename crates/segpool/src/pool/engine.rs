//! Pool engine
//!
//! A [`Pool`] owns a chain of super-blocks acquired from an upstream
//! allocator and serves fixed-size chunks out of them through a
//! [`SegregatedStorage`] free list. Growth follows a doubling schedule
//! with an optional cap and a single halve-and-retry backtrack when the
//! upstream refuses a request.
//!
//! Two free-list disciplines coexist on the same pool:
//!
//! - the unordered discipline (`allocate`/`deallocate`) is O(1) but gives
//!   up the invariants the ordered operations need;
//! - the ordered discipline (`ordered_*`) keeps the free list sorted by
//!   address, which is what makes contiguous multi-chunk allocation and
//!   [`Pool::release_memory`] work.
//!
//! The pool does not track which discipline has been used; mixing them and
//! then calling an ordered operation is a caller obligation (the operation
//! stays memory-safe but may scan more or spuriously fail).
//!
//! ## Invariants
//!
//! - Every free chunk lies inside exactly one super-block in the list
//! - The block list is sorted by ascending `begin` as long as only
//!   ordered growth has occurred
//! - The trailer slots of a super-block are never handed out as chunks
//! - A failed growth leaves the free list and block list untouched

use core::alloc::Layout;
use core::ptr::NonNull;

use super::block::{trailer_size, BlockPtr};
use super::segregated::{next_of, set_next_of, SegregatedStorage};
use crate::allocator::{RawAllocator, SystemAllocator};
use crate::error::{AllocError, AllocResult};
use crate::utils::{chunk_align, chunk_size};

/// Default chunk count requested from the upstream on the first growth.
pub const DEFAULT_NEXT_SIZE: usize = 32;

/// Growth never backtracks below this many chunks for single-chunk
/// requests.
const MIN_BACKTRACK_CHUNKS: usize = 4;

/// A fixed-chunk memory pool over an upstream allocator.
///
/// Single-owner: all operations take `&mut self` and the type is
/// deliberately not `Sync`. Wrap it in [`SharedPool`](super::SharedPool)
/// or go through [`SingletonPool`](super::SingletonPool) for concurrent
/// use.
///
/// Dropping the pool returns every super-block to the upstream,
/// invalidating all outstanding chunks.
pub struct Pool<U: RawAllocator = SystemAllocator> {
    storage: SegregatedStorage,
    list: BlockPtr,
    requested_size: usize,
    chunk_size: usize,
    next_size: usize,
    start_size: usize,
    max_size: usize,
    upstream: U,
}

impl Pool<SystemAllocator> {
    /// Creates a pool serving chunks of at least `requested_size` bytes
    /// from the system allocator, with the default growth schedule.
    pub fn new(requested_size: usize) -> Self {
        Self::with_sizes(requested_size, DEFAULT_NEXT_SIZE, 0)
    }
}

impl<U: RawAllocator + Default> Pool<U> {
    /// Creates a pool with an explicit growth schedule.
    ///
    /// `next_size` is the chunk count of the first super-block (clamped to
    /// at least 1); `max_size` caps the doubling schedule in
    /// requested-size units, with 0 meaning uncapped.
    pub fn with_sizes(requested_size: usize, next_size: usize, max_size: usize) -> Self {
        Self::with_upstream(requested_size, next_size, max_size, U::default())
    }
}

impl<U: RawAllocator> Pool<U> {
    /// Creates a pool over an explicit upstream allocator.
    pub fn with_upstream(
        requested_size: usize,
        next_size: usize,
        max_size: usize,
        upstream: U,
    ) -> Self {
        let next_size = next_size.max(1);
        let chunk = chunk_size(requested_size);
        debug_assert!(chunk >= core::mem::size_of::<*mut u8>());
        debug_assert_eq!(chunk % chunk_align(), 0);

        Self {
            storage: SegregatedStorage::new(),
            list: BlockPtr::invalid(),
            requested_size,
            chunk_size: chunk,
            next_size,
            start_size: next_size,
            max_size,
            upstream,
        }
    }

    /// The chunk size callers asked for.
    #[inline]
    pub fn requested_size(&self) -> usize {
        self.requested_size
    }

    /// The actual chunk size `P` (requested size rounded up to the chunk
    /// granularity).
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Chunk count the next growth will request from the upstream.
    #[inline]
    pub fn next_size(&self) -> usize {
        self.next_size
    }

    /// Initial value of [`Self::next_size`], restored by
    /// [`Self::release_memory`] and [`Self::purge_memory`].
    #[inline]
    pub fn start_size(&self) -> usize {
        self.start_size
    }

    /// Growth cap in requested-size units (0 = uncapped).
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns a chunk, growing the pool if the free list is empty.
    ///
    /// O(1) amortised; not order-preserving.
    ///
    /// # Errors
    /// Out-of-memory iff the upstream is exhausted after the single
    /// permitted backtrack.
    pub fn allocate(&mut self) -> AllocResult<NonNull<u8>> {
        if !self.storage.is_empty() {
            // SAFETY: the free list is non-empty.
            return Ok(unsafe { self.storage.allocate() });
        }

        let block = self.grow_single()?;
        // SAFETY: block is a fresh upstream allocation sized and aligned
        // by `block_layout`; the list head is a valid descriptor or
        // invalid (terminator).
        unsafe {
            block.set_next(self.list);
            self.list = block;
            self.storage
                .add_block(block.begin(), block.element_size(), self.chunk_size);
            // The new block holds at least one chunk.
            Ok(self.storage.allocate())
        }
    }

    /// Returns a chunk, keeping both the free list and the block list
    /// address-ordered across growth.
    ///
    /// O(1) amortised, O(N) on growth.
    ///
    /// # Errors
    /// As [`Self::allocate`].
    pub fn ordered_allocate(&mut self) -> AllocResult<NonNull<u8>> {
        if !self.storage.is_empty() {
            // SAFETY: the free list is non-empty; popping the head
            // preserves order.
            return Ok(unsafe { self.storage.allocate() });
        }

        let block = self.grow_single()?;
        // SAFETY: block is a fresh upstream allocation; ordered insertion
        // contracts are upheld by the ordered discipline.
        unsafe {
            self.insert_block_ordered(block);
            self.storage
                .add_ordered_block(block.begin(), block.element_size(), self.chunk_size);
            Ok(self.storage.allocate())
        }
    }

    /// Returns the start of `n` physically contiguous chunks.
    ///
    /// Requires the ordered discipline. On a free-list miss the pool grows
    /// by `max(next_size, n)` chunks; surplus chunks from the new block go
    /// back onto the free list at their ordered position.
    ///
    /// # Errors
    /// Out-of-memory if growth fails after the single backtrack; invalid
    /// layout for `n == 0`.
    pub fn ordered_allocate_contiguous(&mut self, n: usize) -> AllocResult<NonNull<u8>> {
        if n == 0 {
            return Err(AllocError::invalid_layout("zero chunks requested"));
        }

        // SAFETY: chunk_size is the partition this storage is populated
        // with.
        if let Some(run) = unsafe { self.storage.allocate_contiguous(n, self.chunk_size) } {
            return Ok(run);
        }

        let block = self.grow_contiguous(n)?;
        let total_chunks = block.element_size() / self.chunk_size;
        debug_assert!(total_chunks >= n);

        // SAFETY: block is a fresh upstream allocation; the requested
        // prefix is handed out and the surplus tail is re-segregated.
        unsafe {
            if total_chunks > n {
                let surplus = block.begin().add(n * self.chunk_size);
                self.storage.add_ordered_block(
                    surplus,
                    (total_chunks - n) * self.chunk_size,
                    self.chunk_size,
                );
            }
            self.insert_block_ordered(block);
            Ok(NonNull::new_unchecked(block.begin()))
        }
    }

    /// Pushes `chunk` back on the free list.
    ///
    /// O(1); not order-preserving.
    ///
    /// # Safety
    /// `chunk` must have been returned by this pool and not freed since.
    #[inline]
    pub unsafe fn deallocate(&mut self, chunk: NonNull<u8>) {
        debug_assert!(self.is_from(chunk.as_ptr()), "chunk from another pool");
        // SAFETY: forwarded caller contract.
        unsafe { self.storage.deallocate(chunk) };
    }

    /// Inserts `chunk` at its address-ordered position in the free list.
    ///
    /// O(N); order-preserving.
    ///
    /// # Safety
    /// As [`Self::deallocate`], plus the ordered discipline.
    #[inline]
    pub unsafe fn ordered_deallocate(&mut self, chunk: NonNull<u8>) {
        debug_assert!(self.is_from(chunk.as_ptr()), "chunk from another pool");
        // SAFETY: forwarded caller contract.
        unsafe { self.storage.ordered_deallocate(chunk) };
    }

    /// Returns `n` contiguous chunks starting at `chunks` to the free
    /// list.
    ///
    /// # Safety
    /// `chunks` must be the start of `n` contiguous chunks previously
    /// returned by this pool (in one contiguous allocation) and not freed
    /// since.
    #[inline]
    pub unsafe fn deallocate_contiguous(&mut self, chunks: NonNull<u8>, n: usize) {
        debug_assert!(n == 0 || self.is_from(chunks.as_ptr()), "chunks from another pool");
        // SAFETY: forwarded caller contract.
        unsafe {
            self.storage
                .deallocate_contiguous(chunks, n, self.chunk_size)
        };
    }

    /// Ordered variant of [`Self::deallocate_contiguous`].
    ///
    /// # Safety
    /// As [`Self::deallocate_contiguous`], plus the ordered discipline.
    #[inline]
    pub unsafe fn ordered_deallocate_contiguous(&mut self, chunks: NonNull<u8>, n: usize) {
        debug_assert!(n == 0 || self.is_from(chunks.as_ptr()), "chunks from another pool");
        // SAFETY: forwarded caller contract.
        unsafe {
            self.storage
                .ordered_deallocate_contiguous(chunks, n, self.chunk_size)
        };
    }

    /// Checks whether `ptr` lies in the element region of one of this
    /// pool's super-blocks. O(|blocks|).
    pub fn is_from(&self, ptr: *const u8) -> bool {
        let mut block = self.list;
        while block.is_valid() {
            if block.contains(ptr) {
                return true;
            }
            // SAFETY: block is a valid descriptor in the list; trailers
            // are initialized at insertion.
            block = unsafe { block.next() };
        }
        false
    }

    /// Returns every fully-free super-block to the upstream.
    ///
    /// Walks the block list and the free list in lock-step, so it
    /// requires the ordered discipline. A block is released only when
    /// every one of its chunk slots is present in the free list; its
    /// chunks are spliced out of the free list in the process. Resets
    /// `next_size` to `start_size`.
    ///
    /// Returns true iff at least one block was released.
    pub fn release_memory(&mut self) -> bool {
        let mut freed = false;

        let mut block = self.list;
        let mut prev_block = BlockPtr::invalid();
        // Cursor into the (ordered) free list and its predecessor.
        let mut free_p = self.storage.head();
        let mut prev_free: *mut u8 = core::ptr::null_mut();

        while block.is_valid() {
            // No free chunks left: every remaining block has live
            // allocations.
            if free_p.is_null() {
                break;
            }

            // Walk the block's chunk slots and the free list in lock-step.
            // Both ascend, so a fully-free block consumes exactly its own
            // slots from the cursor.
            let mut all_free = true;
            let saved_free = free_p;
            let mut chunk = block.begin();
            while chunk != block.end() {
                if chunk != free_p {
                    all_free = false;
                    free_p = saved_free;
                    break;
                }
                // SAFETY: free_p is a live free chunk (it matched a chunk
                // slot).
                free_p = unsafe { next_of(free_p) };
                // SAFETY: stride stays within [begin, end].
                chunk = unsafe { chunk.add(self.chunk_size) };
            }

            // SAFETY: block is valid and its trailer initialized.
            let next = unsafe { block.next() };

            if all_free {
                // Splice the block's chunks out of the free list: the
                // predecessor (if any) now links to the first free chunk
                // past the block.
                if prev_free.is_null() {
                    self.storage.set_head(free_p);
                } else {
                    // SAFETY: prev_free is a live free chunk outside this
                    // block.
                    unsafe { set_next_of(prev_free, free_p) };
                }

                // Splice the block out of the block list.
                if prev_block.is_valid() {
                    // SAFETY: prev_block is a valid descriptor.
                    unsafe { prev_block.set_next(next) };
                } else {
                    self.list = next;
                }

                #[cfg(feature = "logging")]
                tracing::trace!(
                    begin = block.begin() as usize,
                    total_size = block.total_size(),
                    "releasing fully-free super-block"
                );

                // SAFETY: the block was allocated from the upstream with
                // exactly this layout and is no longer referenced by
                // either list.
                unsafe {
                    self.upstream
                        .deallocate(NonNull::new_unchecked(block.begin()), block_layout(block.total_size()));
                }
                freed = true;
            } else {
                // Advance the cursor past this block, remembering the last
                // in-block free chunk as the predecessor for any later
                // excision.
                if !free_p.is_null() && block.contains(free_p) {
                    let end = block.end();
                    loop {
                        prev_free = free_p;
                        // SAFETY: free_p is a live free chunk.
                        free_p = unsafe { next_of(free_p) };
                        if free_p.is_null() || free_p >= end {
                            break;
                        }
                    }
                }
                prev_block = block;
            }

            block = next;
        }

        self.next_size = self.start_size;
        freed
    }

    /// Unconditionally returns every super-block to the upstream,
    /// invalidating all outstanding chunks, and resets the pool to its
    /// initial state.
    ///
    /// Returns true iff there was anything to release.
    pub fn purge_memory(&mut self) -> bool {
        let had_blocks = self.list.is_valid();

        #[cfg(feature = "logging")]
        if had_blocks {
            tracing::trace!("purging pool");
        }

        let mut block = self.list;
        while block.is_valid() {
            // SAFETY: block is valid and its trailer initialized; read the
            // link before the block is freed.
            let next = unsafe { block.next() };
            // SAFETY: the block was allocated from the upstream with
            // exactly this layout.
            unsafe {
                self.upstream
                    .deallocate(NonNull::new_unchecked(block.begin()), block_layout(block.total_size()));
            }
            block = next;
        }

        self.list = BlockPtr::invalid();
        self.storage.reset();
        self.next_size = self.start_size;
        had_blocks
    }

    /// Point-in-time statistics snapshot.
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> super::stats::PoolStats {
        let mut blocks = 0;
        let mut capacity_chunks = 0;
        let mut block = self.list;
        while block.is_valid() {
            blocks += 1;
            capacity_chunks += block.element_size() / self.chunk_size;
            // SAFETY: block is a valid descriptor in the list.
            block = unsafe { block.next() };
        }

        let mut free_chunks = 0;
        let mut chunk = self.storage.head();
        while !chunk.is_null() {
            free_chunks += 1;
            // SAFETY: chunk is a live free chunk.
            chunk = unsafe { next_of(chunk) };
        }

        super::stats::PoolStats {
            blocks,
            capacity_chunks,
            free_chunks,
            chunk_size: self.chunk_size,
            next_size: self.next_size,
            start_size: self.start_size,
            max_size: self.max_size,
        }
    }

    /// Acquires a super-block for single-chunk growth, backtracking once.
    fn grow_single(&mut self) -> AllocResult<BlockPtr> {
        let block = match self.acquire_block(self.next_size) {
            Ok(block) => block,
            Err(err) => {
                if self.next_size <= MIN_BACKTRACK_CHUNKS {
                    return Err(err);
                }
                self.next_size /= 2;
                self.acquire_block(self.next_size)?
            }
        };
        self.advance_schedule();
        Ok(block)
    }

    /// Acquires a super-block for `n`-contiguous growth, backtracking
    /// once but never below `n` chunks.
    fn grow_contiguous(&mut self, n: usize) -> AllocResult<BlockPtr> {
        let block = match self.acquire_block(self.next_size.max(n)) {
            Ok(block) => block,
            Err(err) => {
                if self.next_size <= n {
                    return Err(err);
                }
                self.next_size = (self.next_size / 2).max(n);
                self.acquire_block(self.next_size.max(n))?
            }
        };
        self.advance_schedule();
        Ok(block)
    }

    /// Requests one super-block of `chunks` chunks from the upstream.
    /// State is only touched on success.
    fn acquire_block(&mut self, chunks: usize) -> AllocResult<BlockPtr> {
        let pod_size = chunks
            .checked_mul(self.chunk_size)
            .and_then(|bytes| bytes.checked_add(trailer_size()))
            .ok_or_else(|| AllocError::size_overflow("super-block size"))?;
        let layout = Layout::from_size_align(pod_size, chunk_align())
            .map_err(|_| AllocError::size_overflow("super-block layout"))?;

        // SAFETY: layout is well-formed (size checked, alignment is the
        // chunk granularity); the block is released with the same layout.
        let raw = unsafe { self.upstream.allocate(layout)? };

        #[cfg(feature = "logging")]
        tracing::trace!(chunks, pod_size, "acquired super-block");

        Ok(BlockPtr::new(raw.as_ptr().cast::<u8>(), pod_size))
    }

    /// Doubles `next_size`, clamped by the cap.
    fn advance_schedule(&mut self) {
        if self.max_size == 0 {
            self.next_size = self.next_size.saturating_mul(2);
        } else {
            let cap = self.max_size * self.requested_size / self.chunk_size;
            self.next_size = self.next_size.saturating_mul(2).min(cap.max(1));
        }
    }

    /// Inserts `block` into the block list, keeping it sorted by
    /// ascending `begin`.
    ///
    /// # Safety
    /// `block` must be a fresh, valid descriptor not yet in the list.
    unsafe fn insert_block_ordered(&mut self, block: BlockPtr) {
        if !self.list.is_valid() || self.list.begin() > block.begin() {
            // SAFETY: trailer slots of `block` are writable.
            unsafe { block.set_next(self.list) };
            self.list = block;
            return;
        }

        let mut prev = self.list;
        loop {
            // SAFETY: prev is a valid descriptor in the list.
            let next = unsafe { prev.next() };
            if !next.is_valid() || next.begin() > block.begin() {
                // SAFETY: trailers of both blocks are writable.
                unsafe {
                    block.set_next(next);
                    prev.set_next(block);
                }
                return;
            }
            prev = next;
        }
    }
}

/// Layout of a live super-block: `pod_size` bytes at the chunk
/// granularity. Only called for sizes that were validated when the block
/// was acquired.
#[inline]
fn block_layout(pod_size: usize) -> Layout {
    // SAFETY: chunk_align() is a power of two and pod_size passed
    // Layout::from_size_align when the block was allocated.
    unsafe { Layout::from_size_align_unchecked(pod_size, chunk_align()) }
}

impl<U: RawAllocator> Drop for Pool<U> {
    fn drop(&mut self) {
        self.purge_memory();
    }
}

// SAFETY: the pool exclusively owns every super-block its raw pointers
// reference; moving it to another thread moves that ownership wholesale.
// It is not Sync: all mutation goes through &mut self.
unsafe impl<U: RawAllocator + Send> Send for Pool<U> {}

impl<U: RawAllocator> core::fmt::Debug for Pool<U> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pool")
            .field("requested_size", &self.requested_size)
            .field("chunk_size", &self.chunk_size)
            .field("next_size", &self.next_size)
            .field("start_size", &self.start_size)
            .field("max_size", &self.max_size)
            .finish_non_exhaustive()
    }
}
