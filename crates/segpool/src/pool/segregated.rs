//! Simple segregated storage
//!
//! The smallest, fastest layer of the pool: a singly-linked free list
//! threaded through the chunks themselves. A free chunk stores the address
//! of the next free chunk in its first machine word; an allocated chunk
//! carries no metadata at all.
//!
//! Where the chunks come from is the caller's business: this type only
//! partitions memory it is handed and tracks the free chunks. Almost every
//! method therefore has preconditions (alignment, sizing, membership) that
//! are delegated to the caller and asserted only in debug builds.
//!
//! # Ordering
//!
//! The storage is *ordered* if walking the free list visits strictly
//! ascending addresses. Ordered operations (`add_ordered_block`,
//! `ordered_deallocate`, `allocate_contiguous`) preserve that property;
//! `add_block` and `deallocate` do not. Whether order is maintained is a
//! caller discipline, not a tracked mode.
//!
//! ## Invariants
//!
//! - Every chunk in the list is at least one machine word and aligned for
//!   a pointer (guaranteed by the pool's chunk sizing)
//! - The list is null-terminated and acyclic
//! - No chunk appears twice

use core::ptr::{self, NonNull};

/// Reads the intrusive link stored at the front of a free chunk.
///
/// # Safety
/// `chunk` must point to a live free chunk: readable for at least
/// `size_of::<*mut u8>()` bytes and pointer-aligned.
#[inline]
pub(crate) unsafe fn next_of(chunk: *mut u8) -> *mut u8 {
    debug_assert!(!chunk.is_null());
    debug_assert_eq!(chunk as usize % core::mem::align_of::<*mut u8>(), 0);
    // SAFETY: per the contract above the first word of the chunk holds the
    // link.
    unsafe { chunk.cast::<*mut u8>().read() }
}

/// Writes the intrusive link at the front of a free chunk.
///
/// # Safety
/// Same contract as [`next_of`], plus the chunk must be writable.
#[inline]
pub(crate) unsafe fn set_next_of(chunk: *mut u8, next: *mut u8) {
    debug_assert!(!chunk.is_null());
    debug_assert_eq!(chunk as usize % core::mem::align_of::<*mut u8>(), 0);
    // SAFETY: per the contract above.
    unsafe { chunk.cast::<*mut u8>().write(next) }
}

/// An intrusive free list over fixed-size chunks.
#[derive(Debug)]
pub struct SegregatedStorage {
    first: *mut u8,
}

impl SegregatedStorage {
    /// Creates an empty storage.
    #[inline]
    pub const fn new() -> Self {
        Self {
            first: ptr::null_mut(),
        }
    }

    /// Checks whether the free list is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first.is_null()
    }

    /// The head of the free list (null when empty).
    #[inline]
    pub(crate) fn head(&self) -> *mut u8 {
        self.first
    }

    /// Replaces the head of the free list.
    #[inline]
    pub(crate) fn set_head(&mut self, head: *mut u8) {
        self.first = head;
    }

    /// Drops every tracked chunk. The memory itself is untouched.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.first = ptr::null_mut();
    }

    /// Partitions `block` into `partition`-sized chunks linked in address
    /// order, terminating in `tail`, and returns the first chunk.
    ///
    /// The links are written back to front so the resulting chain ascends
    /// over the block regardless of its length. A block holding exactly
    /// one chunk simply links to `tail`.
    ///
    /// # Safety
    /// - `block` must be writable for `size` bytes and pointer-aligned
    /// - `partition` must be a non-zero multiple of the pointer alignment
    ///   no larger than `size`
    /// - `tail` must be null or a valid free-chunk pointer
    pub unsafe fn segregate(
        block: *mut u8,
        size: usize,
        partition: usize,
        tail: *mut u8,
    ) -> NonNull<u8> {
        debug_assert!(!block.is_null());
        debug_assert!(partition > 0 && partition <= size);

        // Last chunk that wholly fits, even if `size` is not a multiple of
        // the partition size.
        let shift = ((size - partition) / partition) * partition;
        // SAFETY: shift < size, so `last` stays inside the block.
        let mut last = unsafe { block.add(shift) };
        // SAFETY: last is a chunk inside the block (caller's contract).
        unsafe { set_next_of(last, tail) };

        if last == block {
            // SAFETY: block is non-null (checked above).
            return unsafe { NonNull::new_unchecked(block) };
        }

        // SAFETY: iter walks chunk boundaries strictly inside the block.
        let mut iter = unsafe { last.sub(partition) };
        while iter != block {
            // SAFETY: iter and last are chunks inside the block.
            unsafe { set_next_of(iter, last) };
            last = iter;
            // SAFETY: iter > block, so the step stays in bounds.
            iter = unsafe { iter.sub(partition) };
        }

        // SAFETY: block is the first chunk; last is its successor.
        unsafe { set_next_of(block, last) };
        // SAFETY: block is non-null (checked above).
        unsafe { NonNull::new_unchecked(block) }
    }

    /// Segregates `block` and prepends the chain to the free list.
    ///
    /// Not order-preserving across blocks.
    ///
    /// # Safety
    /// Same contract as [`Self::segregate`]; the block must be disjoint
    /// from every chunk already in the list.
    pub unsafe fn add_block(&mut self, block: *mut u8, size: usize, partition: usize) {
        // SAFETY: forwarded caller contract; `first` is a valid tail.
        self.first = unsafe { Self::segregate(block, size, partition, self.first) }.as_ptr();
    }

    /// Segregates `block` and splices the chain into the free list at its
    /// address-ordered position.
    ///
    /// Order-preserving; O(N) in the free-list length.
    ///
    /// # Safety
    /// Same contract as [`Self::add_block`]; additionally the free list
    /// must be ordered.
    pub unsafe fn add_ordered_block(&mut self, block: *mut u8, size: usize, partition: usize) {
        // SAFETY: the free list is ordered (caller's contract).
        let prev = unsafe { self.find_prev(block) };

        if prev.is_null() {
            // Block precedes every free chunk.
            // SAFETY: forwarded caller contract.
            unsafe { self.add_block(block, size, partition) };
        } else {
            // SAFETY: prev is a live free chunk; splice the segregated
            // chain between it and its successor.
            unsafe {
                let chain = Self::segregate(block, size, partition, next_of(prev));
                set_next_of(prev, chain.as_ptr());
            }
        }
    }

    /// Pops the first free chunk.
    ///
    /// Order-preserving.
    ///
    /// # Safety
    /// The storage must not be empty.
    #[inline]
    pub unsafe fn allocate(&mut self) -> NonNull<u8> {
        debug_assert!(!self.is_empty(), "allocate from empty segregated storage");
        let chunk = self.first;
        // SAFETY: chunk is the live list head (non-empty per contract).
        self.first = unsafe { next_of(chunk) };
        // SAFETY: non-empty per contract.
        unsafe { NonNull::new_unchecked(chunk) }
    }

    /// Pushes `chunk` onto the front of the free list.
    ///
    /// Not order-preserving.
    ///
    /// # Safety
    /// `chunk` must be a chunk previously handed out by this storage and
    /// not currently free.
    #[inline]
    pub unsafe fn deallocate(&mut self, chunk: NonNull<u8>) {
        // SAFETY: chunk is a live, exclusively-owned chunk (caller's
        // contract).
        unsafe { set_next_of(chunk.as_ptr(), self.first) };
        self.first = chunk.as_ptr();
    }

    /// Inserts `chunk` at its address-ordered position in the free list.
    ///
    /// Order-preserving; O(N).
    ///
    /// # Safety
    /// Same contract as [`Self::deallocate`]; additionally the free list
    /// must be ordered.
    pub unsafe fn ordered_deallocate(&mut self, chunk: NonNull<u8>) {
        // SAFETY: the free list is ordered (caller's contract).
        let prev = unsafe { self.find_prev(chunk.as_ptr()) };

        if prev.is_null() {
            // SAFETY: forwarded caller contract.
            unsafe { self.deallocate(chunk) };
        } else {
            // SAFETY: prev is a live free chunk preceding `chunk`.
            unsafe {
                set_next_of(chunk.as_ptr(), next_of(prev));
                set_next_of(prev, chunk.as_ptr());
            }
        }
    }

    /// Finds `n` chunks that are physically contiguous *and* consecutive
    /// in the free list, unlinks them, and returns the first. Returns
    /// `None` when no such run exists (including `n == 0`).
    ///
    /// Order-preserving; O(N). The free list should be ordered: an
    /// unordered list cannot produce runs that were freed out of order,
    /// so the scan may spuriously fail.
    ///
    /// # Safety
    /// `partition` must be the chunk size this storage was populated with.
    pub unsafe fn allocate_contiguous(
        &mut self,
        n: usize,
        partition: usize,
    ) -> Option<NonNull<u8>> {
        if n == 0 {
            return None;
        }

        // `cursor` is the link slot preceding the candidate run: first the
        // list head slot, afterwards the link word inside a chunk (which
        // lives at offset 0, so a chunk pointer doubles as a link slot).
        let mut cursor: *mut *mut u8 = &mut self.first;

        loop {
            // SAFETY: cursor is either &self.first or a live free chunk.
            let run_first = unsafe { cursor.read() };
            if run_first.is_null() {
                return None;
            }

            // SAFETY: run_first is a live free chunk.
            match unsafe { Self::scan_run(run_first, n, partition) } {
                Ok(run_last) => {
                    // Unlink [run_first, run_last] by bridging the
                    // predecessor link over the run.
                    // SAFETY: run_last is a live free chunk; cursor is a
                    // valid link slot.
                    unsafe { cursor.write(next_of(run_last)) };
                    // SAFETY: run_first is non-null (checked above).
                    return Some(unsafe { NonNull::new_unchecked(run_first) });
                }
                Err(break_chunk) => {
                    // The next candidate run begins at the successor of
                    // the chunk where the chain broke; its first word is
                    // its link slot.
                    cursor = break_chunk.cast::<*mut u8>();
                }
            }
        }
    }

    /// Walks up to `n` chunks from `first`. Returns the last chunk of a
    /// full run, or the chunk at which the chain broke (its successor in
    /// the free list is either null or non-contiguous).
    ///
    /// # Safety
    /// `first` must be a live free chunk.
    unsafe fn scan_run(first: *mut u8, n: usize, partition: usize) -> Result<*mut u8, *mut u8> {
        let mut iter = first;
        for _ in 1..n {
            // SAFETY: iter is a live free chunk.
            let next = unsafe { next_of(iter) };
            // SAFETY: address arithmetic only; the sum is compared, not
            // dereferenced.
            if next != unsafe { iter.add(partition) } {
                return Err(iter);
            }
            iter = next;
        }
        Ok(iter)
    }

    /// Re-adds `n` contiguous chunks as a raw block.
    ///
    /// Not order-preserving.
    ///
    /// # Safety
    /// `chunks` must be the start of `n` contiguous chunks previously
    /// handed out by this storage; `partition` must match.
    pub unsafe fn deallocate_contiguous(
        &mut self,
        chunks: NonNull<u8>,
        n: usize,
        partition: usize,
    ) {
        if n != 0 {
            // SAFETY: forwarded caller contract.
            unsafe { self.add_block(chunks.as_ptr(), n * partition, partition) };
        }
    }

    /// Re-adds `n` contiguous chunks at their ordered position.
    ///
    /// Order-preserving.
    ///
    /// # Safety
    /// Same contract as [`Self::deallocate_contiguous`] plus an ordered
    /// free list.
    pub unsafe fn ordered_deallocate_contiguous(
        &mut self,
        chunks: NonNull<u8>,
        n: usize,
        partition: usize,
    ) {
        if n != 0 {
            // SAFETY: forwarded caller contract.
            unsafe { self.add_ordered_block(chunks.as_ptr(), n * partition, partition) };
        }
    }

    /// Finds the last free chunk whose address precedes `ptr`, or null if
    /// `ptr` precedes the whole list.
    ///
    /// # Safety
    /// The free list must be ordered.
    unsafe fn find_prev(&self, ptr: *mut u8) -> *mut u8 {
        if self.first.is_null() || self.first > ptr {
            return ptr::null_mut();
        }

        let mut iter = self.first;
        loop {
            // SAFETY: iter is a live free chunk.
            let next = unsafe { next_of(iter) };
            if next.is_null() || next > ptr {
                return iter;
            }
            iter = next;
        }
    }
}

impl Default for SegregatedStorage {
    fn default() -> Self {
        Self::new()
    }
}
