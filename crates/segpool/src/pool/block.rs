//! Super-block descriptors
//!
//! A super-block is one contiguous upstream allocation holding `K` chunks
//! followed by a two-slot trailer: the address of the next super-block
//! (one chunk-alignment unit wide) and its total size (`usize`). The
//! trailer makes the block list traversable without any side allocation;
//! those tail bytes are reserved and never handed out as chunks.
//!
//! [`BlockPtr`] is a by-value descriptor `{ begin, total_size }`. Copying
//! it is safe because the list links live in the block itself, not in the
//! descriptor.
//!
//! ```text
//! [chunk 0][chunk 1]...[chunk K-1][next ptr][next size]
//! ^begin                          ^end      ^end + A
//! |------------ element region ---|-- trailer --------|
//! ```

use core::mem;
use core::ptr;

use crate::utils::chunk_align;

/// Bytes reserved at the tail of every super-block for the intrusive
/// list node.
#[inline]
pub(crate) const fn trailer_size() -> usize {
    chunk_align() + mem::size_of::<usize>()
}

/// By-value descriptor of a super-block.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockPtr {
    ptr: *mut u8,
    total_size: usize,
}

impl BlockPtr {
    /// An invalid descriptor (list terminator).
    #[inline]
    pub(crate) const fn invalid() -> Self {
        Self {
            ptr: ptr::null_mut(),
            total_size: 0,
        }
    }

    /// Describes the block at `ptr` spanning `total_size` bytes.
    #[inline]
    pub(crate) fn new(ptr: *mut u8, total_size: usize) -> Self {
        debug_assert!(ptr.is_null() || total_size > trailer_size());
        Self { ptr, total_size }
    }

    /// Whether this descriptor names a block.
    #[inline]
    pub(crate) fn is_valid(&self) -> bool {
        !self.ptr.is_null()
    }

    /// First byte of the element region.
    #[inline]
    pub(crate) fn begin(&self) -> *mut u8 {
        self.ptr
    }

    /// Total upstream allocation size, trailer included.
    #[inline]
    pub(crate) fn total_size(&self) -> usize {
        self.total_size
    }

    /// Size of the element region (chunks only).
    #[inline]
    pub(crate) fn element_size(&self) -> usize {
        self.total_size - trailer_size()
    }

    /// One past the last byte of the element region; the trailer starts
    /// here.
    #[inline]
    pub(crate) fn end(&self) -> *mut u8 {
        debug_assert!(self.is_valid());
        // SAFETY: element_size is within the block allocation.
        unsafe { self.ptr.add(self.element_size()) }
    }

    /// Whether `ptr` lies inside this block's element region.
    #[inline]
    pub(crate) fn contains(&self, ptr: *const u8) -> bool {
        self.is_valid() && ptr >= self.begin().cast_const() && ptr < self.end().cast_const()
    }

    /// Reads the trailer and returns the next block's descriptor.
    ///
    /// # Safety
    /// The descriptor must be valid and its trailer initialized (via
    /// [`Self::set_next`]).
    #[inline]
    pub(crate) unsafe fn next(&self) -> BlockPtr {
        debug_assert!(self.is_valid());
        // SAFETY: the trailer slots sit at `end` and `end + A` inside the
        // allocation; `end` is aligned to A because begin is A-aligned and
        // the element region is a multiple of A.
        let next_ptr = unsafe { self.end().cast::<*mut u8>().read() };
        if next_ptr.is_null() {
            return BlockPtr::invalid();
        }
        // SAFETY: same allocation, size slot at end + A is usize-aligned.
        let next_size = unsafe { self.end().add(chunk_align()).cast::<usize>().read() };
        BlockPtr::new(next_ptr, next_size)
    }

    /// Writes `next` into the trailer.
    ///
    /// # Safety
    /// The descriptor must be valid and the trailer bytes writable (they
    /// are, for any block sized by the pool).
    #[inline]
    pub(crate) unsafe fn set_next(&self, next: BlockPtr) {
        debug_assert!(self.is_valid());
        // SAFETY: as in `next`; the slots are in bounds and aligned.
        unsafe {
            self.end().cast::<*mut u8>().write(next.ptr);
            self.end()
                .add(chunk_align())
                .cast::<usize>()
                .write(next.total_size);
        }
    }
}
