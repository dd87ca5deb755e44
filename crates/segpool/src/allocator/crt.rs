//! C-runtime allocator
//!
//! A shallow wrapper around `malloc`, `realloc` and `free`. Useful when
//! allocations must interoperate with C code that frees them, and as a
//! pool upstream that bypasses the Rust global allocator.
//!
//! The C runtime only guarantees `max_align_t` alignment, so layouts with
//! a stricter alignment are rejected; use
//! [`AlignedAllocator`](super::AlignedAllocator) for those.

use core::alloc::Layout;
use core::ffi::c_void;
use core::mem;
use core::ptr::NonNull;

use super::traits::{validate_layout, RawAllocator, ThreadSafeRawAllocator, TypedAllocator};
use crate::error::{AllocError, AllocResult};

/// Standard C-runtime memory allocator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrtAllocator;

impl CrtAllocator {
    /// Creates a new `CrtAllocator`.
    #[inline]
    pub const fn new() -> Self {
        CrtAllocator
    }

    /// The strongest alignment `malloc` guarantees on this platform.
    #[inline]
    pub fn max_alignment() -> usize {
        mem::align_of::<libc::max_align_t>()
    }

    #[inline]
    fn check_alignment(layout: Layout) -> AllocResult<()> {
        if layout.align() > Self::max_alignment() {
            return Err(AllocError::invalid_alignment()
                .with_message("alignment exceeds the C runtime guarantee"));
        }
        Ok(())
    }
}

// SAFETY: malloc returns memory aligned to max_align_t or null; layouts
// above that alignment are rejected before the call.
unsafe impl RawAllocator for CrtAllocator {
    /// # Safety
    /// Caller must release the returned pointer with `deallocate` (or C's
    /// `free`) exactly once.
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        validate_layout(layout)?;
        Self::check_alignment(layout)?;

        if layout.size() == 0 {
            let ptr = NonNull::<u8>::dangling();
            return Ok(NonNull::slice_from_raw_parts(ptr, 0));
        }

        // SAFETY: size is non-zero and fits isize (validated above).
        let ptr = unsafe { libc::malloc(layout.size()) };

        match NonNull::new(ptr.cast::<u8>()) {
            Some(ptr) => Ok(NonNull::slice_from_raw_parts(ptr, layout.size())),
            None => Err(AllocError::exhausted(layout)),
        }
    }

    /// # Safety
    /// `ptr` must have been allocated by this allocator (or C's `malloc`
    /// family) and must not already have been freed.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }

        // SAFETY: ptr came from malloc/realloc (caller's contract).
        unsafe { libc::free(ptr.as_ptr().cast::<c_void>()) };
    }

    /// # Safety
    /// `ptr` must have been allocated with `old_layout`; on failure it
    /// remains valid.
    unsafe fn reallocate(
        &self,
        ptr: NonNull<u8>,
        old_layout: Layout,
        new_layout: Layout,
    ) -> AllocResult<NonNull<[u8]>> {
        validate_layout(new_layout)?;
        Self::check_alignment(new_layout)?;

        if old_layout.size() == 0 || new_layout.size() == 0 {
            // SAFETY: forwarded caller contract; one of the endpoints is
            // the no-allocation case, so the default copy path is correct.
            let new_ptr = unsafe { RawAllocator::allocate(self, new_layout)? };
            // SAFETY: forwarded caller contract.
            unsafe { RawAllocator::deallocate(self, ptr, old_layout) };
            return Ok(new_ptr);
        }

        // SAFETY: ptr came from malloc/realloc with old_layout (caller's
        // contract); realloc returns null on failure without touching the
        // old allocation.
        let new_ptr = unsafe { libc::realloc(ptr.as_ptr().cast::<c_void>(), new_layout.size()) };

        match NonNull::new(new_ptr.cast::<u8>()) {
            Some(new_ptr) => Ok(NonNull::slice_from_raw_parts(new_ptr, new_layout.size())),
            None => Err(AllocError::exhausted(new_layout)),
        }
    }
}

// SAFETY: the C runtime allocator is thread-safe on every supported
// platform and the wrapper holds no state.
unsafe impl ThreadSafeRawAllocator for CrtAllocator {}

impl<T> TypedAllocator<T> for CrtAllocator {
    fn allocate(&self, n: usize) -> AllocResult<NonNull<T>> {
        let layout =
            Layout::array::<T>(n).map_err(|_| AllocError::size_overflow("array layout"))?;
        // SAFETY: the pointer is only released through this facade family
        // with the same n.
        let ptr = unsafe { RawAllocator::allocate(self, layout)? };
        Ok(ptr.cast())
    }

    unsafe fn deallocate(&self, ptr: NonNull<T>, n: usize) {
        let Ok(layout) = Layout::array::<T>(n) else {
            debug_assert!(false, "deallocate with overflowing element count");
            return;
        };
        // SAFETY: forwarded caller contract.
        unsafe { RawAllocator::deallocate(self, ptr.cast(), layout) };
    }

    unsafe fn reallocate(
        &self,
        ptr: NonNull<T>,
        old_n: usize,
        new_n: usize,
        live: usize,
        old_offset: usize,
        new_offset: usize,
    ) -> AllocResult<NonNull<T>> {
        debug_assert!(old_offset + live <= old_n);
        debug_assert!(new_offset + live <= new_n);

        if old_offset == 0 && new_offset == 0 {
            // Elements stay at the front of the array, so the underlying
            // realloc relocates them wholesale (every Rust type is
            // bitwise-movable).
            let old_layout =
                Layout::array::<T>(old_n).map_err(|_| AllocError::size_overflow("array layout"))?;
            let new_layout =
                Layout::array::<T>(new_n).map_err(|_| AllocError::size_overflow("array layout"))?;
            // SAFETY: ptr came from allocate(old_n) on this family
            // (caller's contract).
            let new_ptr =
                unsafe { RawAllocator::reallocate(self, ptr.cast(), old_layout, new_layout)? };
            return Ok(new_ptr.cast());
        }

        // Offset move: allocate, copy the live range, free.
        let new_ptr: NonNull<T> = TypedAllocator::allocate(self, new_n)?;
        if live > 0 {
            // SAFETY: the live source range is initialized and in bounds;
            // the destination is a fresh, disjoint allocation.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    ptr.as_ptr().add(old_offset),
                    new_ptr.as_ptr().add(new_offset),
                    live,
                );
            }
        }
        // SAFETY: forwarded caller contract.
        unsafe { TypedAllocator::deallocate(self, ptr, old_n) };
        Ok(new_ptr)
    }
}
