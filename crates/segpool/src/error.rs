//! Memory allocation error type
//!
//! A single error type covers every fallible operation in the crate. Two
//! situations surface as errors at the call site: the upstream allocator
//! is exhausted (after the pool's one permitted backtrack), or a layout
//! request is malformed. Precondition violations (foreign pointers,
//! double frees) are debug assertions, not errors.

use core::alloc::Layout;
use core::fmt;

/// Categories of allocation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AllocErrorKind {
    /// The upstream allocator could not satisfy the request.
    OutOfMemory,
    /// A size computation overflowed `usize`.
    SizeOverflow,
    /// The requested alignment is not a power of two, or exceeds what the
    /// allocator can guarantee.
    InvalidAlignment,
    /// The layout parameters are malformed for this allocator.
    InvalidLayout,
}

impl AllocErrorKind {
    /// Returns a static string describing the error.
    pub const fn as_str(&self) -> &'static str {
        match self {
            AllocErrorKind::OutOfMemory => "out of memory",
            AllocErrorKind::SizeOverflow => "size overflow",
            AllocErrorKind::InvalidAlignment => "invalid alignment",
            AllocErrorKind::InvalidLayout => "invalid layout",
        }
    }
}

impl fmt::Display for AllocErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by allocators and pools.
///
/// Carries the failure kind, the layout that could not be satisfied (when
/// one was involved), and an optional static context message.
#[derive(Debug, Clone)]
pub struct AllocError {
    kind: AllocErrorKind,
    layout: Option<Layout>,
    message: Option<&'static str>,
}

impl AllocError {
    /// Creates an error with the given kind and no layout information.
    #[inline]
    pub const fn new(kind: AllocErrorKind) -> Self {
        Self {
            kind,
            layout: None,
            message: None,
        }
    }

    /// Out-of-memory for a specific size and alignment.
    #[inline]
    pub fn allocation_failed(size: usize, align: usize) -> Self {
        let layout = Layout::from_size_align(size, align).ok();
        Self {
            kind: AllocErrorKind::OutOfMemory,
            layout,
            message: None,
        }
    }

    /// Out-of-memory for a specific layout.
    #[inline]
    pub const fn exhausted(layout: Layout) -> Self {
        Self {
            kind: AllocErrorKind::OutOfMemory,
            layout: Some(layout),
            message: None,
        }
    }

    /// A size computation overflowed.
    #[inline]
    pub const fn size_overflow(message: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::SizeOverflow,
            layout: None,
            message: Some(message),
        }
    }

    /// The requested alignment cannot be honoured.
    #[inline]
    pub const fn invalid_alignment() -> Self {
        Self {
            kind: AllocErrorKind::InvalidAlignment,
            layout: None,
            message: None,
        }
    }

    /// Malformed layout parameters.
    #[inline]
    pub const fn invalid_layout(message: &'static str) -> Self {
        Self {
            kind: AllocErrorKind::InvalidLayout,
            layout: None,
            message: Some(message),
        }
    }

    /// Attaches a static context message.
    #[inline]
    pub const fn with_message(mut self, message: &'static str) -> Self {
        self.message = Some(message);
        self
    }

    /// Returns the failure kind.
    #[inline]
    pub const fn kind(&self) -> AllocErrorKind {
        self.kind
    }

    /// Returns the layout associated with this error, if any.
    #[inline]
    pub const fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// Checks whether this is an out-of-memory error.
    #[inline]
    pub const fn is_out_of_memory(&self) -> bool {
        matches!(self.kind, AllocErrorKind::OutOfMemory)
    }

    /// Checks whether this is an invalid-alignment error.
    #[inline]
    pub const fn is_invalid_alignment(&self) -> bool {
        matches!(self.kind, AllocErrorKind::InvalidAlignment)
    }
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.layout {
            Some(layout) => write!(
                f,
                "memory allocation failed ({}): {} bytes with alignment {}",
                self.kind,
                layout.size(),
                layout.align()
            )?,
            None => write!(f, "memory allocation failed ({})", self.kind)?,
        }
        if let Some(message) = self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AllocError {}

/// Result type for allocation operations.
pub type AllocResult<T> = Result<T, AllocError>;
