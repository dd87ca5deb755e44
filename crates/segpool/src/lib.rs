//! # segpool
//!
//! Fixed-chunk memory pools built on simple segregated storage.
//!
//! A pool hands out fixed-size chunks carved from larger heap-acquired
//! super-blocks, trading generality for O(1) allocation, zero per-chunk
//! metadata, and freedom from external fragmentation. The crate provides:
//!
//! - [`pool::Pool`]: the single-owner pool engine: doubling growth
//!   schedule, ordered and unordered free-list disciplines, contiguous
//!   multi-chunk allocation, and reclamation of fully-free super-blocks
//! - [`pool::SharedPool`]: the same engine behind an `Arc` + mutex for
//!   shared ownership across threads
//! - [`pool::SingletonPool`]: process-wide pools keyed by a tag type and
//!   pool shape, lazily initialised and intentionally never destroyed
//! - [`allocator`]: a `Layout`-based raw allocator trait with system,
//!   C-runtime, over-aligned, and null pass-through implementations, plus
//!   typed container-facing facades over the pools
//!
//! ## Quick Start
//!
//! ```rust
//! use segpool::pool::Pool;
//!
//! let mut pool = Pool::new(64);
//! let chunk = pool.allocate().unwrap();
//! assert!(pool.is_from(chunk.as_ptr()));
//! // SAFETY: `chunk` came from this pool and is not used again.
//! unsafe { pool.deallocate(chunk) };
//! ```
//!
//! Typed, container-facing allocation goes through the facades:
//!
//! ```rust
//! use segpool::allocator::{PoolAllocator, TypedAllocator};
//!
//! let alloc = PoolAllocator::<u64>::new();
//! let ptr = alloc.allocate(4).unwrap();
//! // SAFETY: same facade family, same length.
//! unsafe { alloc.deallocate(ptr, 4) };
//! ```
//!
//! ## Features
//!
//! - `stats` (default): pool statistics snapshots
//! - `logging`: `tracing` events on growth, release and purge
//! - `full`: everything above

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

// Error types and result handling
mod error;

// Alignment arithmetic helpers
pub mod utils;

// Raw allocators and typed facades
pub mod allocator;

// The pool engine and its ownership wrappers
pub mod pool;

pub use crate::error::{AllocError, AllocErrorKind, AllocResult};

/// Convenient re-exports of commonly used types and traits.
pub mod prelude {
    pub use crate::allocator::{
        AlignedAllocator, CrtAllocator, FastPoolAllocator, NullAllocator, PoolAllocator,
        RawAllocator, SharedPoolAllocator, SystemAllocator, TypedAllocator,
    };
    pub use crate::error::{AllocError, AllocErrorKind, AllocResult};
    pub use crate::pool::{DefaultPoolTag, Pool, PoolTag, SharedPool, SingletonPool};
}
