//! Fixed-chunk memory pools
//!
//! The pool family, bottom to top:
//!
//! - [`SegregatedStorage`]: the intrusive free list that partitions raw
//!   blocks into chunks
//! - [`Pool`]: the engine: super-block growth, ordered/unordered
//!   disciplines, contiguous allocation, reclamation
//! - [`SharedPool`]: `Arc` + mutex shared ownership of one engine
//! - [`SingletonPool`]: process-wide pools keyed by tag and shape,
//!   intentionally leaked

mod block;
mod engine;
mod segregated;
mod shared;
mod singleton;

#[cfg(feature = "stats")]
mod stats;

pub use engine::{Pool, DEFAULT_NEXT_SIZE};
pub use segregated::SegregatedStorage;
pub use shared::SharedPool;
pub use singleton::{DefaultPoolTag, FastPoolTag, PoolTag, SingletonPool};

#[cfg(feature = "stats")]
pub use stats::PoolStats;
