//! Pool statistics snapshots

/// Point-in-time view of a pool's footprint.
///
/// Produced by [`Pool::stats`](super::Pool::stats); counting walks both
/// intrusive lists, so taking a snapshot is O(blocks + free chunks).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Super-blocks currently held.
    pub blocks: usize,
    /// Total chunk slots across all super-blocks.
    pub capacity_chunks: usize,
    /// Chunks currently on the free list.
    pub free_chunks: usize,
    /// Actual chunk size in bytes.
    pub chunk_size: usize,
    /// Chunk count of the next growth request.
    pub next_size: usize,
    /// Initial growth size.
    pub start_size: usize,
    /// Growth cap (0 = uncapped).
    pub max_size: usize,
}

impl PoolStats {
    /// Chunks currently allocated out of the pool.
    #[inline]
    pub fn allocated_chunks(&self) -> usize {
        self.capacity_chunks - self.free_chunks
    }

    /// Total bytes held from the upstream for chunk storage.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.capacity_chunks * self.chunk_size
    }
}
