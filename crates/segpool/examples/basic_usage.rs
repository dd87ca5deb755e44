//! Basic pool usage: the engine, growth observers, and reclamation.

use segpool::pool::Pool;

fn main() {
    // A pool of 48-byte chunks: the first super-block holds 4 chunks,
    // each later one twice as many.
    let mut pool: Pool = Pool::with_sizes(48, 4, 0);

    println!(
        "chunk size {} bytes, next growth {} chunks",
        pool.chunk_size(),
        pool.next_size()
    );

    let mut chunks = Vec::new();
    for _ in 0..10 {
        chunks.push(pool.ordered_allocate().expect("allocation"));
    }

    let stats = pool.stats();
    println!(
        "after 10 allocations: {} super-blocks, {} of {} chunks free",
        stats.blocks, stats.free_chunks, stats.capacity_chunks
    );

    // Everything back, in the ordered discipline so reclamation works.
    for chunk in chunks {
        // SAFETY: each chunk came from this pool, exactly once.
        unsafe { pool.ordered_deallocate(chunk) };
    }

    let released = pool.release_memory();
    println!(
        "release_memory -> {released}; {} super-blocks remain",
        pool.stats().blocks
    );
}
