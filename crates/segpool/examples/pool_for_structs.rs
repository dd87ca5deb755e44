//! Typed facades: per-type singleton pools and shared instance pools.

use segpool::allocator::{PoolAllocator, SharedPoolAllocator, TypedAllocator};

#[derive(Debug)]
#[allow(dead_code)]
struct Particle {
    position: [f32; 3],
    velocity: [f32; 3],
    ttl: u32,
}

fn main() {
    // Process-wide pool keyed by the element type: every PoolAllocator
    // value for Particle is the same allocator.
    let particles = PoolAllocator::<Particle>::new();

    let batch = particles.allocate(256).expect("array allocation");
    println!("256 particles at {:p}", batch.as_ptr());
    // SAFETY: allocated just above with the same facade family and count.
    unsafe { particles.deallocate(batch, 256) };

    // An instance pool shared between facades; rebinding keeps the pool.
    let bytes = SharedPoolAllocator::<u8>::with_sizes(64, 0);
    let words: SharedPoolAllocator<u64> = bytes.rebind();

    let word_block = words.allocate(16).expect("rebound allocation");
    println!(
        "16 u64s from the byte pool: {:p} (same pool: {})",
        word_block.as_ptr(),
        bytes.pool().is_from(word_block.as_ptr().cast()),
    );
    // SAFETY: allocated just above through the same pool.
    unsafe { words.deallocate(word_block, 16) };

    println!("reclaimed: {}", bytes.pool().release_memory());
}
