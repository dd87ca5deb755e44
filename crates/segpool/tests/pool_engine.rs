//! Integration tests for the pool engine

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;
use std::rc::Rc;

use segpool::allocator::{RawAllocator, SystemAllocator};
use segpool::pool::Pool;
use segpool::utils::chunk_align;
use segpool::AllocResult;

/// Upstream that counts block traffic.
#[derive(Clone, Default)]
struct CountingAllocator {
    allocs: Rc<Cell<usize>>,
    deallocs: Rc<Cell<usize>>,
}

unsafe impl RawAllocator for CountingAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        self.allocs.set(self.allocs.get() + 1);
        unsafe { SystemAllocator.allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        self.deallocs.set(self.deallocs.get() + 1);
        unsafe { SystemAllocator.deallocate(ptr, layout) }
    }
}

/// Upstream that fails the first `failures` requests, then delegates.
#[derive(Clone, Default)]
struct FlakyAllocator {
    failures: Rc<Cell<usize>>,
}

unsafe impl RawAllocator for FlakyAllocator {
    unsafe fn allocate(&self, layout: Layout) -> AllocResult<NonNull<[u8]>> {
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(segpool::AllocError::exhausted(layout));
        }
        unsafe { SystemAllocator.allocate(layout) }
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { SystemAllocator.deallocate(ptr, layout) }
    }
}

#[test]
fn growth_follows_doubling_schedule() {
    // R=8, NextSize=4, MaxSize=0: four chunks per first block, then 8.
    let mut pool: Pool = Pool::with_sizes(8, 4, 0);
    assert_eq!(pool.chunk_size(), segpool::utils::chunk_size(8));

    let mut chunks = Vec::new();
    for _ in 0..4 {
        chunks.push(pool.allocate().unwrap());
    }

    // First four all come from one 4-chunk super-block.
    let stats = pool.stats();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.capacity_chunks, 4);
    assert_eq!(stats.free_chunks, 0);
    assert_eq!(pool.next_size(), 8);

    // The fifth allocation triggers growth; the new block has 8 chunks.
    chunks.push(pool.allocate().unwrap());
    let stats = pool.stats();
    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.capacity_chunks, 12);
    assert_eq!(stats.free_chunks, 7);
    assert_eq!(pool.next_size(), 16);

    for chunk in &chunks {
        assert!(pool.is_from(chunk.as_ptr()));
        assert_eq!(chunk.as_ptr() as usize % chunk_align(), 0);
    }

    for chunk in chunks {
        unsafe { pool.deallocate(chunk) };
    }
}

#[test]
fn release_memory_reclaims_fully_free_blocks() {
    // R=16, NextSize=2: four ordered allocations force two super-blocks.
    let upstream = CountingAllocator::default();
    let mut pool = Pool::with_upstream(16, 2, 0, upstream.clone());

    let chunks: Vec<_> = (0..4).map(|_| pool.ordered_allocate().unwrap()).collect();
    assert_eq!(upstream.allocs.get(), 2);
    assert_eq!(pool.stats().blocks, 2);

    for chunk in chunks {
        unsafe { pool.ordered_deallocate(chunk) };
    }

    assert!(pool.release_memory());
    assert_eq!(upstream.deallocs.get(), 2);
    assert_eq!(pool.stats().blocks, 0);
    assert_eq!(pool.next_size(), 2);

    // Nothing left to release.
    assert!(!pool.release_memory());
}

#[test]
fn release_memory_spares_blocks_with_live_chunks() {
    let upstream = CountingAllocator::default();
    let mut pool = Pool::with_upstream(8, 4, 0, upstream.clone());

    let chunks: Vec<_> = (0..4).map(|_| pool.ordered_allocate().unwrap()).collect();

    // Keep the first chunk live, free the rest.
    for chunk in &chunks[1..] {
        unsafe { pool.ordered_deallocate(*chunk) };
    }

    assert!(!pool.release_memory());
    assert_eq!(upstream.deallocs.get(), 0);
    assert_eq!(pool.stats().blocks, 1);
    // The live chunk's block must survive the walk intact.
    assert!(pool.is_from(chunks[0].as_ptr()));

    unsafe { pool.ordered_deallocate(chunks[0]) };
    assert!(pool.release_memory());
    assert_eq!(upstream.deallocs.get(), 1);
}

#[test]
fn contiguous_allocation_reuses_freed_runs() {
    // R=4, NextSize=4, capped so the schedule stays at 4 chunks.
    let chunk = segpool::utils::chunk_size(4);
    let max_size = 4 * chunk / 4; // cap = max_size * R / P = 4 chunks
    let mut pool: Pool = Pool::with_sizes(4, 4, max_size);

    let chunks: Vec<_> = (0..4).map(|_| pool.ordered_allocate().unwrap()).collect();
    assert_eq!(pool.stats().blocks, 1);

    // Free the middle two, in order.
    unsafe {
        pool.ordered_deallocate(chunks[1]);
        pool.ordered_deallocate(chunks[2]);
    }

    // A 2-chunk run exists and starts at the first freed chunk.
    let run = pool.ordered_allocate_contiguous(2).unwrap();
    assert_eq!(run, chunks[1]);
    assert_eq!(pool.stats().free_chunks, 0);

    // No 3-chunk run: a fresh 4-chunk super-block is split, the first
    // three chunks returned and the remainder donated to the free list.
    let run3 = pool.ordered_allocate_contiguous(3).unwrap();
    let stats = pool.stats();
    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.capacity_chunks, 8);
    assert_eq!(stats.free_chunks, 1);
    assert!(pool.is_from(run3.as_ptr()));
    assert!(pool.is_from(unsafe { run3.as_ptr().add(2 * chunk) }));

    unsafe {
        pool.ordered_deallocate_contiguous(run3, 3);
        pool.ordered_deallocate_contiguous(run, 2);
        pool.ordered_deallocate(chunks[0]);
        pool.ordered_deallocate(chunks[3]);
    }
    assert!(pool.release_memory());
}

#[test]
fn next_size_respects_cap() {
    // R=8, NextSize=4, MaxSize=16: next_size never exceeds 16 chunks.
    let mut pool: Pool = Pool::with_sizes(8, 4, 16);
    let cap = 16 * 8 / pool.chunk_size();

    let mut chunks = Vec::new();
    for _ in 0..200 {
        chunks.push(pool.allocate().unwrap());
        assert!(pool.next_size() <= cap);
    }

    for chunk in chunks {
        unsafe { pool.deallocate(chunk) };
    }
}

#[test]
fn growth_backtracks_once_on_upstream_failure() {
    // Upstream fails the first request; a 32-chunk growth halves to 16
    // and succeeds.
    let upstream = FlakyAllocator::default();
    upstream.failures.set(1);
    let mut pool = Pool::with_upstream(8, 32, 0, upstream);

    let chunk = pool.allocate().unwrap();
    let stats = pool.stats();
    assert_eq!(stats.blocks, 1);
    assert_eq!(stats.capacity_chunks, 16);
    // The halved size doubled after the successful growth.
    assert_eq!(pool.next_size(), 32);

    unsafe { pool.deallocate(chunk) };
}

#[test]
fn exhausted_upstream_surfaces_out_of_memory() {
    let upstream = FlakyAllocator::default();
    upstream.failures.set(2); // both the request and its backtrack fail
    let mut pool = Pool::with_upstream(8, 32, 0, upstream);

    let err = pool.allocate().unwrap_err();
    assert!(err.is_out_of_memory());
    // The failed growth installed nothing.
    let stats = pool.stats();
    assert_eq!(stats.blocks, 0);
    assert_eq!(stats.free_chunks, 0);

    // The upstream recovered; the pool must too.
    assert!(pool.allocate().is_ok());
}

#[test]
fn ordered_discipline_keeps_pop_order_ascending() {
    let mut pool: Pool = Pool::with_sizes(8, 8, 0);

    let chunks: Vec<_> = (0..8).map(|_| pool.ordered_allocate().unwrap()).collect();

    // Return everything through the ordered path, deliberately shuffled.
    for &i in &[5usize, 0, 7, 2, 6, 1, 4, 3] {
        unsafe { pool.ordered_deallocate(chunks[i]) };
    }

    // An ordered free list pops strictly ascending addresses.
    let mut last = 0usize;
    for _ in 0..8 {
        let p = pool.ordered_allocate().unwrap().as_ptr() as usize;
        assert!(p > last);
        last = p;
    }
}

#[test]
fn round_trip_restores_free_list() {
    let mut pool: Pool = Pool::with_sizes(32, 4, 0);

    let first = pool.ordered_allocate().unwrap();
    let before = pool.stats();
    unsafe { pool.ordered_deallocate(first) };

    let again = pool.ordered_allocate().unwrap();
    assert_eq!(first, again, "ordered round-trip must restore the head");
    assert_eq!(pool.stats(), before);

    unsafe { pool.ordered_deallocate(again) };
}

#[test]
fn purge_memory_is_idempotent() {
    let upstream = CountingAllocator::default();
    let mut pool = Pool::with_upstream(8, 4, 0, upstream.clone());

    let _ = pool.allocate().unwrap();
    let _ = pool.allocate().unwrap();

    assert!(pool.purge_memory());
    assert_eq!(pool.stats().blocks, 0);
    assert_eq!(pool.stats().free_chunks, 0);
    assert_eq!(pool.next_size(), pool.start_size());
    assert_eq!(upstream.allocs.get(), upstream.deallocs.get());

    // Purging an empty pool is a no-op.
    assert!(!pool.purge_memory());
}

#[test]
fn drop_returns_every_block() {
    let upstream = CountingAllocator::default();
    {
        let mut pool = Pool::with_upstream(64, 2, 0, upstream.clone());
        for _ in 0..10 {
            let _ = pool.allocate().unwrap();
        }
        assert!(upstream.allocs.get() > 1);
    }
    assert_eq!(upstream.allocs.get(), upstream.deallocs.get());
}

#[test]
fn is_from_rejects_foreign_pointers() {
    let mut pool: Pool = Pool::with_sizes(8, 4, 0);
    let mut other: Pool = Pool::with_sizes(8, 4, 0);

    let ours = pool.allocate().unwrap();
    let theirs = other.allocate().unwrap();
    let stack_byte = 0u8;

    assert!(pool.is_from(ours.as_ptr()));
    assert!(!pool.is_from(theirs.as_ptr()));
    assert!(!pool.is_from(&stack_byte as *const u8));

    unsafe {
        pool.deallocate(ours);
        other.deallocate(theirs);
    }
}

#[test]
fn zero_chunk_contiguous_request_fails() {
    let mut pool: Pool = Pool::with_sizes(8, 4, 0);
    assert!(pool.ordered_allocate_contiguous(0).is_err());
}

#[test]
fn next_size_floor_is_one() {
    let mut pool: Pool = Pool::with_sizes(8, 0, 0);
    assert_eq!(pool.start_size(), 1);
    let chunk = pool.allocate().unwrap();
    assert_eq!(pool.stats().capacity_chunks, 1);
    unsafe { pool.deallocate(chunk) };
}

#[test]
fn writes_to_chunks_do_not_corrupt_neighbours() {
    let mut pool: Pool = Pool::new(64);

    let chunks: Vec<_> = (0..16).map(|_| pool.allocate().unwrap()).collect();
    for (i, chunk) in chunks.iter().enumerate() {
        unsafe { std::ptr::write_bytes(chunk.as_ptr(), i as u8, 64) };
    }
    for (i, chunk) in chunks.iter().enumerate() {
        unsafe {
            assert_eq!(*chunk.as_ptr(), i as u8);
            assert_eq!(*chunk.as_ptr().add(63), i as u8);
        }
    }
    for chunk in chunks {
        unsafe { pool.deallocate(chunk) };
    }
}
