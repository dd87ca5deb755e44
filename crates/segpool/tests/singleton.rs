//! Integration tests for process-wide singleton pools
//!
//! Each test uses its own tag type: tags partition the singleton space,
//! so tests stay isolated even though the registry is process-global.

use segpool::pool::{PoolTag, SingletonPool};

#[test]
fn same_key_reaches_the_same_pool() {
    struct TagA;
    impl PoolTag for TagA {}

    let handle_a = SingletonPool::<TagA>::new(24);
    let handle_b = SingletonPool::<TagA>::new(24);
    assert_eq!(handle_a, handle_b);

    let chunk = handle_a.allocate().unwrap();
    // The other handle sees the same pool.
    assert!(handle_b.is_from(chunk.as_ptr()));

    // Free through one handle, reallocate through the other: the
    // unordered free list hands the chunk straight back.
    unsafe { handle_b.deallocate(chunk) };
    let again = handle_b.allocate().unwrap();
    assert_eq!(chunk, again);

    unsafe { handle_a.deallocate(again) };
}

#[test]
fn different_tags_are_disjoint_pools() {
    struct TagLeft;
    impl PoolTag for TagLeft {}
    struct TagRight;
    impl PoolTag for TagRight {}

    let left = SingletonPool::<TagLeft>::new(32);
    let right = SingletonPool::<TagRight>::new(32);

    let chunk = left.allocate().unwrap();
    assert!(left.is_from(chunk.as_ptr()));
    assert!(!right.is_from(chunk.as_ptr()));

    unsafe { left.deallocate(chunk) };
}

#[test]
fn different_shapes_are_different_pools() {
    struct TagShape;
    impl PoolTag for TagShape {}

    let small = SingletonPool::<TagShape>::new(8);
    let large = SingletonPool::<TagShape>::new(128);

    let from_small = small.allocate().unwrap();
    assert!(!large.is_from(from_small.as_ptr()));

    unsafe { small.deallocate(from_small) };
}

#[test]
fn singleton_honours_growth_schedule() {
    struct TagSchedule;
    impl PoolTag for TagSchedule {}

    let pool = SingletonPool::<TagSchedule>::with_sizes(8, 4, 0);
    assert_eq!(pool.start_size(), 4);

    let chunks: Vec<_> = (0..5).map(|_| pool.ordered_allocate().unwrap()).collect();
    // Two growths happened: 4 chunks, then 8.
    assert_eq!(pool.stats().capacity_chunks, 12);
    assert_eq!(pool.next_size(), 16);

    for chunk in chunks {
        unsafe { pool.ordered_deallocate(chunk) };
    }

    assert!(pool.release_memory());
    assert_eq!(pool.next_size(), 4);
    // The pool object itself survives; it just holds no memory.
    assert_eq!(pool.stats().blocks, 0);
    assert!(pool.allocate().is_ok());
}

#[test]
fn purge_empties_but_keeps_the_singleton() {
    struct TagPurge;
    impl PoolTag for TagPurge {}

    let pool = SingletonPool::<TagPurge>::new(16);
    let _ = pool.allocate().unwrap();

    assert!(pool.purge_memory());
    assert_eq!(pool.stats().blocks, 0);
    assert!(!pool.purge_memory());

    // Still usable afterwards.
    let chunk = pool.allocate().unwrap();
    unsafe { pool.deallocate(chunk) };
}

#[test]
fn contiguous_allocation_through_the_singleton() {
    struct TagRuns;
    impl PoolTag for TagRuns {}

    let pool = SingletonPool::<TagRuns>::with_sizes(8, 8, 0);
    let chunk_size = pool.chunk_size();

    let run = pool.ordered_allocate_contiguous(4).unwrap();
    // The run is one contiguous span of this pool's chunks.
    for i in 0..4 {
        assert!(pool.is_from(unsafe { run.as_ptr().add(i * chunk_size) }));
    }

    unsafe { pool.ordered_deallocate_contiguous(run, 4) };
    assert!(pool.release_memory());
}

#[test]
fn handles_are_copy_and_send() {
    struct TagMarkers;
    impl PoolTag for TagMarkers {}

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}
    fn assert_copy<T: Copy>() {}

    assert_send::<SingletonPool<TagMarkers>>();
    assert_sync::<SingletonPool<TagMarkers>>();
    assert_copy::<SingletonPool<TagMarkers>>();
}
