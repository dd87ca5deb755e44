//! Cross-thread tests for the shared and singleton pools

use std::collections::HashSet;
use std::thread;

use segpool::allocator::{PoolAllocator, TypedAllocator};
use segpool::pool::{PoolTag, SharedPool, SingletonPool};

#[test]
fn shared_pool_survives_contention() {
    let pool = SharedPool::new(64);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let pool = pool.clone();
            thread::spawn(move || {
                for round in 0..50 {
                    let mut chunks = Vec::new();
                    for _ in 0..8 {
                        let chunk = pool.allocate().unwrap();
                        unsafe { std::ptr::write_bytes(chunk.as_ptr(), worker as u8, 64) };
                        chunks.push(chunk);
                    }

                    for chunk in &chunks {
                        assert!(pool.is_from(chunk.as_ptr()));
                        // Our pattern survived the other threads.
                        assert_eq!(unsafe { *chunk.as_ptr() }, worker as u8);
                    }

                    for chunk in chunks {
                        unsafe { pool.deallocate(chunk) };
                    }

                    if round % 10 == 0 {
                        // Exercise the observers under contention too.
                        let _ = pool.next_size();
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn no_chunk_is_handed_out_twice() {
    let pool = SharedPool::<segpool::allocator::SystemAllocator>::with_sizes(32, 4, 0);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = pool.clone();
            thread::spawn(move || {
                let mut seen = Vec::new();
                for _ in 0..64 {
                    seen.push(pool.allocate().unwrap().as_ptr() as usize);
                }
                (pool, seen)
            })
        })
        .collect();

    let mut all = Vec::new();
    let mut pools = Vec::new();
    for handle in handles {
        let (pool, seen) = handle.join().unwrap();
        all.extend(seen);
        pools.push(pool);
    }

    // Live chunks are exclusive: no address can appear twice.
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len());

    for addr in all {
        unsafe { pools[0].deallocate(std::ptr::NonNull::new(addr as *mut u8).unwrap()) };
    }
}

#[test]
fn singleton_initialises_once_across_threads() {
    struct TagRace;
    impl PoolTag for TagRace {}

    // All threads race to the same key; the registry must hand every one
    // of them the same pool.
    let handles: Vec<_> = (0..8)
        .map(|_| {
            thread::spawn(|| {
                let pool = SingletonPool::<TagRace>::new(48);
                let chunk = pool.allocate().unwrap();
                assert!(pool.is_from(chunk.as_ptr()));
                chunk.as_ptr() as usize
            })
        })
        .collect();

    let addrs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Every chunk is live and distinct, and they all belong to the one
    // singleton.
    let unique: HashSet<_> = addrs.iter().copied().collect();
    assert_eq!(unique.len(), addrs.len());

    let pool = SingletonPool::<TagRace>::new(48);
    for addr in addrs {
        assert!(pool.is_from(addr as *const u8));
        unsafe { pool.deallocate(std::ptr::NonNull::new(addr as *mut u8).unwrap()) };
    }
}

#[test]
fn stateless_facades_cross_threads() {
    struct TagFacade;
    impl PoolTag for TagFacade {}

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            thread::spawn(move || {
                let alloc = PoolAllocator::<u64, TagFacade>::new();
                for _ in 0..100 {
                    let ptr = alloc.allocate(3).unwrap();
                    unsafe {
                        for i in 0..3 {
                            ptr.as_ptr().add(i).write(worker as u64);
                        }
                        for i in 0..3 {
                            assert_eq!(*ptr.as_ptr().add(i), worker as u64);
                        }
                        alloc.deallocate(ptr, 3);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}
