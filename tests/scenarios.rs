use vaalloc::{Allocator, AllocatorKind};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// S1: fill a fresh default allocator completely, confirm it is full, then
/// drain it back to empty and confirm it can serve a fresh allocation again.
#[test]
fn s1_default_full_then_drain() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Default).unwrap();
    let total = a.total_size();

    let whole = a.alloc(total).expect("a pristine allocator should serve its entire span in one request");
    assert!(a.alloc(1).is_none(), "a fully allocated region must refuse any further request");
    assert_eq!(a.used_size(), total);

    a.free(whole);
    assert_eq!(a.used_size(), 0);
    let again = a.alloc(4096).expect("a fully drained allocator should serve a fresh request");
    a.free(again);
}

/// S2: allocate three adjacent blocks, free the two flanks, then free the
/// middle - the middle free should coalesce all three back into one block,
/// observable as the whole region becoming allocatable again in one request.
#[test]
fn s2_default_coalesce_restores_contiguity() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Default).unwrap();
    let chunk = 8 * 1024 * 1024;

    let x = a.alloc(chunk).unwrap();
    let y = a.alloc(chunk).unwrap();
    let z = a.alloc(chunk).unwrap();
    assert_eq!(a.used_size(), 3 * chunk);

    a.free(x);
    a.free(z);
    assert_eq!(a.used_size(), chunk);

    a.free(y);
    assert_eq!(a.used_size(), 0);

    // The freed span should now be contiguous enough to serve a request
    // larger than any single one of the three original chunks.
    let big = a.alloc(3 * chunk).expect("coalesced free space should satisfy a request spanning all three original chunks");
    a.free(big);
}

/// S3: churn many small, same-sized allocations through an arena allocator
/// (alloc/free interleaved) without ever running out of addresses, exercising
/// the slab arena's bit-recycling path.
#[test]
fn s3_arena_small_size_churn() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Arena).unwrap();
    let mut live = Vec::new();

    for round in 0..50 {
        let addr = a.alloc(64).unwrap();
        live.push(addr);
        if round % 2 == 0 {
            let freed = live.remove(0);
            a.free(freed);
        }
    }
    for addr in live {
        a.free(addr);
    }
}

/// S4: allocation sizes straddling every arena class boundary all succeed
/// and round-trip cleanly, whichever class they land in.
#[test]
fn s4_arena_boundary_sizes_round_trip() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Arena).unwrap();
    for &size in &[511u64, 512, 513, 2047, 2048, 2049, 4095, 4096, 4097] {
        let addr = a.alloc(size).unwrap_or_else(|| panic!("boundary size {size} should always be satisfiable"));
        a.free(addr);
    }
}

/// S5: a single large allocation routes to the top arena class (a
/// boundary-tag reservation sized like the default allocator's whole pool)
/// and round-trips correctly.
#[test]
fn s5_arena_large_allocation() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Arena).unwrap();
    let addr = a.alloc(64 * 1024 * 1024).unwrap();
    a.free(addr);
}

/// S6: the size-indexed free-block structure is exercised directly by the
/// radix tree's own stand-alone unit tests (`src/radix.rs`); here we exercise
/// it indirectly through many distinct free-block sizes in one default
/// allocator, confirming `alloc` keeps finding a best fit as the size
/// distribution of free blocks grows ragged.
#[test]
fn s6_many_distinct_free_sizes_still_find_best_fit() {
    init_logging();
    let mut a = Allocator::new(AllocatorKind::Default).unwrap();
    let block = 32 * 1024 * 1024;

    let mut addrs = Vec::new();
    for i in 1..=8u64 {
        addrs.push(a.alloc(i * block).unwrap());
    }
    // Free every other one, leaving a ragged set of distinct free sizes.
    for i in (0..addrs.len()).step_by(2) {
        a.free(addrs[i]);
    }

    // A request matching one of the now-free sizes should still succeed.
    let refit = a.alloc(2 * block).expect("a free block matching this size should still be findable");
    a.free(refit);

    for i in (1..addrs.len()).step_by(2) {
        a.free(addrs[i]);
    }
    assert_eq!(a.used_size(), 0);
}
