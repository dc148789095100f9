//! Bins allocation requests by size into 8 arena classes; each class holds a
//! list of reservations, each reservation backed by either a slab (small
//! classes) or a private boundary-tag region (large classes). `free` routes
//! through an address tracker so the caller never has to name which
//! reservation an address came from.

use crate::avl::{AddrTracker, AvlNode};
use crate::boundary_tag::BoundaryTagRegion;
use crate::error::VaAllocError;
use crate::os;
use crate::slab::SlabAllocator;
use std::ptr;

pub const NUM_ARENAS: usize = 8;

#[derive(Clone, Copy)]
pub struct ArenaInfo {
    pub max_per_alloc_size: u64,
    pub reservation_size: u64,
}

/// `<= max_per_alloc_size` bytes route to this arena's `reservation_size`
/// reservations. The last row's `max_per_alloc_size` is `u64::MAX`: every
/// request that doesn't fit a smaller class falls through to it.
pub const ARENA_INFO_TABLE: [ArenaInfo; NUM_ARENAS] = [
    ArenaInfo { max_per_alloc_size: 512, reservation_size: 2 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 1024, reservation_size: 2 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 2048, reservation_size: 4 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 4096, reservation_size: 8 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 64 * 1024, reservation_size: 32 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 2 * 1024 * 1024, reservation_size: 64 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: 32 * 1024 * 1024, reservation_size: 512 * 1024 * 1024 },
    ArenaInfo { max_per_alloc_size: u64::MAX, reservation_size: crate::default_allocator::PHYSICAL_MEMORY_SIZE },
];

fn is_arena_idx_slab(idx: usize) -> bool {
    idx < 3
}

fn arena_idx_for_size(size: u64) -> usize {
    ARENA_INFO_TABLE
        .iter()
        .position(|info| info.max_per_alloc_size >= size)
        .expect("no arena large enough for this request; arena table's top row should always match")
}

enum Strategy {
    Slab(SlabAllocator),
    Tag(BoundaryTagRegion<()>),
}

/// One reservation within an arena class. Reservations are singly linked
/// (newest first) since, unlike `boundary_tag::Block`, they're never removed
/// mid-list - there is no reservation-reclamation path, only a walk
/// front-to-back looking for spare capacity.
struct Reservation {
    next: *mut Reservation,
    addr: u64,
    size: u64,
    strategy: Strategy,
    /// Embedded so the address tracker can hold a back-pointer to this
    /// reservation without a second heap allocation; `node.owner()` recovers
    /// the enclosing `Reservation` once this is boxed at a stable address.
    node: AvlNode,
}

impl Reservation {
    fn new_boxed(addr: u64, size: u64, strategy: Strategy) -> *mut Reservation {
        let reservation =
            Box::new(Reservation { next: ptr::null_mut(), addr, size, strategy, node: AvlNode::new::<Reservation>(ptr::null_mut()) });
        let raw = Box::into_raw(reservation);
        unsafe {
            (*raw).node = AvlNode::new(raw);
        }
        raw
    }

    fn alloc(&mut self, size: u64) -> Option<u64> {
        match &mut self.strategy {
            Strategy::Slab(sa) => sa.alloc(),
            Strategy::Tag(region) => region.alloc(size, |_, _| {}).map(|b| unsafe { (*b).start_addr }),
        }
    }

    fn free(&mut self, addr: u64) {
        match &mut self.strategy {
            Strategy::Slab(sa) => sa.free(addr),
            Strategy::Tag(region) => {
                region.free(addr, |_| {});
            }
        }
    }
}

struct Arena {
    info: ArenaInfo,
    is_slab: bool,
    reservation_head: *mut Reservation,
}

pub struct ArenaAllocator {
    arenas: Vec<Arena>,
    res_tracker: AddrTracker,
}

impl ArenaAllocator {
    pub fn new() -> Self {
        let arenas = ARENA_INFO_TABLE
            .iter()
            .enumerate()
            .map(|(idx, &info)| Arena { info, is_slab: is_arena_idx_slab(idx), reservation_head: ptr::null_mut() })
            .collect();
        // An address-space-wide upper bound, not this allocator's own footprint.
        ArenaAllocator { arenas, res_tracker: AddrTracker::new(0, 1u64 << 57) }
    }

    fn create_reservation(&mut self, arena_idx: usize) -> Result<*mut Reservation, VaAllocError> {
        let info = self.arenas[arena_idx].info;
        let addr = os::reserve_va(info.reservation_size)?;
        let strategy = if self.arenas[arena_idx].is_slab {
            Strategy::Slab(SlabAllocator::new(addr, info.max_per_alloc_size, info.reservation_size))
        } else {
            Strategy::Tag(BoundaryTagRegion::new(addr, info.reservation_size, ()))
        };

        let reservation = Reservation::new_boxed(addr, info.reservation_size, strategy);
        let node_ptr: *mut AvlNode = unsafe { &mut (*reservation).node };
        if self.res_tracker.register_or_existing(node_ptr, addr, info.reservation_size).is_some() {
            unreachable!("freshly reserved VA range collided with an existing reservation");
        }
        log::debug!("arena[{arena_idx}]: created reservation of {} bytes at {addr:#x}", info.reservation_size);

        let arena = &mut self.arenas[arena_idx];
        unsafe { (*reservation).next = arena.reservation_head };
        arena.reservation_head = reservation;
        Ok(reservation)
    }

    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        let idx = arena_idx_for_size(size);

        let mut cur = self.arenas[idx].reservation_head;
        while !cur.is_null() {
            if let Some(addr) = unsafe { (*cur).alloc(size) } {
                return Some(addr);
            }
            cur = unsafe { (*cur).next };
        }

        let fresh = self.create_reservation(idx).ok()?;
        unsafe { (*fresh).alloc(size) }
    }

    pub fn free(&mut self, addr: u64) {
        let node = self.res_tracker.find_node(addr).expect("free() called with an address this allocator never returned");
        let reservation: *mut Reservation = unsafe { (*node).owner() };
        unsafe { (*reservation).free(addr) };
    }

    /// No per-arena byte accounting is kept, so these always read zero;
    /// reservations are sized in fixed classes rather than tracked as a
    /// single running total.
    pub fn total_size(&self) -> u64 {
        0
    }

    pub fn used_size(&self) -> u64 {
        0
    }

    pub fn physical_mem_usage(&self) -> u64 {
        0
    }

    pub fn print(&self, _out: &mut dyn std::fmt::Write) -> std::fmt::Result {
        Ok(())
    }
}

impl Drop for ArenaAllocator {
    fn drop(&mut self) {
        for arena in &mut self.arenas {
            let mut cur = arena.reservation_head;
            while !cur.is_null() {
                unsafe {
                    let next = (*cur).next;
                    os::release_va((*cur).addr, (*cur).size);
                    drop(Box::from_raw(cur));
                    cur = next;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_allocations_route_to_slab_arena() {
        let mut a = ArenaAllocator::new();
        let x = a.alloc(64).unwrap();
        let y = a.alloc(128).unwrap();
        assert_ne!(x, y);
        a.free(x);
        a.free(y);
    }

    #[test]
    fn large_allocation_routes_to_tag_arena() {
        let mut a = ArenaAllocator::new();
        let x = a.alloc(40 * 1024 * 1024).unwrap();
        a.free(x);
    }

    #[test]
    fn boundary_sizes_pick_expected_arena() {
        assert_eq!(arena_idx_for_size(511), 0);
        assert_eq!(arena_idx_for_size(512), 0);
        assert_eq!(arena_idx_for_size(513), 1);
        assert_eq!(arena_idx_for_size(2047), 2);
        assert_eq!(arena_idx_for_size(2048), 2);
        assert_eq!(arena_idx_for_size(2049), 3);
        assert_eq!(arena_idx_for_size(4095), 3);
        assert_eq!(arena_idx_for_size(4096), 3);
        assert_eq!(arena_idx_for_size(4097), 4);
    }

    #[test]
    fn slab_exhaustion_forces_new_reservation() {
        let mut a = ArenaAllocator::new();
        let per_slab = (2 * 1024 * 1024) / 512;
        let mut addrs = Vec::new();
        for _ in 0..per_slab {
            addrs.push(a.alloc(500).unwrap());
        }
        let overflow = a.alloc(500).unwrap();
        assert!(!addrs.contains(&overflow));
    }
}
