//! Single-reservation boundary-tag allocator plus a physical-backing array
//! with lazy attach-on-alloc and conservative `flush`.

use crate::boundary_tag::BoundaryTagRegion;
use crate::error::VaAllocError;
use crate::os;
use crate::phys::{PhysicalMem, PhysicalMemManager};

pub const PHYSICAL_MEMORY_SIZE: u64 = 1 << 31; // 2 GiB
pub const PHYSICAL_BLOCK_SIZE: u64 = 32 * 1024 * 1024; // 32 MiB
pub const VA_RESERVATION_SIZE: u64 = 2 * PHYSICAL_MEMORY_SIZE;

const _: () = assert!(PHYSICAL_MEMORY_SIZE % PHYSICAL_BLOCK_SIZE == 0);

/// Range of physical-block-array slots `[low, high]` (inclusive) a block's
/// byte extent touches.
#[derive(Clone, Copy)]
struct BlockRange {
    low_idx: u64,
    high_idx: u64,
}

fn range_for(region_base: u64, start_addr: u64, size: u64) -> BlockRange {
    let low_idx = (start_addr - region_base) / PHYSICAL_BLOCK_SIZE;
    let high_idx = low_idx + (size - 1) / PHYSICAL_BLOCK_SIZE;
    BlockRange { low_idx, high_idx }
}

pub struct DefaultAllocator {
    region: BoundaryTagRegion<BlockRange>,
    physical_blocks: Vec<Option<Box<PhysicalMem>>>,
    phys_mgr: PhysicalMemManager,
    used_va_size: u64,
}

impl DefaultAllocator {
    pub fn new() -> Result<Self, VaAllocError> {
        let base = os::reserve_va(VA_RESERVATION_SIZE)?;
        let num_physical_blocks = (VA_RESERVATION_SIZE / PHYSICAL_BLOCK_SIZE) as usize;
        let initial_range = BlockRange { low_idx: 0, high_idx: num_physical_blocks as u64 - 1 };
        log::info!("default allocator: reserved {VA_RESERVATION_SIZE:#x} bytes of VA at {base:#x}");

        Ok(DefaultAllocator {
            region: BoundaryTagRegion::new(base, VA_RESERVATION_SIZE, initial_range),
            physical_blocks: (0..num_physical_blocks).map(|_| None).collect(),
            phys_mgr: PhysicalMemManager::new(PHYSICAL_MEMORY_SIZE),
            used_va_size: 0,
        })
    }

    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        let region_base = self.region.base;
        let best_fit = self.region.alloc(size, |allocated, new_tail| unsafe {
            let new_range = range_for(region_base, (*new_tail).start_addr, (*new_tail).size);
            (*new_tail).extra = new_range;
            (*allocated).extra = range_for(region_base, (*allocated).start_addr, (*allocated).size);
        })?;

        let (start_addr, range) = unsafe { ((*best_fit).start_addr, (*best_fit).extra) };
        self.used_va_size += size;

        for idx in range.low_idx..=range.high_idx {
            let slot = idx as usize;
            if self.physical_blocks[slot].is_none() {
                match self.phys_mgr.allocate(PHYSICAL_BLOCK_SIZE) {
                    Ok(mem) => self.physical_blocks[slot] = Some(mem),
                    Err(_) => {
                        // Roll back the VA-side allocation; any slots already
                        // attached in this loop stay attached (they're still
                        // valid backing for whatever free block absorbs this
                        // range next).
                        self.free(start_addr);
                        return None;
                    }
                }
            }
        }

        Some(start_addr)
    }

    pub fn free(&mut self, addr: u64) {
        let region_base = self.region.base;
        let freed = self.region.free(addr, |merged| unsafe {
            (*merged).extra = range_for(region_base, (*merged).start_addr, (*merged).size);
        });
        if let Some(size) = freed {
            self.used_va_size -= size;
        }
    }

    /// Release physical backing for every physical-block-array slot that is
    /// wholly contained within a free VA block: never releases a slot that a
    /// live allocation still partially claims.
    pub fn flush(&mut self) {
        let region_base = self.region.base;
        let mut reclaimed = 0u64;
        for block in self.region.iter() {
            unsafe {
                if !(*block).is_free {
                    continue;
                }
                let range: BlockRange = (*block).extra;
                let num_slots = range.high_idx - range.low_idx + 1;
                for i in 0..num_slots {
                    let slot = (range.low_idx + i) as usize;
                    if self.physical_blocks[slot].is_none() {
                        continue;
                    }
                    if i == 0 && ((*block).start_addr - region_base) % PHYSICAL_BLOCK_SIZE != 0 {
                        continue;
                    }
                    if i == num_slots - 1 && (*block).size % PHYSICAL_BLOCK_SIZE != 0 {
                        continue;
                    }
                    if let Some(mem) = self.physical_blocks[slot].take() {
                        self.phys_mgr.free(mem);
                        reclaimed += 1;
                    }
                }
            }
        }
        log::debug!("default allocator: flush reclaimed {reclaimed} physical blocks");
    }

    pub fn total_size(&self) -> u64 {
        self.region.region_size
    }

    pub fn used_size(&self) -> u64 {
        self.used_va_size
    }

    pub fn physical_mem_usage(&self) -> u64 {
        self.phys_mgr.usage()
    }

    pub fn print(&self, out: &mut dyn std::fmt::Write) -> std::fmt::Result {
        for block in self.region.iter() {
            unsafe {
                writeln!(out, "Block: start_addr: {}, size: {}, is_free: {}", (*block).start_addr, (*block).size, (*block).is_free)?;
            }
        }
        Ok(())
    }
}

impl Drop for DefaultAllocator {
    fn drop(&mut self) {
        os::release_va(self.region.base, self.region.region_size);
    }
}
