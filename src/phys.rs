//! Bounded pool of opaque physical memory handles: a capped `total_size` and
//! a running `used_size` counter. The sole owner of each handle is whichever
//! slot holds its `Box<PhysicalMem>` (the default allocator's physical-block
//! array); there is no second manager-owned list duplicating that ownership
//! (see DESIGN.md). No real page mapping happens here; a handle is just a
//! `PROT_NONE` VA reservation standing in for a physical page range.

use crate::error::VaAllocError;
use crate::os;

pub struct PhysicalMem {
    base: u64,
    size: u64,
}

pub struct PhysicalMemManager {
    total_size: u64,
    used_size: u64,
}

impl PhysicalMemManager {
    pub fn new(total_size: u64) -> Self {
        PhysicalMemManager { total_size, used_size: 0 }
    }

    /// Reserve `size` bytes of physical quota, backed by a real (but
    /// `PROT_NONE`) VA reservation so the handle's address is unique.
    pub fn allocate(&mut self, size: u64) -> Result<Box<PhysicalMem>, VaAllocError> {
        if self.used_size + size > self.total_size {
            log::warn!(
                "physical memory pool exhausted: requested {size}, {} of {} already used",
                self.used_size,
                self.total_size
            );
            return Err(VaAllocError::PhysicalPoolExhausted { requested: size, available: self.total_size - self.used_size });
        }

        let base = os::reserve_va(size)?;
        self.used_size += size;
        log::trace!("physical_mem: reserved {size} bytes at {base:#x}");
        Ok(Box::new(PhysicalMem { base, size }))
    }

    /// Release a handle back to the pool, shrinking `used_size` and
    /// releasing its VA reservation.
    pub fn free(&mut self, mem: Box<PhysicalMem>) {
        debug_assert!(self.used_size >= mem.size);
        self.used_size -= mem.size;
        log::trace!("physical_mem: released {} bytes at {:#x}", mem.size, mem.base);
        drop(mem);
    }

    pub fn usage(&self) -> u64 {
        self.used_size
    }

    pub fn total(&self) -> u64 {
        self.total_size
    }
}

impl Drop for PhysicalMem {
    fn drop(&mut self) {
        os::release_va(self.base, self.size);
    }
}
