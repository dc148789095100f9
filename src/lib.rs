//!
//! Virtual-address-space allocator backed by a bounded physical memory pool.
//!
//! [`Allocator`] exposes one small operation set - `alloc`/`free`/`flush`/
//! size and usage queries/`print` - over two interchangeable strategies:
//!
//! * [`AllocatorKind::Default`]: one boundary-tag region spanning twice the
//!   physical pool's size, with physical backing attached lazily per
//!   allocation and reclaimed only by an explicit [`Allocator::flush`].
//! * [`AllocatorKind::Arena`]: allocations are binned into 8 fixed size
//!   classes, each served by a slab or boundary-tag reservation created on
//!   demand.
//!
//! Single-threaded and non-reentrant: nothing here is `Send` or `Sync`, and
//! there is no internal locking. Resources are released on `Drop`; there is
//! no explicit `destroy`.

mod arena;
mod avl;
mod bitvector;
mod boundary_tag;
mod default_allocator;
mod error;
mod os;
mod phys;
mod radix;
mod slab;

pub use error::VaAllocError;

use arena::ArenaAllocator;
use default_allocator::DefaultAllocator;

/// Selects which allocation strategy [`Allocator::new`] builds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorKind {
    Default,
    Arena,
}

enum Inner {
    Default(DefaultAllocator),
    Arena(ArenaAllocator),
}

/// A virtual-address-space allocator. Not `Send`/`Sync`: all operations take
/// `&mut self` and are expected to run on a single thread with no concurrent
/// access, matching the non-reentrant contract this crate implements.
pub struct Allocator {
    inner: Inner,
}

impl Allocator {
    pub fn new(kind: AllocatorKind) -> Result<Self, VaAllocError> {
        let inner = match kind {
            AllocatorKind::Default => Inner::Default(DefaultAllocator::new()?),
            AllocatorKind::Arena => Inner::Arena(ArenaAllocator::new()),
        };
        log::info!("allocator initialized: {kind:?}");
        Ok(Allocator { inner })
    }

    /// Allocate `size` bytes of virtual address space, returning the base
    /// address, or `None` if the request cannot be satisfied (`size == 0`
    /// always fails).
    pub fn alloc(&mut self, size: u64) -> Option<u64> {
        match &mut self.inner {
            Inner::Default(a) => a.alloc(size),
            Inner::Arena(a) => a.alloc(size),
        }
    }

    /// Free a previously returned address. Freeing an address this
    /// allocator did not return is a contract violation.
    pub fn free(&mut self, addr: u64) {
        match &mut self.inner {
            Inner::Default(a) => a.free(addr),
            Inner::Arena(a) => a.free(addr),
        }
    }

    /// Release physical backing for any free VA that can be reclaimed.
    /// Only [`AllocatorKind::Default`] holds reclaimable physical backing;
    /// arena allocations have none to flush.
    pub fn flush(&mut self) {
        if let Inner::Default(a) = &mut self.inner {
            a.flush();
        }
    }

    pub fn total_size(&self) -> u64 {
        match &self.inner {
            Inner::Default(a) => a.total_size(),
            Inner::Arena(a) => a.total_size(),
        }
    }

    pub fn used_size(&self) -> u64 {
        match &self.inner {
            Inner::Default(a) => a.used_size(),
            Inner::Arena(a) => a.used_size(),
        }
    }

    pub fn physical_mem_usage(&self) -> u64 {
        match &self.inner {
            Inner::Default(a) => a.physical_mem_usage(),
            Inner::Arena(a) => a.physical_mem_usage(),
        }
    }

    pub fn print(&self, out: &mut dyn std::fmt::Write) -> std::fmt::Result {
        match &self.inner {
            Inner::Default(a) => a.print(out),
            Inner::Arena(a) => a.print(out),
        }
    }
}
