//! The one OS collaborator this crate needs: reserve and release a range of
//! virtual address space without backing it with any physical page, via
//! `libc::mmap`/`munmap` with `PROT_NONE` and `MAP_NORESERVE`.

use crate::error::VaAllocError;

/// Reserve `size` bytes of VA space. Returns the base address on success.
///
/// The mapping is `PROT_NONE` and `MAP_NORESERVE`: no byte of it is ever
/// read, written, or counted against the OS's overcommit accounting by this
/// crate. `size` must be a non-zero multiple of the page size; callers in
/// this crate only ever reserve multi-megabyte regions, so that constraint
/// always holds in practice.
pub fn reserve_va(size: u64) -> Result<u64, VaAllocError> {
    debug_assert!(size > 0);
    // SAFETY: requests an anonymous, unbacked, non-reserved mapping. No
    // memory is read or written through the returned pointer by this crate.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size as libc::size_t,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
            -1,
            0,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(VaAllocError::OsReservationFailed);
    }
    let base = ptr as u64;
    debug_assert_ne!(base, 0);
    Ok(base)
}

/// Release a range previously returned by [`reserve_va`] with the same size.
pub fn release_va(base: u64, size: u64) {
    if base == 0 || size == 0 {
        return;
    }
    // SAFETY: `base`/`size` are the exact pair returned by a prior
    // `reserve_va` call; the mapping is never partially released.
    let rc = unsafe { libc::munmap(base as *mut libc::c_void, size as libc::size_t) };
    debug_assert_eq!(rc, 0, "munmap failed for a reservation this crate owns");
}
