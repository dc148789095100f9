use thiserror::Error;

/// Recoverable failures internal to the allocator core. The public façade in
/// [`crate::Allocator`] flattens these to `None`/`0` sentinels at its boundary;
/// they are kept distinct here so unit tests can assert on the actual cause.
#[derive(Debug, Error)]
pub enum VaAllocError {
    #[error("OS virtual address reservation failed")]
    OsReservationFailed,

    #[error("physical memory pool exhausted: requested {requested} bytes, {available} available")]
    PhysicalPoolExhausted { requested: u64, available: u64 },
}
