/// Errors raised by the aligned sub-allocator (§4.A) and the BFC pool (§4.B).
#[derive(Debug, thiserror::Error)]
pub enum AllocError {
    /// The requested alignment is not a power of two, or is smaller than the
    /// platform pointer alignment.
    #[error("bad alignment: {alignment} is not a power of two >= pointer size")]
    BadAlignment {
        /// The rejected alignment, in bytes.
        alignment: usize,
    },

    /// The OS (or the underlying `GlobalAlloc`) refused to hand back a
    /// region of the requested size.
    #[error("out of memory: failed to allocate a region of {size} bytes (align {alignment})")]
    OutOfMemory {
        /// The region size that could not be satisfied, in bytes.
        size: usize,
        /// The alignment that was requested.
        alignment: usize,
    },

    /// `deallocate` was called with a pointer the pool has no record of —
    /// either a double free or a pointer foreign to this pool.
    #[error("unknown pointer passed to deallocate (double free or foreign pointer)")]
    UnknownPointer,
}
