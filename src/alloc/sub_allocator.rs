//! The aligned sub-allocator (§4.A) — the pool's only contact with the OS.
//!
//! Grounded on the teacher's `libc` dependency (used elsewhere in the pack
//! for raw native-framework plumbing); here it backs `posix_memalign`/`free`
//! so that region alignment is a property of the allocation itself rather
//! than something layered on top of `std::alloc`'s `Layout`, matching the
//! C++ original's `CPUSubAllocator` (`mmap`-free, `posix_memalign`-based).

use std::ptr::NonNull;

use crate::error::AllocError;

/// Obtains and releases aligned byte regions from the OS.
///
/// Implementors do no bookkeeping beyond the raw allocation itself — the
/// BFC pool (§4.B) is the only client and owns all chunk/bucket state.
pub trait SubAllocator: Send + Sync {
    /// Allocates a region of `size` bytes aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// [`AllocError::BadAlignment`] if `alignment` is not a power of two or
    /// is smaller than the pointer size; [`AllocError::OutOfMemory`] if the
    /// OS refuses the allocation.
    fn allocate_region(&self, alignment: usize, size: usize) -> Result<NonNull<u8>, AllocError>;

    /// Releases a region previously returned by `allocate_region`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by this allocator's `allocate_region`
    /// and not already released.
    unsafe fn deallocate_region(&self, ptr: NonNull<u8>);
}

/// The default [`SubAllocator`], backed by `libc::posix_memalign`/`free`.
#[derive(Debug, Default)]
pub struct CpuSubAllocator;

fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two() && alignment >= std::mem::size_of::<usize>()
}

impl SubAllocator for CpuSubAllocator {
    fn allocate_region(&self, alignment: usize, size: usize) -> Result<NonNull<u8>, AllocError> {
        if !is_valid_alignment(alignment) {
            return Err(AllocError::BadAlignment { alignment });
        }
        let size = size.max(1);

        let mut raw: *mut libc::c_void = std::ptr::null_mut();
        // SAFETY: `alignment` was checked to be a power of two >= pointer
        // size, and `size` is non-zero, satisfying `posix_memalign`'s
        // preconditions. `raw` is a valid out-pointer.
        let rc = unsafe { libc::posix_memalign(&mut raw, alignment, size) };
        if rc != 0 || raw.is_null() {
            return Err(AllocError::OutOfMemory { size, alignment });
        }

        NonNull::new(raw as *mut u8).ok_or(AllocError::OutOfMemory { size, alignment })
    }

    unsafe fn deallocate_region(&self, ptr: NonNull<u8>) {
        // SAFETY: delegated to the caller's contract on `deallocate_region`.
        unsafe { libc::free(ptr.as_ptr() as *mut libc::c_void) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two_alignment() {
        let sub = CpuSubAllocator;
        let err = sub.allocate_region(24, 128).unwrap_err();
        assert!(matches!(err, AllocError::BadAlignment { alignment: 24 }));
    }

    #[test]
    fn rejects_alignment_below_pointer_size() {
        let sub = CpuSubAllocator;
        let err = sub.allocate_region(1, 128).unwrap_err();
        assert!(matches!(err, AllocError::BadAlignment { alignment: 1 }));
    }

    #[test]
    fn round_trips_a_region() {
        let sub = CpuSubAllocator;
        let ptr = sub.allocate_region(64, 256).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 64, 0);
        unsafe { sub.deallocate_region(ptr) };
    }
}
