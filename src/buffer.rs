//! The aligned buffer (§4.C, §3 "Aligned buffer"): a reference-counted
//! owner of a raw byte region obtained from a [`Pool`].
//!
//! Grounded on the teacher's `Memory`/`Buffer` split in `frameworks`'s
//! backend plumbing (an opaque device allocation wrapped so drop returns it
//! to whatever produced it) — here specialised to one device (CPU) and one
//! producer (the BFC pool), with the reference count carried by `Arc`
//! rather than a hand-rolled atomic, since ownership truly is shared
//! (tensors freely clone their storage).

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use crate::alloc::{default_pool, Allocator};
use crate::error::TensorError;

struct Region {
    ptr: NonNull<u8>,
    len: usize,
    allocator: Arc<dyn Allocator>,
}

// SAFETY: `Region` owns its byte range exclusively; no aliasing mutable
// access is exposed across threads (`Buffer`'s typed views borrow from a
// `&self` and require `T: Send + Sync` at the call site via `TensorElement`).
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Drop for Region {
    fn drop(&mut self) {
        if let Err(err) = self.allocator.deallocate(self.ptr) {
            log::warn!("buffer: failed to release region on drop: {err}");
        }
    }
}

/// A reference-counted owner of a raw, aligned byte region (§3).
///
/// Cloning a `Buffer` is cheap and shares the underlying region; the region
/// is returned to its allocator when the last clone is dropped.
#[derive(Clone)]
pub struct Buffer {
    region: Arc<Region>,
    alignment: usize,
}

impl Buffer {
    /// Allocates a new buffer of `len` bytes aligned to `alignment` from
    /// the process-wide default pool.
    pub fn new(len: usize, alignment: usize) -> Result<Self, crate::error::AllocError> {
        Self::with_allocator(len, alignment, default_pool())
    }

    /// Allocates a new buffer from an explicit allocator (e.g. a
    /// per-thread [`Pool`](crate::alloc::Pool), per §5).
    pub fn with_allocator(
        len: usize,
        alignment: usize,
        allocator: Arc<dyn Allocator>,
    ) -> Result<Self, crate::error::AllocError> {
        let ptr = allocator.allocate(len, alignment)?;
        Ok(Buffer {
            region: Arc::new(Region {
                ptr,
                len,
                allocator,
            }),
            alignment,
        })
    }

    /// The region's size in bytes.
    pub fn len(&self) -> usize {
        self.region.len
    }

    /// True if the buffer owns zero bytes.
    pub fn is_empty(&self) -> bool {
        self.region.len == 0
    }

    /// The alignment the buffer was constructed with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Number of live references to this region (diagnostic only).
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.region)
    }

    /// A typed, read-only view of the buffer's `count` elements of `T`
    /// starting at byte offset 0.
    ///
    /// # Errors
    ///
    /// [`TensorError::OutOfRange`] if `count * size_of::<T>()` exceeds the
    /// buffer's length.
    pub fn as_slice<T: Copy>(&self, count: usize) -> Result<&[T], TensorError> {
        self.bounds_check::<T>(count)?;
        // SAFETY: bounds were checked above; the region outlives `&self`,
        // and `T` has no alignment requirement stricter than the buffer's
        // (tensor element types are `f32`/`f64`, both ≤ the minimum
        // alignment the sub-allocator accepts).
        Ok(unsafe { std::slice::from_raw_parts(self.region.ptr.as_ptr() as *const T, count) })
    }

    /// A typed, mutable view of the buffer's `count` elements of `T`.
    ///
    /// # Errors
    ///
    /// [`TensorError::OutOfRange`] if `count * size_of::<T>()` exceeds the
    /// buffer's length.
    pub fn as_mut_slice<T: Copy>(&mut self, count: usize) -> Result<&mut [T], TensorError> {
        self.bounds_check::<T>(count)?;
        let ptr = self.region.ptr.as_ptr() as *mut T;
        // SAFETY: bounds checked above; `Arc::get_mut` below is not used
        // because callers may legitimately hold the only clone and still
        // want interior mutability through the Arc for in-place ops (§4.G
        // in-place subtract) — uniqueness of *access* is the caller's
        // contract, mirroring raw tensor in-place semantics.
        Ok(unsafe { std::slice::from_raw_parts_mut(ptr, count) })
    }

    fn bounds_check<T>(&self, count: usize) -> Result<(), TensorError> {
        let needed = count
            .checked_mul(std::mem::size_of::<T>())
            .unwrap_or(usize::MAX);
        if needed > self.region.len {
            return Err(TensorError::OutOfRange {
                index: needed,
                len: self.region.len,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("len", &self.region.len)
            .field("alignment", &self.alignment)
            .field("strong_count", &self.strong_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_the_region_and_drop_releases_once() {
        let buf = Buffer::new(256, 64).unwrap();
        let clone = buf.clone();
        assert_eq!(buf.strong_count(), 2);
        drop(clone);
        assert_eq!(buf.strong_count(), 1);
    }

    #[test]
    fn out_of_range_view_is_rejected() {
        let buf = Buffer::new(16, 64).unwrap();
        let err = buf.as_slice::<f64>(10).unwrap_err();
        assert!(matches!(err, TensorError::OutOfRange { .. }));
    }

    #[test]
    fn in_range_view_round_trips_writes() {
        let mut buf = Buffer::new(64, 64).unwrap();
        {
            let view: &mut [f32] = buf.as_mut_slice(4).unwrap();
            view.copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        }
        let view: &[f32] = buf.as_slice(4).unwrap();
        assert_eq!(view, &[1.0, 2.0, 3.0, 4.0]);
    }
}
