//! Storage (§4.C, §3 "Storage"): a buffer paired with a shape vector.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::alloc::{default_pool, Allocator};
use crate::buffer::Buffer;
use crate::dtype::TensorElement;
use crate::error::TensorError;

fn flat_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// An aligned buffer plus the shape it's interpreted under (§3).
///
/// Two `Storage<T>` values are independent even if their buffers happen to
/// alias (e.g. a view constructed to share memory) — `Storage` itself never
/// performs aliasing; it's a plain owner of one [`Buffer`] and one shape.
#[derive(Clone, Debug)]
pub struct Storage<T: TensorElement> {
    buffer: Buffer,
    shape: Vec<usize>,
    _marker: PhantomData<T>,
}

impl<T: TensorElement> Storage<T> {
    /// Allocates zero-initialised storage for `shape` from the default
    /// pool.
    pub fn zeros(shape: Vec<usize>) -> Result<Self, crate::error::AllocError> {
        Self::zeros_with_allocator(shape, default_pool())
    }

    /// Allocates zero-initialised storage for `shape` from an explicit
    /// allocator.
    pub fn zeros_with_allocator(
        shape: Vec<usize>,
        allocator: Arc<dyn Allocator>,
    ) -> Result<Self, crate::error::AllocError> {
        let count = flat_size(&shape);
        let bytes = count * std::mem::size_of::<T>();
        let mut buffer = Buffer::with_allocator(bytes, std::mem::align_of::<T>().max(8), allocator)?;
        if count > 0 {
            let view: &mut [T] = buffer
                .as_mut_slice(count)
                .expect("freshly allocated buffer covers its own declared shape");
            view.fill(T::default());
        }
        Ok(Storage {
            buffer,
            shape,
            _marker: PhantomData,
        })
    }

    /// Builds storage from an explicit data sequence, failing if its
    /// length doesn't match the product of `shape` (§4.C).
    pub fn from_data(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        Self::from_data_with_allocator(shape, data, default_pool())
    }

    /// As [`Storage::from_data`], but allocating from an explicit
    /// allocator.
    pub fn from_data_with_allocator(
        shape: Vec<usize>,
        data: Vec<T>,
        allocator: Arc<dyn Allocator>,
    ) -> Result<Self, TensorError> {
        let expected = flat_size(&shape);
        if data.len() != expected {
            return Err(TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            });
        }

        let bytes = data.len() * std::mem::size_of::<T>();
        let mut buffer = Buffer::with_allocator(bytes, std::mem::align_of::<T>().max(8), allocator)
            .map_err(|_| TensorError::ShapeMismatch {
                expected,
                actual: data.len(),
            })?;
        if !data.is_empty() {
            let view: &mut [T] = buffer
                .as_mut_slice(data.len())
                .expect("freshly allocated buffer covers its own declared shape");
            view.copy_from_slice(&data);
        }

        Ok(Storage {
            buffer,
            shape,
            _marker: PhantomData,
        })
    }

    /// The shape this storage is interpreted under.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// The total element count (product of `shape`).
    pub fn len(&self) -> usize {
        flat_size(&self.shape)
    }

    /// True when `shape` has zero elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A read-only typed view over every element.
    pub fn as_slice(&self) -> &[T] {
        self.buffer
            .as_slice(self.len())
            .expect("storage's buffer always covers its own shape")
    }

    /// A mutable typed view over every element.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let len = self.len();
        self.buffer
            .as_mut_slice(len)
            .expect("storage's buffer always covers its own shape")
    }

    /// The underlying buffer, for code that needs to share or inspect raw
    /// allocation details (e.g. the driver computing base pointers).
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros_fills_every_element() {
        let storage = Storage::<f32>::zeros(vec![2, 3]).unwrap();
        assert_eq!(storage.as_slice(), &[0.0; 6]);
    }

    #[test]
    fn from_data_checks_shape_product() {
        let err = Storage::<f64>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            TensorError::ShapeMismatch {
                expected: 4,
                actual: 3
            }
        ));
    }

    #[test]
    fn from_data_round_trips() {
        let storage = Storage::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(storage.as_slice(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(storage.shape(), &[2, 2]);
    }
}
