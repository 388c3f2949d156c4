//! Layout and tensor descriptors (§3 "Layout", "Tensor descriptor").

use crate::dtype::TensorElement;

/// A shape paired with a matching strides sequence, both in elements
/// (§3 "Layout").
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layout {
    shape: Vec<usize>,
    strides: Vec<usize>,
}

impl Layout {
    /// Builds a row-major contiguous layout for `shape`: `stride[i]` is the
    /// product of `shape[i+1..]`.
    pub fn contiguous(shape: Vec<usize>) -> Self {
        let strides = contiguous_strides(&shape);
        Layout { shape, strides }
    }

    /// Builds a layout from an explicit shape and strides pair. Callers
    /// (the planner, primarily) are responsible for the two sequences
    /// having equal length.
    pub fn from_parts(shape: Vec<usize>, strides: Vec<usize>) -> Self {
        debug_assert_eq!(shape.len(), strides.len());
        Layout { shape, strides }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Number of dimensions. Scalars are modelled as rank-1 tensors of
    /// size 1 (§3), so rank is never zero.
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total element count: the product of `shape`.
    pub fn flat_size(&self) -> usize {
        self.shape.iter().product()
    }

    /// True if `strides` matches the row-major contiguous layout for
    /// `shape`.
    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides(&self.shape)
    }
}

fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0usize; shape.len()];
    let mut acc = 1usize;
    for i in (0..shape.len()).rev() {
        strides[i] = acc;
        acc = acc.saturating_mul(shape[i].max(1));
    }
    strides
}

/// A planner-facing, owned value describing one tensor operand: rank,
/// shape, strides in elements, and the element size in bytes (§3).
///
/// Descriptors don't own memory — they're built fresh from a tensor's
/// layout each time the planner is consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorDescriptor {
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub itemsize: usize,
}

impl TensorDescriptor {
    pub fn new<T: TensorElement>(layout: &Layout) -> Self {
        TensorDescriptor {
            shape: layout.shape().to_vec(),
            strides: layout.strides().to_vec(),
            itemsize: std::mem::size_of::<T>(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn flat_size(&self) -> usize {
        self.shape.iter().product()
    }

    /// Per-axis byte strides, derived from the element strides and
    /// `itemsize`.
    pub fn byte_strides(&self) -> Vec<isize> {
        self.strides
            .iter()
            .map(|&s| (s * self.itemsize) as isize)
            .collect()
    }
}
