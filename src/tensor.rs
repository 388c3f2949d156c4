//! The raw, eager tensor (§4.G, §3 "Raw tensor"): storage + layout +
//! dtype/device, with the arithmetic surface built on the planner (§4.D),
//! driver (§4.E), and kernel traits (§4.F).

use std::sync::Arc;

use num_traits::NumCast;

use crate::alloc::Allocator;
use crate::driver::{drive_binary, drive_contraction, drive_reduce, drive_unary};
use crate::dtype::{Device, TensorElement};
use crate::error::TensorError;
use crate::kernel::{
    Add, BlasKernel, Div, Exp, GreaterOrEqual, GreaterThan, Ln, Maximum, Mul, Pow, Sqrt, Sub,
    SumReduce,
};
use crate::kernel::gemm::execute_gemm_like;
use crate::layout::{Layout, TensorDescriptor};
use crate::planner::{build_broadcast_plan, build_contraction_plan, build_reduction_plan};
use crate::storage::Storage;

/// The eager, value-typed tensor (§3, §4.G).
///
/// Cloning a `Tensor` is cheap: it shares storage. Operations that need a
/// deep copy (`clone_data`) allocate fresh storage explicitly.
#[derive(Clone, Debug)]
pub struct Tensor<T: TensorElement> {
    storage: Storage<T>,
    layout: Layout,
    device: Device,
}

impl<T: TensorElement> Tensor<T> {
    /// Wraps a freshly allocated, contiguous storage as a tensor.
    fn from_storage(storage: Storage<T>) -> Self {
        let layout = Layout::contiguous(storage.shape().to_vec());
        Tensor {
            storage,
            layout,
            device: Device::Cpu,
        }
    }

    /// A tensor of `shape` filled with zeros.
    pub fn zeros(shape: Vec<usize>) -> Result<Self, crate::error::AllocError> {
        Ok(Self::from_storage(Storage::zeros(shape)?))
    }

    /// A tensor of `shape` filled with ones.
    pub fn ones(shape: Vec<usize>) -> Result<Self, crate::error::AllocError> {
        let mut tensor = Self::zeros(shape)?;
        tensor.storage.as_mut_slice().fill(T::one());
        Ok(tensor)
    }

    /// A rank-1, single-element tensor wrapping `value` (§4.G's
    /// `scalar_t`; scalars are modelled as rank-1 size-1 tensors per §3).
    pub fn scalar_t(value: T) -> Result<Self, crate::error::AllocError> {
        let mut tensor = Self::zeros(vec![1])?;
        tensor.storage.as_mut_slice()[0] = value;
        Ok(tensor)
    }

    /// Builds a tensor from an explicit row-major data sequence.
    pub fn from_data(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        Ok(Self::from_storage(Storage::from_data(shape, data)?))
    }

    /// As [`Tensor::zeros`], but allocating from an explicit allocator
    /// rather than the process-wide default pool (§5).
    pub fn zeros_with_allocator(
        shape: Vec<usize>,
        allocator: Arc<dyn Allocator>,
    ) -> Result<Self, crate::error::AllocError> {
        Ok(Self::from_storage(Storage::zeros_with_allocator(
            shape, allocator,
        )?))
    }

    pub fn shape(&self) -> &[usize] {
        self.layout.shape()
    }

    pub fn strides(&self) -> &[usize] {
        self.layout.strides()
    }

    pub fn rank(&self) -> usize {
        self.layout.rank()
    }

    pub fn len(&self) -> usize {
        self.layout.flat_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dtype(&self) -> crate::dtype::DType {
        T::DTYPE
    }

    pub fn device(&self) -> Device {
        self.device
    }

    /// Deep-copies this tensor's data into a fresh, contiguous storage.
    pub fn clone_data(&self) -> Result<Self, TensorError> {
        Self::from_data(self.layout.shape().to_vec(), self.iter().collect())
    }

    /// Iterates elements in the tensor's logical (possibly strided) order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let rank = self.layout.rank();
        let shape = self.layout.shape().to_vec();
        let strides = self.layout.strides().to_vec();
        let flat = self.storage.as_slice();
        let total = self.len();
        (0..total).map(move |flat_index| {
            let mut remainder = flat_index;
            let mut offset = 0usize;
            for axis in 0..rank {
                let extent: usize = shape[axis + 1..].iter().product();
                let coord = if extent == 0 { 0 } else { remainder / extent.max(1) };
                remainder -= coord * extent.max(1);
                offset += coord * strides[axis];
            }
            flat[offset]
        })
    }

    /// Read-only flat indexing over the tensor's logical order (§4.G).
    pub fn get_flat(&self, index: usize) -> Result<T, TensorError> {
        if index >= self.len() {
            return Err(TensorError::OutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(self.iter().nth(index).unwrap())
    }

    fn descriptor(&self) -> TensorDescriptor {
        TensorDescriptor::new::<T>(&self.layout)
    }

    fn base_ptr(&self) -> *mut T {
        self.storage.as_slice().as_ptr() as *mut T
    }

    fn check_dtype_device(&self, other: &Tensor<T>) -> Result<(), TensorError> {
        if self.device != other.device {
            return Err(TensorError::DeviceMismatch {
                lhs: self.device,
                rhs: other.device,
            });
        }
        Ok(())
    }

    fn binary_op<K: crate::kernel::BinaryKernel<T>>(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.check_dtype_device(other)?;
        let plan = build_broadcast_plan(&[self.descriptor(), other.descriptor()])?;
        let mut output = Tensor::zeros(plan.output_shape.clone())
            .map_err(|_| TensorError::ShapeMismatch {
                expected: plan.output_shape.iter().product(),
                actual: 0,
            })?;
        drive_binary::<T, K>(
            &plan.dims,
            [self.base_ptr(), other.base_ptr(), output.base_ptr()],
            plan.all_contiguous,
        );
        Ok(output)
    }

    fn unary_op<K: crate::kernel::UnaryKernel<T>>(&self) -> Tensor<T> {
        let mut output = Tensor::zeros(self.layout.shape().to_vec())
            .expect("allocating an output the same size as an existing tensor cannot fail differently than the original allocation");
        let all_contiguous = self.layout.is_contiguous();
        let itemsize = std::mem::size_of::<T>();
        let byte_strides: Vec<isize> = self.layout.strides().iter().map(|&s| (s * itemsize) as isize).collect();
        let out_byte_strides: Vec<isize> = output.layout.strides().iter().map(|&s| (s * itemsize) as isize).collect();
        let dims: Vec<crate::planner::LoopDim> = self
            .layout
            .shape()
            .iter()
            .enumerate()
            .map(|(axis, &extent)| crate::planner::LoopDim::new(extent, vec![byte_strides[axis], out_byte_strides[axis]]))
            .collect();
        drive_unary::<T, K>(&dims, [self.base_ptr(), output.base_ptr()], all_contiguous);
        output
    }

    pub fn add(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Add>(other)
    }

    pub fn sub(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Sub>(other)
    }

    pub fn mul(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Mul>(other)
    }

    pub fn div(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Div>(other)
    }

    pub fn greater_than(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<GreaterThan>(other)
    }

    pub fn maximum(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Maximum>(other)
    }

    pub fn greater_or_equal(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<GreaterOrEqual>(other)
    }

    pub fn pow(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError> {
        self.binary_op::<Pow>(other)
    }

    pub fn sqrt(&self) -> Tensor<T> {
        self.unary_op::<Sqrt>()
    }

    pub fn ln(&self) -> Tensor<T> {
        self.unary_op::<Ln>()
    }

    pub fn exp(&self) -> Tensor<T> {
        self.unary_op::<Exp>()
    }

    /// In-place `self -= other`, failing if broadcasting `other` against
    /// `self` would require `self`'s shape to change (§4.G).
    pub fn sub_assign(&mut self, other: &Tensor<T>) -> Result<(), TensorError> {
        self.check_dtype_device(other)?;
        let plan = build_broadcast_plan(&[self.descriptor(), other.descriptor()])?;
        if plan.output_shape != self.layout.shape() {
            return Err(TensorError::ShapeMismatch {
                expected: self.len(),
                actual: plan.output_shape.iter().product(),
            });
        }
        let self_ptr = self.base_ptr();
        let other_ptr = other.base_ptr();
        drive_binary::<T, Sub>(&plan.dims, [self_ptr, other_ptr, self_ptr], plan.all_contiguous);
        Ok(())
    }

    /// Sums over `axis`, with `keepdim` controlling whether the reduced
    /// axis is kept at size 1 or dropped.
    pub fn sum(&self, axis: usize, keepdim: bool) -> Result<Tensor<T>, TensorError> {
        let plan = build_reduction_plan(&self.descriptor(), axis, keepdim)?;
        let mut output = Tensor::zeros(plan.output_shape.clone()).map_err(|_| TensorError::AxisOutOfRange {
            axis,
            rank: self.rank(),
        })?;
        drive_reduce::<T, SumReduce>(&plan.dims, [self.base_ptr(), output.base_ptr()]);
        Ok(output)
    }

    /// Mean over `axis`: `sum(axis) / extent` (§4.I: "Mean: sum/N").
    pub fn mean(&self, axis: usize, keepdim: bool) -> Result<Tensor<T>, TensorError> {
        let mut summed = self.sum(axis, keepdim)?;
        let n = self.layout.shape()[axis];
        let divisor = T::from(n).expect("axis extent fits in the tensor's element type");
        for v in summed.storage.as_mut_slice() {
            *v = *v / divisor;
        }
        Ok(summed)
    }

    /// Swaps two axes, returning a view over the same storage with
    /// permuted shape/strides (no data movement).
    pub fn swap_axes(&self, i: usize, j: usize) -> Result<Tensor<T>, TensorError> {
        let rank = self.rank();
        if i >= rank {
            return Err(TensorError::AxisOutOfRange { axis: i, rank });
        }
        if j >= rank {
            return Err(TensorError::AxisOutOfRange { axis: j, rank });
        }
        let mut shape = self.layout.shape().to_vec();
        let mut strides = self.layout.strides().to_vec();
        shape.swap(i, j);
        strides.swap(i, j);
        Ok(Tensor {
            storage: self.storage.clone(),
            layout: Layout::from_parts(shape, strides),
            device: self.device,
        })
    }

    /// Batched matrix multiply over the last two axes (§4.G, §4.D's
    /// GEMM-like detection). Supports rank-2 (`[m, k] @ [k, n]`) and
    /// rank-3 batched (`[b, m, k] @ [b, k, n]`) operands.
    pub fn matmul(&self, other: &Tensor<T>) -> Result<Tensor<T>, TensorError>
    where
        T: BlasKernel,
    {
        self.check_dtype_device(other)?;
        let (a_labels, b_labels, out_labels): (Vec<char>, Vec<char>, Vec<char>) = match (self.rank(), other.rank()) {
            (2, 2) => (vec!['i', 'k'], vec!['k', 'j'], vec!['i', 'j']),
            (3, 3) => (vec!['n', 'i', 'k'], vec!['n', 'k', 'j'], vec!['n', 'i', 'j']),
            _ => {
                return Err(TensorError::RankTooLow {
                    minimum: 2,
                    actual: self.rank().min(other.rank()),
                })
            }
        };

        let a_desc = self.descriptor();
        let b_desc = other.descriptor();
        let plan = build_contraction_plan(&a_desc, &a_labels, &b_desc, &b_labels, &out_labels)
            .map_err(|_| TensorError::IncompatibleShapes {
                lhs: a_desc.shape.clone(),
                rhs: b_desc.shape.clone(),
            })?;

        let mut output = Tensor::zeros(plan.output_shape.clone()).map_err(|_| TensorError::IncompatibleShapes {
            lhs: a_desc.shape.clone(),
            rhs: b_desc.shape.clone(),
        })?;

        match &plan.gemm_like {
            Some(desc) => {
                let a_slice = self.storage.as_slice();
                let b_slice = other.storage.as_slice();
                let out_slice = output.storage.as_mut_slice();
                execute_gemm_like(desc, a_slice, b_slice, out_slice);
            }
            None => {
                drive_contraction::<T>(
                    &plan.outer_dims,
                    &plan.inner_dims,
                    [self.base_ptr(), other.base_ptr(), output.base_ptr()],
                );
            }
        }

        Ok(output)
    }

    /// A tensor of the same shape as `self`, filled with ones.
    pub fn ones_like(&self) -> Result<Tensor<T>, crate::error::AllocError> {
        Tensor::ones(self.layout.shape().to_vec())
    }

    /// A tensor of the same shape as `self`, filled with zeros.
    pub fn zeros_like(&self) -> Result<Tensor<T>, crate::error::AllocError> {
        Tensor::zeros(self.layout.shape().to_vec())
    }

    /// Re-inserts a size-1 axis at `axis`, the inverse of a non-keepdim
    /// reduction (§4.I: Sum/Mean backward re-expand `g` before broadcasting
    /// it back against the input). A metadata-only view; no data is moved.
    pub fn insert_axis(&self, axis: usize) -> Result<Tensor<T>, TensorError> {
        let rank = self.rank();
        if axis > rank {
            return Err(TensorError::AxisOutOfRange { axis, rank });
        }
        let mut shape = self.layout.shape().to_vec();
        let mut strides = self.layout.strides().to_vec();
        // The inserted axis has extent 1, so its stride is never read by
        // the driver's index arithmetic; 0 keeps it consistent with other
        // broadcast-sourced axes.
        let stride_at_axis = if axis < strides.len() { strides[axis] } else { 0 };
        shape.insert(axis, 1);
        strides.insert(axis, stride_at_axis);
        Ok(Tensor {
            storage: self.storage.clone(),
            layout: Layout::from_parts(shape, strides),
            device: self.device,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_broadcasts_a_scalar() {
        let a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::scalar_t(10.0).unwrap();
        let c = a.add(&b).unwrap();
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![11.0, 12.0, 13.0, 14.0]);
    }

    #[test]
    fn sum_over_axis_matches_expectation() {
        let a = Tensor::<f32>::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let summed = a.sum(1, false).unwrap();
        assert_eq!(summed.shape(), &[2]);
        assert_eq!(summed.iter().collect::<Vec<_>>(), vec![6.0, 15.0]);
    }

    #[test]
    fn mean_divides_by_axis_extent() {
        let a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let mean = a.mean(1, false).unwrap();
        assert_eq!(mean.iter().collect::<Vec<_>>(), vec![1.5, 3.5]);
    }

    #[test]
    fn in_place_sub_requires_matching_shape() {
        let mut a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::from_data(vec![2, 3], vec![1.0; 6]).unwrap();
        assert!(matches!(a.sub_assign(&b), Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn matmul_two_by_two() {
        let a = Tensor::<f32>::from_data(vec![2, 2], vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = Tensor::<f32>::from_data(vec![2, 2], vec![5.0, 6.0, 7.0, 8.0]).unwrap();
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn swap_axes_does_not_copy_data() {
        let a = Tensor::<f32>::from_data(vec![2, 3], (1..=6).map(|v| v as f32).collect()).unwrap();
        let t = a.swap_axes(0, 1).unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(t.iter().collect::<Vec<_>>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn ones_like_and_zeros_like_match_shape() {
        let a = Tensor::<f32>::from_data(vec![2, 3], vec![1.0; 6]).unwrap();
        assert_eq!(a.ones_like().unwrap().iter().collect::<Vec<_>>(), vec![1.0; 6]);
        assert_eq!(a.zeros_like().unwrap().iter().collect::<Vec<_>>(), vec![0.0; 6]);
    }

    #[test]
    fn insert_axis_reexpands_a_reduced_rank() {
        let a = Tensor::<f32>::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let summed = a.sum(1, false).unwrap();
        assert_eq!(summed.shape(), &[2]);
        let reexpanded = summed.insert_axis(1).unwrap();
        assert_eq!(reexpanded.shape(), &[2, 1]);
        assert_eq!(reexpanded.iter().collect::<Vec<_>>(), vec![6.0, 15.0]);
    }
}
