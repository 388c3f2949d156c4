//! Reduction plans (§4.D, §3 "Reduction plan").

use crate::error::TensorError;
use crate::layout::TensorDescriptor;
use crate::planner::{contiguous_byte_strides, LoopDim};

/// A lowered single-axis reduction plan: non-reduced axes first (in output
/// order), the reduction axis innermost.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReductionPlan {
    pub output_shape: Vec<usize>,
    pub keepdim: bool,
    pub reduction_axis: usize,
    /// Loop dims; `byte_strides` per dim is `[input, output]`. The last
    /// entry is always the reduction axis, with output stride forced to 0.
    pub dims: Vec<LoopDim>,
    pub itemsize: usize,
}

impl ReductionPlan {
    pub fn reduction_extent(&self) -> usize {
        self.dims.last().map(|d| d.extent).unwrap_or(1)
    }
}

/// Builds a reduction plan over `input` along `axis` (§4.D's reduction
/// rule).
pub fn build_reduction_plan(
    input: &TensorDescriptor,
    axis: usize,
    keepdim: bool,
) -> Result<ReductionPlan, TensorError> {
    if axis >= input.rank() {
        return Err(TensorError::AxisOutOfRange {
            axis,
            rank: input.rank(),
        });
    }

    let output_shape: Vec<usize> = if keepdim {
        input
            .shape
            .iter()
            .enumerate()
            .map(|(i, &s)| if i == axis { 1 } else { s })
            .collect()
    } else {
        input
            .shape
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != axis)
            .map(|(_, &s)| s)
            .collect()
    };
    let output_byte_strides = contiguous_byte_strides(&output_shape, input.itemsize);

    let mut dims = Vec::with_capacity(input.rank());
    let mut output_axis = 0usize;
    for i in 0..input.rank() {
        if i == axis {
            continue;
        }
        let input_stride = (input.strides[i] * input.itemsize) as isize;
        let output_stride = output_byte_strides[output_axis];
        dims.push(LoopDim::new(input.shape[i], vec![input_stride, output_stride]));
        output_axis += 1;
    }

    let reduction_input_stride = (input.strides[axis] * input.itemsize) as isize;
    dims.push(LoopDim::new(
        input.shape[axis],
        vec![reduction_input_stride, 0],
    ));

    Ok(ReductionPlan {
        output_shape,
        keepdim,
        reduction_axis: axis,
        dims,
        itemsize: input.itemsize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Layout;

    fn desc(shape: Vec<usize>) -> TensorDescriptor {
        TensorDescriptor::new::<f32>(&Layout::contiguous(shape))
    }

    #[test]
    fn reduction_axis_is_innermost_with_zero_output_stride() {
        let plan = build_reduction_plan(&desc(vec![2, 3]), 1, false).unwrap();
        assert_eq!(plan.output_shape, vec![2]);
        assert_eq!(plan.dims.len(), 2);
        assert_eq!(plan.dims.last().unwrap().byte_strides[1], 0);
    }

    #[test]
    fn keepdim_preserves_rank() {
        let plan = build_reduction_plan(&desc(vec![2, 3]), 1, true).unwrap();
        assert_eq!(plan.output_shape, vec![2, 1]);
    }

    #[test]
    fn out_of_range_axis_fails() {
        let err = build_reduction_plan(&desc(vec![2, 3]), 5, false).unwrap_err();
        assert!(matches!(err, TensorError::AxisOutOfRange { axis: 5, rank: 2 }));
    }
}
