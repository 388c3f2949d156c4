//! Broadcast plans (§4.D, §3 "Broadcast plan").

use crate::error::TensorError;
use crate::layout::TensorDescriptor;
use crate::planner::{contiguous_byte_strides, LoopDim};

/// A lowered elementwise broadcast plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BroadcastPlan {
    pub output_shape: Vec<usize>,
    /// Loop dimensions in natural (outer-to-inner) output axis order;
    /// `byte_strides` per dim is `[operand_0, .., operand_n-1, output]`.
    pub dims: Vec<LoopDim>,
    /// True when every operand is already layout-identical to the output
    /// (no broadcasting occurred and every operand is contiguous) — the
    /// driver's fast-path indicator.
    pub all_contiguous: bool,
    pub itemsize: usize,
}

impl BroadcastPlan {
    pub fn rank(&self) -> usize {
        self.output_shape.len()
    }
}

/// Builds a broadcast plan over `operands` (§4.D's broadcast rule).
pub fn build_broadcast_plan(operands: &[TensorDescriptor]) -> Result<BroadcastPlan, TensorError> {
    assert!(!operands.is_empty(), "broadcast plan needs at least one operand");
    let itemsize = operands[0].itemsize;
    let rank = operands.iter().map(|d| d.rank()).max().unwrap_or(1).max(1);

    // Right-align every operand's shape/strides to `rank` by padding
    // leading 1s (shape) / 0s (stride).
    let padded: Vec<(Vec<usize>, Vec<isize>)> = operands
        .iter()
        .map(|d| {
            let pad = rank - d.rank();
            let mut shape = vec![1usize; pad];
            shape.extend_from_slice(&d.shape);
            let mut strides = vec![0isize; pad];
            strides.extend(d.strides.iter().map(|&s| (s * d.itemsize) as isize));
            (shape, strides)
        })
        .collect();

    let mut output_shape = vec![0usize; rank];
    for axis in 0..rank {
        let mut extent = 1usize;
        for (shape, _) in &padded {
            let e = shape[axis];
            if e != 1 {
                if extent != 1 && extent != e {
                    return Err(TensorError::IncompatibleShapes {
                        lhs: operands[0].shape.clone(),
                        rhs: operands.last().unwrap().shape.clone(),
                    });
                }
                extent = e;
            }
        }
        output_shape[axis] = extent;
    }

    let output_byte_strides = contiguous_byte_strides(&output_shape, itemsize);

    let mut dims = Vec::with_capacity(rank);
    let mut all_contiguous = true;
    for axis in 0..rank {
        let mut strides = Vec::with_capacity(operands.len() + 1);
        for (shape, op_strides) in &padded {
            if shape[axis] == 1 && output_shape[axis] != 1 {
                strides.push(0);
                all_contiguous = false;
            } else {
                strides.push(op_strides[axis]);
            }
        }
        strides.push(output_byte_strides[axis]);
        dims.push(LoopDim::new(output_shape[axis], strides));
    }

    if all_contiguous {
        for d in operands {
            if !d.shape.iter().eq(output_shape.iter().skip(rank - d.rank())) {
                all_contiguous = false;
                break;
            }
        }
    }

    Ok(BroadcastPlan {
        output_shape,
        dims,
        all_contiguous,
        itemsize,
    })
}
