//! Contraction (einsum-style) plans and GEMM-like pattern detection
//! (§4.D, §3 "Contraction plan").

use std::collections::HashMap;

use crate::error::PlanError;
use crate::layout::TensorDescriptor;
use crate::planner::{contiguous_byte_strides, LoopDim};

/// The recognised batched-matmul shape, populated when a contraction plan's
/// two operands line up with a GEMM call (§4.D).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GemmLikeDesc {
    pub batch: usize,
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub a_batch_stride: isize,
    pub b_batch_stride: isize,
    pub c_batch_stride: isize,
    pub a_row_stride: isize,
    pub a_col_stride: isize,
    pub b_row_stride: isize,
    pub b_col_stride: isize,
    pub c_row_stride: isize,
    pub c_col_stride: isize,
}

/// A lowered einsum-style contraction plan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContractionPlan {
    pub output_shape: Vec<usize>,
    /// Free (non-reduced) loop dims; `byte_strides` per dim is `[a, b, output]`.
    pub outer_dims: Vec<LoopDim>,
    /// Reduction loop dims; `byte_strides` per dim is `[a, b]` (output
    /// accumulates into the same element, stride 0).
    pub inner_dims: Vec<LoopDim>,
    pub gemm_like: Option<GemmLikeDesc>,
    pub itemsize: usize,
}

struct LabelInfo {
    extent: usize,
    axis_in_a: Option<usize>,
    axis_in_b: Option<usize>,
}

fn is_c_contiguous(desc: &TensorDescriptor) -> bool {
    let mut expected = 1usize;
    for i in (0..desc.rank()).rev() {
        if desc.shape[i] != 1 && desc.strides[i] != expected {
            return false;
        }
        expected = expected.saturating_mul(desc.shape[i].max(1));
    }
    true
}

/// Binds per-operand axis labels to a logical index space and lowers it
/// into outer/inner loop dims, per §4.D's einsum binding rule.
pub fn build_contraction_plan(
    a: &TensorDescriptor,
    a_labels: &[char],
    b: &TensorDescriptor,
    b_labels: &[char],
    output_labels: &[char],
) -> Result<ContractionPlan, PlanError> {
    if a_labels.len() != a.rank() || b_labels.len() != b.rank() {
        return Err(PlanError::LabelMismatch {
            label: a_labels
                .first()
                .copied()
                .or_else(|| b_labels.first().copied())
                .unwrap_or('?'),
        });
    }

    let mut labels: HashMap<char, LabelInfo> = HashMap::new();
    for (axis, &label) in a_labels.iter().enumerate() {
        let extent = a.shape[axis];
        let entry = labels.entry(label).or_insert(LabelInfo {
            extent,
            axis_in_a: None,
            axis_in_b: None,
        });
        if entry.extent != 1 && extent != 1 && entry.extent != extent {
            return Err(PlanError::LabelMismatch { label });
        }
        if extent != 1 {
            entry.extent = extent;
        }
        entry.axis_in_a = Some(axis);
    }
    for (axis, &label) in b_labels.iter().enumerate() {
        let extent = b.shape[axis];
        let entry = labels.entry(label).or_insert(LabelInfo {
            extent,
            axis_in_a: None,
            axis_in_b: None,
        });
        if entry.extent != 1 && extent != 1 && entry.extent != extent {
            return Err(PlanError::LabelMismatch { label });
        }
        if extent != 1 {
            entry.extent = extent;
        }
        entry.axis_in_b = Some(axis);
    }

    for &label in output_labels {
        if !labels.contains_key(&label) {
            return Err(PlanError::LabelMismatch { label });
        }
    }

    let itemsize = a.itemsize;
    let output_shape: Vec<usize> = output_labels
        .iter()
        .map(|l| labels[l].extent)
        .collect();
    let output_byte_strides = contiguous_byte_strides(&output_shape, itemsize);

    let mut outer_dims = Vec::with_capacity(output_labels.len());
    for (out_axis, &label) in output_labels.iter().enumerate() {
        let info = &labels[&label];
        let a_stride = info
            .axis_in_a
            .map(|ax| (a.strides[ax] * itemsize) as isize)
            .unwrap_or(0);
        let b_stride = info
            .axis_in_b
            .map(|ax| (b.strides[ax] * itemsize) as isize)
            .unwrap_or(0);
        outer_dims.push(LoopDim::new(
            info.extent,
            vec![a_stride, b_stride, output_byte_strides[out_axis]],
        ));
    }

    let mut inner_dims = Vec::new();
    let mut seen_reduction = std::collections::HashSet::new();
    for &label in a_labels.iter().chain(b_labels.iter()) {
        if output_labels.contains(&label) || !seen_reduction.insert(label) {
            continue;
        }
        let info = &labels[&label];
        let a_stride = info
            .axis_in_a
            .map(|ax| (a.strides[ax] * itemsize) as isize)
            .unwrap_or(0);
        let b_stride = info
            .axis_in_b
            .map(|ax| (b.strides[ax] * itemsize) as isize)
            .unwrap_or(0);
        inner_dims.push(LoopDim::new(info.extent, vec![a_stride, b_stride]));
    }

    let gemm_like = detect_gemm_like(a, a_labels, b, b_labels, output_labels, &labels, itemsize);

    Ok(ContractionPlan {
        output_shape,
        outer_dims,
        inner_dims,
        gemm_like,
        itemsize,
    })
}

fn detect_gemm_like(
    a: &TensorDescriptor,
    a_labels: &[char],
    b: &TensorDescriptor,
    b_labels: &[char],
    output_labels: &[char],
    labels: &HashMap<char, LabelInfo>,
    itemsize: usize,
) -> Option<GemmLikeDesc> {
    if !is_c_contiguous(a) || !is_c_contiguous(b) {
        return None;
    }

    let shared: Vec<char> = a_labels
        .iter()
        .filter(|l| b_labels.contains(l))
        .copied()
        .collect();

    let k_candidates: Vec<char> = shared
        .iter()
        .filter(|l| !output_labels.contains(l))
        .copied()
        .collect();
    if k_candidates.len() != 1 {
        return None;
    }
    let k_label = k_candidates[0];

    let m_candidates: Vec<char> = a_labels
        .iter()
        .filter(|l| output_labels.contains(l) && !b_labels.contains(l))
        .copied()
        .collect();
    if m_candidates.len() != 1 {
        return None;
    }
    let m_label = m_candidates[0];

    let n_candidates: Vec<char> = b_labels
        .iter()
        .filter(|l| output_labels.contains(l) && !a_labels.contains(l))
        .copied()
        .collect();
    if n_candidates.len() != 1 {
        return None;
    }
    let n_label = n_candidates[0];

    let batch_labels: Vec<char> = shared
        .iter()
        .filter(|l| output_labels.contains(l))
        .copied()
        .collect();
    // A single flattened batch stride only makes sense for zero or one
    // batch axis; higher-rank batching falls back to the general path.
    if batch_labels.len() > 1 {
        return None;
    }

    let m_info = &labels[&m_label];
    let n_info = &labels[&n_label];
    let k_info = &labels[&k_label];
    let a_m_axis = m_info.axis_in_a?;
    let a_k_axis = k_info.axis_in_a?;
    let b_k_axis = k_info.axis_in_b?;
    let b_n_axis = n_info.axis_in_b?;

    let a_row_stride = (a.strides[a_m_axis] * itemsize) as isize;
    let a_col_stride = (a.strides[a_k_axis] * itemsize) as isize;
    let b_row_stride = (b.strides[b_k_axis] * itemsize) as isize;
    let b_col_stride = (b.strides[b_n_axis] * itemsize) as isize;
    if a_row_stride == 0 || b_col_stride == 0 {
        return None;
    }

    let (batch, a_batch_stride, b_batch_stride) = match batch_labels.first() {
        Some(&label) => {
            let info = &labels[&label];
            let a_axis = info.axis_in_a?;
            let b_axis = info.axis_in_b?;
            (
                info.extent,
                (a.strides[a_axis] * itemsize) as isize,
                (b.strides[b_axis] * itemsize) as isize,
            )
        }
        None => (1, 0, 0),
    };

    let output_shape: Vec<usize> = output_labels.iter().map(|l| labels[l].extent).collect();
    let output_byte_strides = contiguous_byte_strides(&output_shape, itemsize);
    let out_m_axis = output_labels.iter().position(|&l| l == m_label)?;
    let out_n_axis = output_labels.iter().position(|&l| l == n_label)?;
    let c_batch_stride = batch_labels
        .first()
        .and_then(|&l| output_labels.iter().position(|&o| o == l))
        .map(|ax| output_byte_strides[ax])
        .unwrap_or(0);

    Some(GemmLikeDesc {
        batch,
        m: m_info.extent,
        n: n_info.extent,
        k: k_info.extent,
        a_batch_stride,
        b_batch_stride,
        c_batch_stride,
        a_row_stride,
        a_col_stride,
        b_row_stride,
        b_col_stride,
        c_row_stride: output_byte_strides[out_m_axis],
        c_col_stride: output_byte_strides[out_n_axis],
    })
}
