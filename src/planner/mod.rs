//! The shape/stride execution planner (§4.D): turns operand descriptors
//! into a lowered loop plan the driver (§4.E) can walk blindly.
//!
//! Grounded on spec.md §4.D's two-stage description (build a right-aligned
//! index space, then lower it into a linear dimension list) — there is no
//! teacher equivalent (the pack's tensor frameworks dispatch straight to a
//! backend without an intermediate planner), so the module is original to
//! this crate, built in the idiom of the teacher's small, struct-returning
//! builder functions (see `backend.rs`'s `Backend::new`).

pub mod broadcast;
pub mod contraction;
pub mod reduction;

pub use broadcast::{build_broadcast_plan, BroadcastPlan};
pub use contraction::{build_contraction_plan, ContractionPlan, GemmLikeDesc};
pub use reduction::{build_reduction_plan, ReductionPlan};

/// One lowered loop dimension: an extent shared by every operand at this
/// level, and a per-operand byte stride (0 for a broadcast axis).
///
/// `byte_strides` is ordered input-operands-first, output last, for every
/// plan variant in this module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopDim {
    pub extent: usize,
    pub byte_strides: Vec<isize>,
}

impl LoopDim {
    pub fn new(extent: usize, byte_strides: Vec<isize>) -> Self {
        LoopDim {
            extent,
            byte_strides,
        }
    }
}

pub(crate) fn contiguous_byte_strides(shape: &[usize], itemsize: usize) -> Vec<isize> {
    let mut strides = vec![0isize; shape.len()];
    let mut acc: isize = itemsize as isize;
    for i in (0..shape.len()).rev() {
        strides[i] = acc;
        acc = acc.saturating_mul(shape[i].max(1) as isize);
    }
    strides
}
