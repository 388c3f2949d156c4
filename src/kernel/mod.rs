//! Per-operation kernel traits (§4.F).
//!
//! Grounded on the teacher's backend-trait split (`frameworks/*` each
//! implement a narrow capability trait per op, dispatched generically
//! rather than through one big enum) — here every op is a zero-sized
//! marker type implementing one of the three traits below, so the driver
//! (§4.E) is generic over "whatever kernel the caller picked" rather than
//! matching on an opcode.
//!
//! Spec.md names a 128-bit NEON backend as the reference SIMD
//! implementation; this crate ships one portable backend built from
//! `simd::unrolled4`, which unrolls scalar work by four the way a 128-bit
//! f32 lane width would, without depending on any platform intrinsic or
//! `target_feature` — real NEON/AVX backends are a direct drop-in behind
//! the same traits, a seam this module exists to provide.

pub mod elementwise;
pub mod gemm;
pub mod reduce;
pub mod simd;
pub mod unary;

pub use elementwise::{Add, Div, GreaterOrEqual, GreaterThan, Maximum, Mul, Pow, Sub};
pub use gemm::BlasKernel;
pub use reduce::SumReduce;
pub use unary::{Exp, Ln, Sqrt};

use crate::dtype::TensorElement;

/// A binary elementwise kernel (§4.F).
pub trait BinaryKernel<T: TensorElement> {
    /// Applies the kernel over `n` contiguous elements.
    ///
    /// `a_is_scalar`/`b_is_scalar` indicate the corresponding operand is a
    /// single broadcast value (stride 0) rather than `n` distinct
    /// elements; the kernel reads `a[0]`/`b[0]` repeatedly in that case.
    fn execute_contiguous(a: &[T], b: &[T], out: &mut [T], n: usize, a_is_scalar: bool, b_is_scalar: bool);
}

/// A unary elementwise kernel (§4.F).
pub trait UnaryKernel<T: TensorElement> {
    fn execute_contiguous(a: &[T], out: &mut [T], n: usize, a_is_scalar: bool);
}

/// A horizontal reduction kernel (§4.F).
pub trait ReduceKernel<T: TensorElement> {
    fn reduce_contiguous(a: &[T], n: usize) -> T;
}
