//! The BLAS trait (§4.F): dispatches a recognised `GemmLikeDesc` to a
//! batched row-major GEMM.
//!
//! Grounded on the teacher's own `rblas`/BLAS-binding dependency pattern
//! (the pack's tensor frameworks all reach for an external GEMM rather
//! than hand-rolling one) — modernised to the `matrixmultiply` crate,
//! which ships the "reference three-loop implementation" §4.F asks for
//! when no vendor BLAS (Accelerate/cblas) is linked, without requiring a
//! system BLAS dependency at all.

use num_traits::{One, Zero};

use crate::dtype::TensorElement;
use crate::planner::GemmLikeDesc;

/// A [`TensorElement`] `matrixmultiply` has a native GEMM entry point for.
pub trait BlasKernel: TensorElement {
    /// # Safety
    ///
    /// `a`, `b`, `c` must each point to at least `m * k`, `k * n`, and
    /// `m * n` valid elements respectively, accounting for `rs`/`cs`
    /// strides (given in elements, not bytes).
    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: Self,
        a: *const Self,
        rsa: isize,
        csa: isize,
        b: *const Self,
        rsb: isize,
        csb: isize,
        beta: Self,
        c: *mut Self,
        rsc: isize,
        csc: isize,
    );
}

impl BlasKernel for f32 {
    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: f32,
        a: *const f32,
        rsa: isize,
        csa: isize,
        b: *const f32,
        rsb: isize,
        csb: isize,
        beta: f32,
        c: *mut f32,
        rsc: isize,
        csc: isize,
    ) {
        unsafe {
            matrixmultiply::sgemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc);
        }
    }
}

impl BlasKernel for f64 {
    unsafe fn gemm(
        m: usize,
        k: usize,
        n: usize,
        alpha: f64,
        a: *const f64,
        rsa: isize,
        csa: isize,
        b: *const f64,
        rsb: isize,
        csb: isize,
        beta: f64,
        c: *mut f64,
        rsc: isize,
        csc: isize,
    ) {
        unsafe {
            matrixmultiply::dgemm(m, k, n, alpha, a, rsa, csa, b, rsb, csb, beta, c, rsc, csc);
        }
    }
}

/// Executes a recognised batched matmul over flat element slices, per the
/// strides in `desc`.
pub fn execute_gemm_like<T: BlasKernel>(desc: &GemmLikeDesc, a: &[T], b: &[T], out: &mut [T]) {
    let itemsize = std::mem::size_of::<T>() as isize;
    let rsa = desc.a_row_stride / itemsize;
    let csa = desc.a_col_stride / itemsize;
    let rsb = desc.b_row_stride / itemsize;
    let csb = desc.b_col_stride / itemsize;
    let rsc = desc.c_row_stride / itemsize;
    let csc = desc.c_col_stride / itemsize;

    let a_batch_elems = desc.a_batch_stride / itemsize;
    let b_batch_elems = desc.b_batch_stride / itemsize;
    let c_batch_elems = desc.c_batch_stride / itemsize;

    for batch in 0..desc.batch {
        // SAFETY: each batch slice stays within `a`/`b`/`out` because the
        // planner only ever emits `GemmLikeDesc`s whose batch/row/col
        // strides describe a fully in-bounds view of the operand it was
        // built from (§4.D).
        let a_ptr = unsafe { a.as_ptr().offset(batch as isize * a_batch_elems) };
        let b_ptr = unsafe { b.as_ptr().offset(batch as isize * b_batch_elems) };
        let c_ptr = unsafe { out.as_mut_ptr().offset(batch as isize * c_batch_elems) };

        // SAFETY: see `BlasKernel::gemm`'s contract; strides and extents
        // both come from `desc`, which was built from the same operand
        // descriptors that produced `a`/`b`/`out`.
        unsafe {
            T::gemm(
                desc.m,
                desc.k,
                desc.n,
                T::one(),
                a_ptr,
                rsa,
                csa,
                b_ptr,
                rsb,
                csb,
                T::zero(),
                c_ptr,
                rsc,
                csc,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_two_identity_matmul() {
        let desc = GemmLikeDesc {
            batch: 1,
            m: 2,
            n: 2,
            k: 2,
            a_batch_stride: 0,
            b_batch_stride: 0,
            c_batch_stride: 0,
            a_row_stride: (2 * std::mem::size_of::<f32>()) as isize,
            a_col_stride: std::mem::size_of::<f32>() as isize,
            b_row_stride: (2 * std::mem::size_of::<f32>()) as isize,
            b_col_stride: std::mem::size_of::<f32>() as isize,
            c_row_stride: (2 * std::mem::size_of::<f32>()) as isize,
            c_col_stride: std::mem::size_of::<f32>() as isize,
        };
        let a = [1.0f32, 2.0, 3.0, 4.0];
        let identity = [1.0f32, 0.0, 0.0, 1.0];
        let mut out = [0.0f32; 4];
        execute_gemm_like(&desc, &a, &identity, &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }
}
