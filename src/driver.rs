//! The iteration driver (§4.E): walks a lowered plan with raw per-operand
//! pointers, dispatching to a kernel's contiguous entry wherever strides
//! allow and falling back to a strided scalar loop otherwise.
//!
//! Grounded on spec.md §4.E's fast-path/general-path split; there is no
//! teacher equivalent (see `planner/mod.rs`'s module doc), so this is
//! built fresh in the idiom of the teacher's small free functions over
//! raw pointers (`frameworks`'s buffer-copy helpers), rather than as a
//! method on a larger object.

use num_traits::Zero;

use crate::dtype::TensorElement;
use crate::kernel::{BinaryKernel, ReduceKernel, UnaryKernel};
use crate::planner::LoopDim;

/// Runs a binary elementwise kernel over a lowered loop-dim list.
///
/// `base_ptrs` are `[a, b, out]`; `all_contiguous` is the plan's fast-path
/// indicator (true only when every operand is layout-identical).
pub fn drive_binary<T: TensorElement, K: BinaryKernel<T>>(
    dims: &[LoopDim],
    base_ptrs: [*mut T; 3],
    all_contiguous: bool,
) {
    if all_contiguous {
        let n: usize = dims.iter().map(|d| d.extent).product();
        // SAFETY: `all_contiguous` guarantees a flat `n`-element run
        // starting at each base pointer with no gaps (§4.E fast path).
        unsafe {
            let a = std::slice::from_raw_parts(base_ptrs[0], n);
            let b = std::slice::from_raw_parts(base_ptrs[1], n);
            let out = std::slice::from_raw_parts_mut(base_ptrs[2], n);
            K::execute_contiguous(a, b, out, n, false, false);
        }
        return;
    }

    recurse_binary::<T, K>(dims, base_ptrs);
}

fn recurse_binary<T: TensorElement, K: BinaryKernel<T>>(dims: &[LoopDim], ptrs: [*mut T; 3]) {
    let itemsize = std::mem::size_of::<T>() as isize;

    if dims.len() == 1 {
        let dim = &dims[0];
        let a_stride = dim.byte_strides[0];
        let b_stride = dim.byte_strides[1];
        let n = dim.extent;
        let a_is_scalar = a_stride == 0;
        let b_is_scalar = b_stride == 0;

        if (a_stride == 0 || a_stride == itemsize) && (b_stride == 0 || b_stride == itemsize) {
            // SAFETY: strides are 0 (scalar broadcast) or exactly one
            // element, so a flat `n`-element read/write starting at each
            // pointer stays in bounds for this innermost run (§4.E).
            unsafe {
                let a = std::slice::from_raw_parts(ptrs[0], if a_is_scalar { 1 } else { n });
                let b = std::slice::from_raw_parts(ptrs[1], if b_is_scalar { 1 } else { n });
                let out = std::slice::from_raw_parts_mut(ptrs[2], n);
                K::execute_contiguous(a, b, out, n, a_is_scalar, b_is_scalar);
            }
            return;
        }

        // Strided scalar tail: step every pointer by its byte stride.
        let mut a_ptr = ptrs[0] as *mut u8;
        let mut b_ptr = ptrs[1] as *mut u8;
        let mut out_ptr = ptrs[2] as *mut u8;
        for _ in 0..n {
            // SAFETY: each step advances by this dim's own byte stride,
            // which the planner derived from an operand whose buffer
            // covers exactly `extent` steps at that stride.
            unsafe {
                let a_val = std::ptr::read_unaligned(a_ptr as *const T);
                let b_val = std::ptr::read_unaligned(b_ptr as *const T);
                let mut out_val = std::ptr::read_unaligned(out_ptr as *const T);
                K::execute_contiguous(
                    std::slice::from_raw_parts(&a_val, 1),
                    std::slice::from_raw_parts(&b_val, 1),
                    std::slice::from_raw_parts_mut(&mut out_val, 1),
                    1,
                    false,
                    false,
                );
                std::ptr::write_unaligned(out_ptr as *mut T, out_val);
                a_ptr = a_ptr.offset(a_stride);
                b_ptr = b_ptr.offset(b_stride);
                out_ptr = out_ptr.offset(dim.byte_strides[2]);
            }
        }
        return;
    }

    let (outer, inner) = dims.split_first().unwrap();
    let mut cur = ptrs;
    for _ in 0..outer.extent {
        recurse_binary::<T, K>(inner, cur);
        // SAFETY: stepping by this level's own byte stride; rewound after
        // `extent` steps so the caller's own stepping stays correct.
        unsafe {
            cur[0] = (cur[0] as *mut u8).offset(outer.byte_strides[0]) as *mut T;
            cur[1] = (cur[1] as *mut u8).offset(outer.byte_strides[1]) as *mut T;
            cur[2] = (cur[2] as *mut u8).offset(outer.byte_strides[2]) as *mut T;
        }
    }
}

/// Runs a unary elementwise kernel over a lowered loop-dim list.
/// `base_ptrs` are `[a, out]`.
pub fn drive_unary<T: TensorElement, K: UnaryKernel<T>>(
    dims: &[LoopDim],
    base_ptrs: [*mut T; 2],
    all_contiguous: bool,
) {
    if all_contiguous {
        let n: usize = dims.iter().map(|d| d.extent).product();
        // SAFETY: see `drive_binary`'s fast path.
        unsafe {
            let a = std::slice::from_raw_parts(base_ptrs[0], n);
            let out = std::slice::from_raw_parts_mut(base_ptrs[1], n);
            K::execute_contiguous(a, out, n, false);
        }
        return;
    }
    recurse_unary::<T, K>(dims, base_ptrs);
}

fn recurse_unary<T: TensorElement, K: UnaryKernel<T>>(dims: &[LoopDim], ptrs: [*mut T; 2]) {
    let itemsize = std::mem::size_of::<T>() as isize;

    if dims.len() == 1 {
        let dim = &dims[0];
        let a_stride = dim.byte_strides[0];
        let n = dim.extent;
        let a_is_scalar = a_stride == 0;

        if a_stride == 0 || a_stride == itemsize {
            // SAFETY: see `recurse_binary`'s analogous fast branch.
            unsafe {
                let a = std::slice::from_raw_parts(ptrs[0], if a_is_scalar { 1 } else { n });
                let out = std::slice::from_raw_parts_mut(ptrs[1], n);
                K::execute_contiguous(a, out, n, a_is_scalar);
            }
            return;
        }

        let mut a_ptr = ptrs[0] as *mut u8;
        let mut out_ptr = ptrs[1] as *mut u8;
        for _ in 0..n {
            // SAFETY: see `recurse_binary`'s strided tail.
            unsafe {
                let a_val = std::ptr::read_unaligned(a_ptr as *const T);
                let mut out_val = std::ptr::read_unaligned(out_ptr as *const T);
                K::execute_contiguous(
                    std::slice::from_raw_parts(&a_val, 1),
                    std::slice::from_raw_parts_mut(&mut out_val, 1),
                    1,
                    false,
                );
                std::ptr::write_unaligned(out_ptr as *mut T, out_val);
                a_ptr = a_ptr.offset(a_stride);
                out_ptr = out_ptr.offset(dim.byte_strides[1]);
            }
        }
        return;
    }

    let (outer, inner) = dims.split_first().unwrap();
    let mut cur = ptrs;
    for _ in 0..outer.extent {
        recurse_unary::<T, K>(inner, cur);
        // SAFETY: see `recurse_binary`'s outer rewind.
        unsafe {
            cur[0] = (cur[0] as *mut u8).offset(outer.byte_strides[0]) as *mut T;
            cur[1] = (cur[1] as *mut u8).offset(outer.byte_strides[1]) as *mut T;
        }
    }
}

/// Runs a reduction kernel over a lowered reduction plan's dims.
/// `base_ptrs` are `[input, output]`; the last dim in `dims` is always the
/// reduction axis (§4.D's reduction rule).
pub fn drive_reduce<T: TensorElement, K: ReduceKernel<T>>(dims: &[LoopDim], base_ptrs: [*mut T; 2]) {
    recurse_reduce::<T, K>(dims, base_ptrs);
}

fn recurse_reduce<T: TensorElement, K: ReduceKernel<T>>(dims: &[LoopDim], ptrs: [*mut T; 2]) {
    let itemsize = std::mem::size_of::<T>() as isize;

    if dims.len() == 1 {
        let dim = &dims[0];
        let n = dim.extent;
        let input_stride = dim.byte_strides[0];

        // SAFETY: the reduction axis is fully contracted into one output
        // element at `ptrs[1]` (§4.E: `reduce_contiguous` only applies
        // when the whole inner dimension collapses to a single element).
        let result = if input_stride == itemsize {
            unsafe {
                let a = std::slice::from_raw_parts(ptrs[0], n);
                K::reduce_contiguous(a, n)
            }
        } else {
            let mut acc = T::zero();
            let mut a_ptr = ptrs[0] as *const u8;
            for _ in 0..n {
                // SAFETY: stepping by this dim's own input byte stride.
                unsafe {
                    acc = acc + std::ptr::read_unaligned(a_ptr as *const T);
                    a_ptr = a_ptr.offset(input_stride);
                }
            }
            acc
        };

        // SAFETY: `ptrs[1]` points at the single output element this
        // (possibly nested) reduction run accumulates into.
        unsafe {
            *ptrs[1] = result;
        }
        return;
    }

    let (outer, inner) = dims.split_first().unwrap();
    let mut cur = ptrs;
    for _ in 0..outer.extent {
        recurse_reduce::<T, K>(inner, cur);
        // SAFETY: see `recurse_binary`'s outer rewind.
        unsafe {
            cur[0] = (cur[0] as *mut u8).offset(outer.byte_strides[0]) as *mut T;
            cur[1] = (cur[1] as *mut u8).offset(outer.byte_strides[1]) as *mut T;
        }
    }
}

/// Runs a general (non-GEMM-like) contraction: nested loops over the free
/// axes, multiply-accumulating over the reduction axes into each output
/// element. `base_ptrs` are `[a, b, out]`; this is the "reference
/// three-loop implementation" fallback §4.F describes for contractions
/// the planner couldn't line up with a GEMM call.
pub fn drive_contraction<T: TensorElement>(outer: &[LoopDim], inner: &[LoopDim], base_ptrs: [*mut T; 3]) {
    recurse_contraction_outer(outer, inner, base_ptrs);
}

fn recurse_contraction_outer<T: TensorElement>(outer: &[LoopDim], inner: &[LoopDim], ptrs: [*mut T; 3]) {
    let Some((dim, rest)) = outer.split_first() else {
        // SAFETY: `ptrs[2]` is the single output element this (possibly
        // nested) outer iteration accumulates into.
        unsafe {
            *ptrs[2] = T::zero();
        }
        recurse_contraction_inner(inner, ptrs);
        return;
    };

    let mut cur = ptrs;
    for _ in 0..dim.extent {
        recurse_contraction_outer(rest, inner, cur);
        // SAFETY: stepping by this dim's own byte stride, rewound after
        // `extent` steps.
        unsafe {
            cur[0] = (cur[0] as *mut u8).offset(dim.byte_strides[0]) as *mut T;
            cur[1] = (cur[1] as *mut u8).offset(dim.byte_strides[1]) as *mut T;
            cur[2] = (cur[2] as *mut u8).offset(dim.byte_strides[2]) as *mut T;
        }
    }
}

fn recurse_contraction_inner<T: TensorElement>(inner: &[LoopDim], ptrs: [*mut T; 3]) {
    let Some((dim, rest)) = inner.split_first() else {
        // SAFETY: `ptrs[0]`/`ptrs[1]` point at one element each; `ptrs[2]`
        // at the accumulator for this output position.
        unsafe {
            let a = std::ptr::read_unaligned(ptrs[0] as *const T);
            let b = std::ptr::read_unaligned(ptrs[1] as *const T);
            *ptrs[2] = a * b;
        }
        return;
    };

    let mut cur = [ptrs[0], ptrs[1]];
    for _ in 0..dim.extent {
        if rest.is_empty() {
            // SAFETY: `cur[0]`/`cur[1]` point at this step's operand
            // elements; `ptrs[2]` is the shared accumulator.
            unsafe {
                let a = std::ptr::read_unaligned(cur[0] as *const T);
                let b = std::ptr::read_unaligned(cur[1] as *const T);
                *ptrs[2] = *ptrs[2] + a * b;
            }
        } else {
            recurse_contraction_inner(rest, [cur[0], cur[1], ptrs[2]]);
        }
        // SAFETY: stepping by this reduction dim's own byte stride.
        unsafe {
            cur[0] = (cur[0] as *mut u8).offset(dim.byte_strides[0]) as *mut T;
            cur[1] = (cur[1] as *mut u8).offset(dim.byte_strides[1]) as *mut T;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{Add, SumReduce};
    use crate::planner::LoopDim;

    #[test]
    fn binary_fast_path_matches_general_path() {
        let mut a = [1.0f32, 2.0, 3.0, 4.0];
        let mut b = [10.0f32, 20.0, 30.0, 40.0];
        let mut out_fast = [0.0f32; 4];
        let mut out_general = [0.0f32; 4];

        let dims = vec![LoopDim::new(4, vec![4, 4, 4])];
        drive_binary::<f32, Add>(
            &dims,
            [a.as_mut_ptr(), b.as_mut_ptr(), out_fast.as_mut_ptr()],
            true,
        );
        drive_binary::<f32, Add>(
            &dims,
            [a.as_mut_ptr(), b.as_mut_ptr(), out_general.as_mut_ptr()],
            false,
        );
        assert_eq!(out_fast, out_general);
        assert_eq!(out_fast, [11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn reduce_over_nested_dims_sums_everything() {
        let mut a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let mut out = [0.0f32; 2];
        // shape [2, 3]: outer dim over rows (stride 12 bytes), inner dim
        // is the reduction axis (stride 4 bytes, contiguous).
        let dims = vec![LoopDim::new(2, vec![12, 4]), LoopDim::new(3, vec![4, 0])];
        drive_reduce::<f32, SumReduce>(&dims, [a.as_mut_ptr(), out.as_mut_ptr()]);
        assert_eq!(out, [6.0, 15.0]);
    }

    #[test]
    fn contraction_two_by_two_matmul() {
        // a: [[1, 2], [3, 4]], b: [[5, 6], [7, 8]] -> a @ b
        let mut a = [1.0f32, 2.0, 3.0, 4.0];
        let mut b = [5.0f32, 6.0, 7.0, 8.0];
        let mut out = [0.0f32; 4];
        let outer = vec![
            LoopDim::new(2, vec![8, 0, 8]),
            LoopDim::new(2, vec![0, 4, 4]),
        ];
        let inner = vec![LoopDim::new(2, vec![4, 8])];
        drive_contraction::<f32>(
            &outer,
            &inner,
            [a.as_mut_ptr(), b.as_mut_ptr(), out.as_mut_ptr()],
        );
        assert_eq!(out, [19.0, 22.0, 43.0, 50.0]);
    }
}
