//! Unary elementwise kernels (§4.F, §4.I's Exp/Log/Sqrt forward rows).

use crate::dtype::TensorElement;
use crate::kernel::simd::unary_unrolled4;
use crate::kernel::UnaryKernel;

macro_rules! unary_kernel {
    ($name:ident, $op:expr) => {
        /// See module docs.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl<T: TensorElement> UnaryKernel<T> for $name {
            fn execute_contiguous(a: &[T], out: &mut [T], n: usize, a_is_scalar: bool) {
                unary_unrolled4(a, out, n, a_is_scalar, $op);
            }
        }
    };
}

unary_kernel!(Exp, |x: T| x.exp());
unary_kernel!(Ln, |x: T| x.ln());
unary_kernel!(Sqrt, |x: T| x.sqrt());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_unrolled_tail_is_exact() {
        let a = [4.0f64, 9.0, 16.0, 25.0, 36.0];
        let mut out = [0.0f64; 5];
        Sqrt::execute_contiguous(&a, &mut out, 5, false);
        assert_eq!(out, [2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn exp_of_zero_is_one() {
        let a = [0.0f32];
        let mut out = [0.0f32; 1];
        Exp::execute_contiguous(&a, &mut out, 1, false);
        assert_eq!(out, [1.0]);
    }
}
