//! Binary elementwise kernels (§4.F, §4.I's Add/Sub/Mul/Div/Maximum/
//! GreaterThan/Pow forward rows).

use num_traits::{One, Zero};

use crate::dtype::TensorElement;
use crate::kernel::simd::binary_unrolled4;
use crate::kernel::BinaryKernel;

macro_rules! binary_kernel {
    ($name:ident, $op:expr) => {
        /// See module docs.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl<T: TensorElement> BinaryKernel<T> for $name {
            fn execute_contiguous(
                a: &[T],
                b: &[T],
                out: &mut [T],
                n: usize,
                a_is_scalar: bool,
                b_is_scalar: bool,
            ) {
                binary_unrolled4(a, b, out, n, a_is_scalar, b_is_scalar, $op);
            }
        }
    };
}

binary_kernel!(Add, |x: T, y: T| x + y);
binary_kernel!(Sub, |x: T, y: T| x - y);
binary_kernel!(Mul, |x: T, y: T| x * y);
binary_kernel!(Div, |x: T, y: T| x / y);
binary_kernel!(Pow, |x: T, y: T| x.powf(y));
binary_kernel!(Maximum, |x: T, y: T| if x >= y { x } else { y });
binary_kernel!(GreaterThan, |x: T, y: T| if x > y { T::one() } else {
    T::zero()
});
binary_kernel!(GreaterOrEqual, |x: T, y: T| if x >= y { T::one() } else {
    T::zero()
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_unrolled_matches_scalar_loop() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0];
        let b = [10.0f32, 20.0, 30.0, 40.0, 50.0];
        let mut out = [0.0f32; 5];
        Add::execute_contiguous(&a, &b, &mut out, 5, false, false);
        assert_eq!(out, [11.0, 22.0, 33.0, 44.0, 55.0]);
    }

    #[test]
    fn scalar_broadcast_reads_first_element_only() {
        let a = [1.0f32, 2.0, 3.0];
        let b = [10.0f32];
        let mut out = [0.0f32; 3];
        Mul::execute_contiguous(&a, &b, &mut out, 3, false, true);
        assert_eq!(out, [10.0, 20.0, 30.0]);
    }

    #[test]
    fn greater_than_yields_zero_one() {
        let a = [1.0f32, 5.0];
        let b = [2.0f32, 5.0];
        let mut out = [0.0f32; 2];
        GreaterThan::execute_contiguous(&a, &b, &mut out, 2, false, false);
        assert_eq!(out, [0.0, 0.0]);
    }
}
