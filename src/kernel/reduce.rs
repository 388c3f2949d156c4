//! Horizontal reduction kernels (§4.F, §4.I's Sum/Mean forward rows).

use crate::dtype::TensorElement;
use crate::kernel::simd::horizontal_sum_unrolled4;
use crate::kernel::ReduceKernel;

/// Sums `n` contiguous elements. `Mean` reuses this and divides by `n`
/// rather than carrying its own kernel (§4.I: "Mean: sum/N").
#[derive(Debug, Clone, Copy, Default)]
pub struct SumReduce;

impl<T: TensorElement> ReduceKernel<T> for SumReduce {
    fn reduce_contiguous(a: &[T], n: usize) -> T {
        horizontal_sum_unrolled4(a, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_across_unroll_boundary() {
        let a = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        assert_eq!(SumReduce::reduce_contiguous(&a, 7), 28.0);
    }
}
