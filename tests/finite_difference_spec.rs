//! Central-difference gradient checks for every registered differentiable
//! operator (§8: "for every op, analytic and numeric gradients agree to
//! within a small tolerance").

use approx::assert_relative_eq;
use tensorforge::autodiff::{Engine, OpKind};
use tensorforge::Tensor;

const EPS: f32 = 1e-3;
const TOL: f32 = 5e-2;

fn eval_unary<F: Fn(&Tensor<f32>) -> Tensor<f32>>(shape: Vec<usize>, data: &[f32], f: F) -> f32 {
    let t = Tensor::from_data(shape, data.to_vec()).unwrap();
    f(&t).iter().next().unwrap()
}

fn numeric_grad_unary<F: Fn(&Tensor<f32>) -> Tensor<f32> + Copy>(shape: Vec<usize>, data: &[f32], f: F) -> Vec<f32> {
    (0..data.len())
        .map(|i| {
            let mut plus = data.to_vec();
            plus[i] += EPS;
            let mut minus = data.to_vec();
            minus[i] -= EPS;
            let fp = eval_unary(shape.clone(), &plus, f);
            let fm = eval_unary(shape.clone(), &minus, f);
            (fp - fm) / (2.0 * EPS)
        })
        .collect()
}

fn eval_binary<F: Fn(&Tensor<f32>, &Tensor<f32>) -> Tensor<f32>>(
    shape: Vec<usize>,
    xv: &[f32],
    yv: &[f32],
    f: F,
) -> f32 {
    let x = Tensor::from_data(shape.clone(), xv.to_vec()).unwrap();
    let y = Tensor::from_data(shape, yv.to_vec()).unwrap();
    f(&x, &y).iter().next().unwrap()
}

fn numeric_grad_binary<F: Fn(&Tensor<f32>, &Tensor<f32>) -> Tensor<f32> + Copy>(
    shape: Vec<usize>,
    xv: &[f32],
    yv: &[f32],
    f: F,
) -> (Vec<f32>, Vec<f32>) {
    let gx = (0..xv.len())
        .map(|i| {
            let mut plus = xv.to_vec();
            plus[i] += EPS;
            let mut minus = xv.to_vec();
            minus[i] -= EPS;
            let fp = eval_binary(shape.clone(), &plus, yv, f);
            let fm = eval_binary(shape.clone(), &minus, yv, f);
            (fp - fm) / (2.0 * EPS)
        })
        .collect();
    let gy = (0..yv.len())
        .map(|i| {
            let mut plus = yv.to_vec();
            plus[i] += EPS;
            let mut minus = yv.to_vec();
            minus[i] -= EPS;
            let fp = eval_binary(shape.clone(), xv, &plus, f);
            let fm = eval_binary(shape.clone(), xv, &minus, f);
            (fp - fm) / (2.0 * EPS)
        })
        .collect();
    (gx, gy)
}

mod finite_difference_spec {
    use super::*;

    #[test]
    fn div_matches_its_central_difference() {
        let xv = [4.0f32, 9.0, 16.0];
        let yv = [2.0f32, 3.0, 5.0];
        let (num_gx, num_gy) = numeric_grad_binary(vec![3], &xv, &yv, |x, y| x.div(y).unwrap().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let y = engine.track_input(Tensor::from_data(vec![3], yv.to_vec()).unwrap(), true);
        let q = engine.apply(OpKind::Div, &[x, y]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[q]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_gx) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
        for (a, b) in result.get(y).unwrap().iter().zip(num_gy) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn pow_matches_its_central_difference() {
        let xv = [1.5f32, 2.0, 2.5];
        let yv = [2.0f32, 3.0, 1.5];
        let (num_gx, num_gy) = numeric_grad_binary(vec![3], &xv, &yv, |x, y| x.pow(y).unwrap().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let y = engine.track_input(Tensor::from_data(vec![3], yv.to_vec()).unwrap(), true);
        let p = engine.apply(OpKind::Pow, &[x, y]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[p]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_gx) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
        for (a, b) in result.get(y).unwrap().iter().zip(num_gy) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn maximum_matches_its_central_difference_away_from_ties() {
        let xv = [1.0f32, 5.0, 2.0];
        let yv = [3.0f32, 1.0, 9.0];
        let (num_gx, num_gy) =
            numeric_grad_binary(vec![3], &xv, &yv, |x, y| x.maximum(y).unwrap().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let y = engine.track_input(Tensor::from_data(vec![3], yv.to_vec()).unwrap(), true);
        let m = engine.apply(OpKind::Maximum, &[x, y]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[m]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_gx) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
        for (a, b) in result.get(y).unwrap().iter().zip(num_gy) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn exp_matches_its_central_difference() {
        let xv = [0.1f32, 0.5, -0.3];
        let num_g = numeric_grad_unary(vec![3], &xv, |x| x.exp().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let e = engine.apply(OpKind::Exp, &[x]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[e]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_g) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn log_matches_its_central_difference() {
        let xv = [1.0f32, 2.5, 4.0];
        let num_g = numeric_grad_unary(vec![3], &xv, |x| x.ln().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let l = engine.apply(OpKind::Log, &[x]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[l]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_g) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn sqrt_matches_its_central_difference() {
        let xv = [1.0f32, 4.0, 9.0];
        let num_g = numeric_grad_unary(vec![3], &xv, |x| x.sqrt().sum(0, false).unwrap());

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![3], xv.to_vec()).unwrap(), true);
        let s = engine.apply(OpKind::Sqrt, &[x]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[s]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_g) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn mean_matches_its_central_difference() {
        let xv = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let num_g = numeric_grad_unary(vec![2, 3], &xv, |x| {
            x.mean(0, false).unwrap().sum(0, false).unwrap()
        });

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![2, 3], xv.to_vec()).unwrap(), true);
        let m = engine.apply(OpKind::Mean { axis: 0, keepdim: false }, &[x]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[m]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_g) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }

    #[test]
    fn swap_axes_matches_its_central_difference() {
        let xv = [1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let num_g = numeric_grad_unary(vec![2, 3], &xv, |x| {
            let y = x.swap_axes(0, 1).unwrap();
            let sq = y.mul(&y).unwrap();
            sq.sum(0, false).unwrap().sum(0, false).unwrap()
        });

        let mut engine = Engine::<f32>::new();
        let x = engine.track_input(Tensor::from_data(vec![2, 3], xv.to_vec()).unwrap(), true);
        let y = engine.apply(OpKind::SwapAxes { i: 0, j: 1 }, &[x]).unwrap();
        let sq = engine.apply(OpKind::Mul, &[y, y]).unwrap();
        let s1 = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[sq]).unwrap();
        let out = engine.apply(OpKind::Sum { axis: 0, keepdim: false }, &[s1]).unwrap();
        let result = engine.backward(out, true, false).unwrap();

        for (a, b) in result.get(x).unwrap().iter().zip(num_g) {
            assert_relative_eq!(a, b, epsilon = TOL);
        }
    }
}
