//! The operator registry (§4.I): per-op forward/backward pairs and the
//! type-erased node shape the graph stores.
//!
//! Grounded on `original_source/fusion/src/Fusion/autodiff/Engine.h`'s
//! operator dispatch (a closed set of op kinds rather than a trait-object
//! registry, since the op set here is fixed and small) and on spec.md
//! §4.I's forward/backward table, which this module implements almost
//! verbatim per row.

use std::collections::HashMap;

use num_traits::{NumCast, One};

use crate::autodiff::graph::ValueId;
use crate::dtype::TensorElement;
use crate::error::AutogradError;
use crate::kernel::BlasKernel;
use crate::tensor::Tensor;

/// Which operator a node represents, carrying whatever static parameters
/// the op needs (an axis, a pair of axes to swap) inline rather than in
/// the context, since these are known at `apply` time and never computed
/// from saved tensors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpKind {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Maximum,
    GreaterThan,
    Exp,
    Log,
    Sqrt,
    Sum { axis: usize, keepdim: bool },
    Mean { axis: usize, keepdim: bool },
    MatMul,
    SwapAxes { i: usize, j: usize },
}

impl OpKind {
    /// The stable textual name used in error messages (§4.I).
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Add => "add",
            OpKind::Sub => "sub",
            OpKind::Mul => "mul",
            OpKind::Div => "div",
            OpKind::Pow => "pow",
            OpKind::Maximum => "maximum",
            OpKind::GreaterThan => "greater_than",
            OpKind::Exp => "exp",
            OpKind::Log => "log",
            OpKind::Sqrt => "sqrt",
            OpKind::Sum { .. } => "sum",
            OpKind::Mean { .. } => "mean",
            OpKind::MatMul => "matmul",
            OpKind::SwapAxes { .. } => "swap_axes",
        }
    }
}

/// A type-erased node wrapping a concrete [`OpKind`] (§4.I, §4.H).
#[derive(Clone, Debug)]
pub struct OpNode {
    pub kind: OpKind,
    pub inputs: Vec<ValueId>,
    pub outputs: Vec<ValueId>,
}

/// Something an op's forward pass can stash for its own backward pass
/// (§4.I: "the context saves values in a keyed map").
enum Saved<T: TensorElement> {
    Tensor(Tensor<T>),
    Shape(Vec<usize>),
}

/// An op's keyed save/restore scratch space, one instance per node.
#[derive(Default)]
pub struct Context<T: TensorElement> {
    entries: HashMap<&'static str, Saved<T>>,
}

impl<T: TensorElement> Context<T> {
    pub fn new() -> Self {
        Context {
            entries: HashMap::new(),
        }
    }

    fn save_tensor(&mut self, key: &'static str, value: Tensor<T>) {
        self.entries.insert(key, Saved::Tensor(value));
    }

    fn save_shape(&mut self, key: &'static str, value: Vec<usize>) {
        self.entries.insert(key, Saved::Shape(value));
    }

    fn tensor(&self, op: &'static str, key: &'static str) -> Result<&Tensor<T>, AutogradError> {
        match self.entries.get(key) {
            Some(Saved::Tensor(t)) => Ok(t),
            _ => Err(AutogradError::MissingContext { op, key }),
        }
    }

    fn shape(&self, op: &'static str, key: &'static str) -> Result<&[usize], AutogradError> {
        match self.entries.get(key) {
            Some(Saved::Shape(s)) => Ok(s),
            _ => Err(AutogradError::MissingContext { op, key }),
        }
    }
}

fn wrap<T>(op: &'static str) -> impl Fn(crate::error::TensorError) -> AutogradError + Copy {
    move |source| AutogradError::TensorOpFailed { op, source }
}

/// `-t`, built from the tensor ops already on hand rather than adding a
/// dedicated negate kernel for one caller.
fn negate<T: TensorElement>(t: &Tensor<T>) -> Result<Tensor<T>, crate::error::TensorError> {
    t.zeros_like()
        .map_err(|_| crate::error::TensorError::ShapeMismatch {
            expected: t.len(),
            actual: 0,
        })?
        .sub(t)
}

/// Re-expands a reduced-axis gradient back to `input_shape` (§4.I:
/// "broadcast g back to input shape along reduced axis").
fn broadcast_back<T: TensorElement>(
    g: &Tensor<T>,
    input_shape: &[usize],
    axis: usize,
    keepdim: bool,
) -> Result<Tensor<T>, crate::error::TensorError> {
    let expanded = if keepdim { g.clone() } else { g.insert_axis(axis)? };
    let ones = Tensor::ones(input_shape.to_vec()).map_err(|_| crate::error::TensorError::ShapeMismatch {
        expected: input_shape.iter().product(),
        actual: 0,
    })?;
    ones.mul(&expanded)
}

/// Runs `kind`'s forward pass, saving whatever `kind`'s backward will need
/// into `ctx`, and returns its outputs (§4.I).
pub fn forward<T: TensorElement + BlasKernel>(
    kind: &OpKind,
    inputs: &[Tensor<T>],
    ctx: &mut Context<T>,
) -> Result<Vec<Tensor<T>>, AutogradError> {
    let op = kind.name();
    let err = wrap::<T>(op);
    match kind {
        OpKind::Add => Ok(vec![inputs[0].add(&inputs[1]).map_err(err)?]),
        OpKind::Sub => Ok(vec![inputs[0].sub(&inputs[1]).map_err(err)?]),
        OpKind::Mul => {
            ctx.save_tensor("a", inputs[0].clone());
            ctx.save_tensor("b", inputs[1].clone());
            Ok(vec![inputs[0].mul(&inputs[1]).map_err(err)?])
        }
        OpKind::Div => {
            ctx.save_tensor("a", inputs[0].clone());
            ctx.save_tensor("b", inputs[1].clone());
            Ok(vec![inputs[0].div(&inputs[1]).map_err(err)?])
        }
        OpKind::Pow => {
            ctx.save_tensor("a", inputs[0].clone());
            ctx.save_tensor("b", inputs[1].clone());
            let y = inputs[0].pow(&inputs[1]).map_err(err)?;
            ctx.save_tensor("y", y.clone());
            Ok(vec![y])
        }
        OpKind::Maximum => {
            ctx.save_tensor("a", inputs[0].clone());
            ctx.save_tensor("b", inputs[1].clone());
            Ok(vec![inputs[0].maximum(&inputs[1]).map_err(err)?])
        }
        OpKind::GreaterThan => {
            ctx.save_shape("a_shape", inputs[0].shape().to_vec());
            ctx.save_shape("b_shape", inputs[1].shape().to_vec());
            Ok(vec![inputs[0].greater_than(&inputs[1]).map_err(err)?])
        }
        OpKind::Exp => {
            let y = inputs[0].exp();
            ctx.save_tensor("y", y.clone());
            Ok(vec![y])
        }
        OpKind::Log => {
            ctx.save_tensor("a", inputs[0].clone());
            Ok(vec![inputs[0].ln()])
        }
        OpKind::Sqrt => {
            let y = inputs[0].sqrt();
            ctx.save_tensor("y", y.clone());
            Ok(vec![y])
        }
        OpKind::Sum { axis, keepdim } => {
            ctx.save_shape("input_shape", inputs[0].shape().to_vec());
            Ok(vec![inputs[0].sum(*axis, *keepdim).map_err(err)?])
        }
        OpKind::Mean { axis, keepdim } => {
            ctx.save_shape("input_shape", inputs[0].shape().to_vec());
            Ok(vec![inputs[0].mean(*axis, *keepdim).map_err(err)?])
        }
        OpKind::MatMul => {
            ctx.save_tensor("a", inputs[0].clone());
            ctx.save_tensor("b", inputs[1].clone());
            Ok(vec![inputs[0].matmul(&inputs[1]).map_err(err)?])
        }
        OpKind::SwapAxes { i, j } => Ok(vec![inputs[0].swap_axes(*i, *j).map_err(err)?]),
    }
}

/// Runs `kind`'s backward pass given the accumulated output gradients,
/// returning one gradient per forward input (§4.I).
pub fn backward<T: TensorElement + BlasKernel>(
    kind: &OpKind,
    ctx: &Context<T>,
    grad_outputs: &[Tensor<T>],
) -> Result<Vec<Tensor<T>>, AutogradError> {
    let op = kind.name();
    let err = wrap::<T>(op);
    let g = &grad_outputs[0];
    match kind {
        OpKind::Add => Ok(vec![g.clone(), g.clone()]),
        OpKind::Sub => Ok(vec![g.clone(), negate(g).map_err(err)?]),
        OpKind::Mul => {
            let a = ctx.tensor(op, "a")?;
            let b = ctx.tensor(op, "b")?;
            Ok(vec![g.mul(b).map_err(err)?, g.mul(a).map_err(err)?])
        }
        OpKind::Div => {
            let a = ctx.tensor(op, "a")?;
            let b = ctx.tensor(op, "b")?;
            let grad_a = g.div(b).map_err(err)?;
            let b_sq = b.mul(b).map_err(err)?;
            let grad_b = negate(&g.mul(a).map_err(err)?.div(&b_sq).map_err(err)?).map_err(err)?;
            Ok(vec![grad_a, grad_b])
        }
        OpKind::Pow => {
            let a = ctx.tensor(op, "a")?;
            let b = ctx.tensor(op, "b")?;
            let y = ctx.tensor(op, "y")?;
            let ones = b.ones_like().map_err(|_| AutogradError::TensorOpFailed {
                op,
                source: crate::error::TensorError::ShapeMismatch { expected: b.len(), actual: 0 },
            })?;
            let b_minus_one = b.sub(&ones).map_err(err)?;
            let a_pow_b_minus_one = a.pow(&b_minus_one).map_err(err)?;
            let grad_a = b.mul(&a_pow_b_minus_one).map_err(err)?.mul(g).map_err(err)?;
            let grad_b = y.mul(&a.ln()).map_err(err)?.mul(g).map_err(err)?;
            Ok(vec![grad_a, grad_b])
        }
        OpKind::Maximum => {
            let a = ctx.tensor(op, "a")?;
            let b = ctx.tensor(op, "b")?;
            let a_wins = a.greater_or_equal(b).map_err(err)?;
            let b_wins = b.greater_than(a).map_err(err)?;
            Ok(vec![g.mul(&a_wins).map_err(err)?, g.mul(&b_wins).map_err(err)?])
        }
        OpKind::GreaterThan => {
            let a_shape = ctx.shape(op, "a_shape")?.to_vec();
            let b_shape = ctx.shape(op, "b_shape")?.to_vec();
            let as_zero_err = |_| AutogradError::TensorOpFailed {
                op,
                source: crate::error::TensorError::ShapeMismatch { expected: 0, actual: 0 },
            };
            let zero_a = Tensor::zeros(a_shape).map_err(as_zero_err)?;
            let zero_b = Tensor::zeros(b_shape).map_err(as_zero_err)?;
            Ok(vec![zero_a, zero_b])
        }
        OpKind::Exp => {
            let y = ctx.tensor(op, "y")?;
            Ok(vec![g.mul(y).map_err(err)?])
        }
        OpKind::Log => {
            let a = ctx.tensor(op, "a")?;
            Ok(vec![g.div(a).map_err(err)?])
        }
        OpKind::Sqrt => {
            let y = ctx.tensor(op, "y")?;
            let two = Tensor::scalar_t(T::one() + T::one()).map_err(|_| AutogradError::TensorOpFailed {
                op,
                source: crate::error::TensorError::ShapeMismatch { expected: 1, actual: 0 },
            })?;
            Ok(vec![g.div(&y.mul(&two).map_err(err)?).map_err(err)?])
        }
        OpKind::Sum { axis, keepdim } => {
            let input_shape = ctx.shape(op, "input_shape")?;
            Ok(vec![broadcast_back(g, input_shape, *axis, *keepdim).map_err(err)?])
        }
        OpKind::Mean { axis, keepdim } => {
            let input_shape = ctx.shape(op, "input_shape")?;
            let n = T::from(input_shape[*axis]).expect("axis extent fits in the tensor's element type");
            let scaled = g.div(&Tensor::scalar_t(n).map_err(|_| AutogradError::TensorOpFailed {
                op,
                source: crate::error::TensorError::ShapeMismatch { expected: 1, actual: 0 },
            })?)
            .map_err(err)?;
            Ok(vec![broadcast_back(&scaled, input_shape, *axis, *keepdim).map_err(err)?])
        }
        OpKind::MatMul => {
            let a = ctx.tensor(op, "a")?;
            let b = ctx.tensor(op, "b")?;
            let last = a.rank() - 1;
            let b_t = b.swap_axes(last - 1, last).map_err(err)?;
            let a_t = a.swap_axes(last - 1, last).map_err(err)?;
            Ok(vec![g.matmul(&b_t).map_err(err)?, a_t.matmul(g).map_err(err)?])
        }
        OpKind::SwapAxes { i, j } => Ok(vec![g.swap_axes(*i, *j).map_err(err)?]),
    }
}

/// `forward`/`backward`'s input count must match `OpNode::inputs.len()`;
/// this is checked by the engine, not here (§4.I: "backward arity must
/// equal forward input count; a mismatch is `ArityMismatch`").
pub fn expected_arity(kind: &OpKind) -> usize {
    match kind {
        OpKind::Add
        | OpKind::Sub
        | OpKind::Mul
        | OpKind::Div
        | OpKind::Pow
        | OpKind::Maximum
        | OpKind::GreaterThan
        | OpKind::MatMul => 2,
        OpKind::Exp | OpKind::Log | OpKind::Sqrt | OpKind::Sum { .. } | OpKind::Mean { .. } | OpKind::SwapAxes { .. } => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_backward_uses_the_swapped_operand() {
        let a = Tensor::<f32>::from_data(vec![2], vec![2.0, 3.0]).unwrap();
        let b = Tensor::<f32>::from_data(vec![2], vec![10.0, 20.0]).unwrap();
        let mut ctx = Context::new();
        let out = forward(&OpKind::Mul, &[a, b], &mut ctx).unwrap();
        assert_eq!(out[0].iter().collect::<Vec<_>>(), vec![20.0, 60.0]);

        let g = Tensor::<f32>::ones(vec![2]).unwrap();
        let grads = backward(&OpKind::Mul, &ctx, &[g]).unwrap();
        assert_eq!(grads[0].iter().collect::<Vec<_>>(), vec![10.0, 20.0]);
        assert_eq!(grads[1].iter().collect::<Vec<_>>(), vec![2.0, 3.0]);
    }

    #[test]
    fn sum_backward_broadcasts_to_the_input_shape() {
        let a = Tensor::<f32>::from_data(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let mut ctx = Context::new();
        let out = forward(&OpKind::Sum { axis: 1, keepdim: false }, &[a], &mut ctx).unwrap();
        assert_eq!(out[0].shape(), &[2]);

        let g = Tensor::<f32>::ones(vec![2]).unwrap();
        let grads = backward(&OpKind::Sum { axis: 1, keepdim: false }, &ctx, &[g]).unwrap();
        assert_eq!(grads[0].shape(), &[2, 3]);
        assert_eq!(grads[0].iter().collect::<Vec<_>>(), vec![1.0; 6]);
    }

    #[test]
    fn missing_context_key_is_reported() {
        let ctx: Context<f32> = Context::new();
        let err = ctx.tensor("mul", "a").unwrap_err();
        assert!(matches!(err, AutogradError::MissingContext { op: "mul", key: "a" }));
    }
}
