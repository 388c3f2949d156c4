//! The host-binding surface (§6): plain Rust traits/structs describing
//! the shapes a PyO3/napi layer would glue to, with no FFI code of its
//! own (the FFI glue itself is an explicit Non-goal).
//!
//! Grounded on the teacher's `Backend`/`Context` split (a narrow trait
//! describing the host-visible surface, implemented over the crate's own
//! types, with no marshalling baked in) and on `original_source`'s
//! `autodiff::NoGradGuard`/`grad_tape` pairing for [`GradTape`].

use std::cell::RefCell;
use std::rc::Rc;

use crate::autodiff::{self, BackwardResult, Engine, OpKind, ValueId};
use crate::dtype::TensorElement;
use crate::error::{AutogradError, TensorError};
use crate::kernel::BlasKernel;
use crate::tensor::Tensor;

/// A tensor bound into the currently installed engine's graph, or a bare
/// untracked value if no engine is installed or the op didn't need
/// tracking (§4.J's `should_trace`).
pub struct TrackedTensor<T: TensorElement + BlasKernel> {
    tensor: Tensor<T>,
    engine: Option<Rc<RefCell<Engine<T>>>>,
    value_id: Option<ValueId>,
    requires_grad: bool,
}

impl<T: TensorElement + BlasKernel> Clone for TrackedTensor<T> {
    fn clone(&self) -> Self {
        TrackedTensor {
            tensor: self.tensor.clone(),
            engine: self.engine.clone(),
            value_id: self.value_id,
            requires_grad: self.requires_grad,
        }
    }
}

impl<T: TensorElement + BlasKernel> TrackedTensor<T> {
    fn from_op(&self, other: Option<&Self>, kind: OpKind, result: Tensor<T>) -> Self {
        let requires_grad = self.requires_grad || other.is_some_and(|o| o.requires_grad);
        let engine = self.engine.clone().or_else(|| other.and_then(|o| o.engine.clone()));

        let traced = autodiff::should_trace::<T>(&[self.requires_grad, other.is_some_and(|o| o.requires_grad)]);
        if !traced {
            return TrackedTensor {
                tensor: result,
                engine,
                value_id: None,
                requires_grad,
            };
        }

        let engine_handle = match &engine {
            Some(e) => e.clone(),
            None => return TrackedTensor { tensor: result, engine: None, value_id: None, requires_grad },
        };
        let mut engine_ref = engine_handle.borrow_mut();
        let self_id = self.ensure_tracked(&mut engine_ref);
        let mut input_ids = vec![self_id];
        if let Some(other) = other {
            let other_id = other.ensure_tracked(&mut engine_ref);
            input_ids.push(other_id);
        }
        let out_id = engine_ref
            .apply(kind, &input_ids)
            .expect("forward shapes were already validated by the untracked op above");
        drop(engine_ref);

        TrackedTensor {
            tensor: result,
            engine: Some(engine_handle),
            value_id: Some(out_id),
            requires_grad,
        }
    }

    fn ensure_tracked(&self, engine: &mut Engine<T>) -> ValueId {
        match self.value_id {
            Some(id) => id,
            None => engine.track_input(self.tensor.clone(), self.requires_grad),
        }
    }

    pub fn value(&self) -> &Tensor<T> {
        &self.tensor
    }

    pub fn requires_grad(&self) -> bool {
        self.requires_grad
    }
}

/// The host-visible arithmetic/reduction/autodiff surface, delegating 1:1
/// to [`Tensor`]'s inherent methods and to the engine for tracking (§6).
pub trait HostBinding<T: TensorElement + BlasKernel>: Sized {
    fn construct(shape: Vec<usize>, data: Vec<T>, requires_grad: bool) -> Result<Self, TensorError>;
    fn add(&self, other: &Self) -> Result<Self, TensorError>;
    fn sub(&self, other: &Self) -> Result<Self, TensorError>;
    fn mul(&self, other: &Self) -> Result<Self, TensorError>;
    fn div(&self, other: &Self) -> Result<Self, TensorError>;
    fn matmul(&self, other: &Self) -> Result<Self, TensorError>;
    fn sum(&self, axis: usize, keepdim: bool) -> Result<Self, TensorError>;
    fn mean(&self, axis: usize, keepdim: bool) -> Result<Self, TensorError>;
    fn backward(&self) -> Result<BackwardResult<T>, AutogradError>;
    fn grad(&self, result: &BackwardResult<T>) -> Option<Tensor<T>>;
    fn export(&self) -> (Vec<T>, Vec<usize>);
}

impl<T: TensorElement + BlasKernel> HostBinding<T> for TrackedTensor<T> {
    fn construct(shape: Vec<usize>, data: Vec<T>, requires_grad: bool) -> Result<Self, TensorError> {
        let tensor = Tensor::from_data(shape, data)?;
        Ok(TrackedTensor {
            tensor,
            engine: autodiff::active::<T>(),
            value_id: None,
            requires_grad,
        })
    }

    fn add(&self, other: &Self) -> Result<Self, TensorError> {
        let out = self.tensor.add(&other.tensor)?;
        Ok(self.from_op(Some(other), OpKind::Add, out))
    }

    fn sub(&self, other: &Self) -> Result<Self, TensorError> {
        let out = self.tensor.sub(&other.tensor)?;
        Ok(self.from_op(Some(other), OpKind::Sub, out))
    }

    fn mul(&self, other: &Self) -> Result<Self, TensorError> {
        let out = self.tensor.mul(&other.tensor)?;
        Ok(self.from_op(Some(other), OpKind::Mul, out))
    }

    fn div(&self, other: &Self) -> Result<Self, TensorError> {
        let out = self.tensor.div(&other.tensor)?;
        Ok(self.from_op(Some(other), OpKind::Div, out))
    }

    fn matmul(&self, other: &Self) -> Result<Self, TensorError> {
        let out = self.tensor.matmul(&other.tensor)?;
        Ok(self.from_op(Some(other), OpKind::MatMul, out))
    }

    fn sum(&self, axis: usize, keepdim: bool) -> Result<Self, TensorError> {
        let out = self.tensor.sum(axis, keepdim)?;
        Ok(self.from_op(None, OpKind::Sum { axis, keepdim }, out))
    }

    fn mean(&self, axis: usize, keepdim: bool) -> Result<Self, TensorError> {
        let out = self.tensor.mean(axis, keepdim)?;
        Ok(self.from_op(None, OpKind::Mean { axis, keepdim }, out))
    }

    fn backward(&self) -> Result<BackwardResult<T>, AutogradError> {
        let id = self.value_id.ok_or(AutogradError::NoEngineInContext)?;
        let engine = self.engine.as_ref().ok_or(AutogradError::NoEngineInContext)?;
        engine.borrow_mut().backward(id, true, false)
    }

    fn grad(&self, result: &BackwardResult<T>) -> Option<Tensor<T>> {
        self.value_id.and_then(|id| result.get(id).cloned())
    }

    fn export(&self) -> (Vec<T>, Vec<usize>) {
        export_row_major(&self.tensor)
    }
}

/// The `grad_tape` context-manager equivalent (§6): installs `engine` as
/// this thread's active engine on construction, restoring whatever was
/// previously installed when dropped.
pub struct GradTape<T: TensorElement + BlasKernel> {
    previous: Option<Rc<RefCell<Engine<T>>>>,
}

impl<T: TensorElement + BlasKernel> GradTape<T> {
    pub fn new() -> Self {
        let previous = autodiff::active::<T>();
        autodiff::install(Engine::new());
        GradTape { previous }
    }
}

impl<T: TensorElement + BlasKernel> Default for GradTape<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TensorElement + BlasKernel> Drop for GradTape<T> {
    fn drop(&mut self) {
        // Restores whatever engine (if any) was active before this tape,
        // matching `grad_tape`'s nesting semantics.
        match self.previous.take() {
            Some(engine) => autodiff::install_handle(engine),
            None => autodiff::uninstall(),
        }
    }
}

/// The `autodiff.enabled` accessor (§6): reads, and optionally writes,
/// the thread-local `grad_enabled` flag [`autodiff::NoGradGuard`] uses.
pub fn autodiff_enabled(set: Option<bool>) -> bool {
    if let Some(value) = set {
        autodiff::set_grad_enabled(value);
    }
    autodiff::grad_enabled()
}

/// The "NumPy-style export" (§6): copies `tensor`'s logical elements,
/// respecting its (possibly non-contiguous or shared) layout, into a
/// freshly allocated C-contiguous row-major buffer plus its shape.
pub fn export_row_major<T: TensorElement>(tensor: &Tensor<T>) -> (Vec<T>, Vec<usize>) {
    (tensor.iter().collect(), tensor.shape().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn export_row_major_flattens_a_swapped_view() {
        let a = Tensor::<f32>::from_data(vec![2, 3], (1..=6).map(|v| v as f32).collect()).unwrap();
        let t = a.swap_axes(0, 1).unwrap();
        let (data, shape) = export_row_major(&t);
        assert_eq!(shape, vec![3, 2]);
        assert_eq!(data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn grad_tape_tracks_and_backward_produces_a_gradient() {
        let _tape = GradTape::<f32>::new();
        let a = TrackedTensor::construct(vec![1], vec![3.0], true).unwrap();
        let b = TrackedTensor::construct(vec![1], vec![4.0], true).unwrap();
        let c = a.mul(&b).unwrap();

        let result = c.backward().unwrap();
        assert_eq!(a.grad(&result).unwrap().iter().next().unwrap(), 4.0);
        assert_eq!(b.grad(&result).unwrap().iter().next().unwrap(), 3.0);
    }

    #[test]
    fn autodiff_enabled_reports_the_no_grad_guard() {
        assert!(autodiff_enabled(None));
        autodiff_enabled(Some(false));
        assert!(!autodiff_enabled(None));
    }
}
