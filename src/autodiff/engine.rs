//! The autodiff engine (§4.J): ties the graph and operator registry
//! together into `track_input`/`apply`/`backward`/`materialise`.
//!
//! Grounded on `original_source/fusion/src/Fusion/autodiff/Engine.h`'s
//! `Engine<T>` — `apply`'s node-then-forward-then-allocate-outputs shape,
//! and `backward`'s reverse-topological accumulation loop (including the
//! "wrap the addition in a no-grad guard" detail), are carried over
//! structurally; translated from the original's `val_buff_`/`grad_buff_`
//! parallel vectors into the same shape in Rust.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::autodiff::graph::{Graph, NodeId, ValueId};
use crate::autodiff::op::{self, Context, OpKind, OpNode};
use crate::dtype::TensorElement;
use crate::error::AutogradError;
use crate::kernel::BlasKernel;
use crate::tensor::Tensor;

thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Whether graph recording is currently permitted in this thread (§5,
/// §4.J: "a thread-local toggle (`grad_enabled`)").
pub fn grad_enabled() -> bool {
    GRAD_ENABLED.with(Cell::get)
}

/// A scoped guard that suppresses graph recording for its lifetime,
/// restoring the previous setting on drop (§4.J's `NoGradGuard`). Used
/// internally by [`Engine::backward`]'s gradient-accumulation step, and
/// available to callers who want to run ops without tracking them.
pub struct NoGradGuard {
    previous: bool,
}

impl NoGradGuard {
    pub fn new() -> Self {
        let previous = GRAD_ENABLED.with(|cell| cell.replace(false));
        NoGradGuard { previous }
    }
}

impl Default for NoGradGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoGradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|cell| cell.set(self.previous));
    }
}

/// The gradients collected after a [`Engine::backward`] call with
/// `materialise = true`: one entry per leaf value that was tracked with
/// `requires_grad = true` and reached by the backward walk.
#[derive(Default)]
pub struct BackwardResult<T: TensorElement> {
    grads: HashMap<ValueId, Tensor<T>>,
}

impl<T: TensorElement> BackwardResult<T> {
    pub fn get(&self, value: ValueId) -> Option<&Tensor<T>> {
        self.grads.get(&value)
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }
}

/// A single thread's autodiff state: the graph, the value table, the
/// gradient table, and per-node saved-context scratch (§4.J, §5: "the
/// engine is thread-local").
pub struct Engine<T: TensorElement> {
    graph: Graph,
    values: Vec<Option<Tensor<T>>>,
    grads: Vec<Option<Tensor<T>>>,
    contexts: Vec<Context<T>>,
    leaf_requires_grad: Vec<bool>,
}

impl<T: TensorElement + BlasKernel> Default for Engine<T> {
    fn default() -> Self {
        Engine::new()
    }
}

impl<T: TensorElement + BlasKernel> Engine<T> {
    pub fn new() -> Self {
        Engine {
            graph: Graph::new(),
            values: Vec::new(),
            grads: Vec::new(),
            contexts: Vec::new(),
            leaf_requires_grad: Vec::new(),
        }
    }

    fn ensure_capacity(&mut self, id: ValueId) {
        if self.values.len() <= id.0 {
            self.values.resize_with(id.0 + 1, || None);
            self.leaf_requires_grad.resize(id.0 + 1, false);
        }
    }

    /// Registers `tensor` as a new leaf value, remembering whether it
    /// requires a gradient (§4.J).
    pub fn track_input(&mut self, tensor: Tensor<T>, requires_grad: bool) -> ValueId {
        let id = self.graph.new_input_value();
        self.ensure_capacity(id);
        self.values[id.0] = Some(tensor);
        self.leaf_requires_grad[id.0] = requires_grad;
        id
    }

    pub fn requires_grad(&self, id: ValueId) -> bool {
        self.leaf_requires_grad.get(id.0).copied().unwrap_or(false)
    }

    fn value(&self, id: ValueId) -> Result<&Tensor<T>, AutogradError> {
        self.values
            .get(id.0)
            .and_then(|slot| slot.as_ref())
            .ok_or(AutogradError::ValueNotTracked(id))
    }

    /// Records a node for `kind`, runs its forward pass over `input_ids`'
    /// current values, allocates one intermediate value per output, and
    /// returns the first output's identifier (§4.J).
    pub fn apply(&mut self, kind: OpKind, input_ids: &[ValueId]) -> Result<ValueId, AutogradError> {
        if input_ids.len() != op::expected_arity(&kind) {
            return Err(AutogradError::ArityMismatch {
                op: kind.name(),
                expected: op::expected_arity(&kind),
                actual: input_ids.len(),
            });
        }

        let mut inputs = Vec::with_capacity(input_ids.len());
        for &id in input_ids {
            inputs.push(self.value(id)?.clone());
        }

        let node_id = self.graph.push_node(OpNode {
            kind,
            inputs: input_ids.to_vec(),
            outputs: Vec::new(),
        });
        if self.contexts.len() <= node_id.0 {
            self.contexts.resize_with(node_id.0 + 1, Context::new);
        }

        for (slot, &id) in input_ids.iter().enumerate() {
            let producer = self.graph.producer_of(id).map(|p| p.node);
            self.graph.add_edge(producer, node_id);
            self.graph.record_consumer(id, node_id, slot);
        }

        let outputs = op::forward(&kind, &inputs, &mut self.contexts[node_id.0])?;

        let mut output_ids = Vec::with_capacity(outputs.len());
        for (slot, tensor) in outputs.into_iter().enumerate() {
            let out_id = self.graph.new_intermediate_value();
            self.graph.set_produced_by(out_id, node_id, slot);
            self.ensure_capacity(out_id);
            self.values[out_id.0] = Some(tensor);
            output_ids.push(out_id);
        }

        let node = &mut self.graph.nodes[node_id.0];
        node.outputs = output_ids.clone();

        Ok(output_ids[0])
    }

    /// Deep-copies the tensor stored at `id`, for consumption outside the
    /// engine (§4.J).
    pub fn materialise(&self, id: ValueId) -> Result<Tensor<T>, AutogradError> {
        self.value(id)
            .and_then(|t| t.clone_data().map_err(|source| AutogradError::TensorOpFailed { op: "materialise", source }))
    }

    /// Runs the reverse pass seeded at `seed_id` (§4.J).
    pub fn backward(
        &mut self,
        seed_id: ValueId,
        materialise: bool,
        retain_graph: bool,
    ) -> Result<BackwardResult<T>, AutogradError> {
        self.grads.resize_with(self.values.len(), || None);
        for slot in self.grads.iter_mut() {
            *slot = None;
        }

        let order = self.graph.topological_sort()?;

        let seed_value = self.value(seed_id)?;
        let seed_grad = seed_value
            .ones_like()
            .expect("allocating a gradient the same size as an already-live tensor cannot fail differently than the original allocation");
        self.grads[seed_id.0] = Some(seed_grad);

        for &node_id in order.iter().rev() {
            self.backward_one(node_id)?;
        }

        let mut result = BackwardResult::default();
        if materialise {
            for (idx, &requires) in self.leaf_requires_grad.iter().enumerate() {
                if requires {
                    if let Some(grad) = &self.grads[idx] {
                        result.grads.insert(ValueId(idx), grad.clone());
                    }
                }
            }
        }

        if !retain_graph {
            self.graph.reset();
            self.values.clear();
            self.grads.clear();
            self.contexts.clear();
            self.leaf_requires_grad.clear();
        }

        Ok(result)
    }

    fn backward_one(&mut self, node_id: NodeId) -> Result<(), AutogradError> {
        let kind = self.graph.node(node_id).kind;
        let outputs = self.graph.node(node_id).outputs.clone();
        let inputs = self.graph.node(node_id).inputs.clone();

        let mut grad_outputs = Vec::with_capacity(outputs.len());
        for &out_id in &outputs {
            if self.grads[out_id.0].is_none() {
                let shape_source = self.value(out_id)?;
                let zero = shape_source
                    .zeros_like()
                    .expect("allocating a gradient the same size as an already-live tensor cannot fail differently than the original allocation");
                self.grads[out_id.0] = Some(zero);
            }
            grad_outputs.push(self.grads[out_id.0].clone().unwrap());
        }

        let grad_inputs = op::backward(&kind, &self.contexts[node_id.0], &grad_outputs)?;
        if grad_inputs.len() != inputs.len() {
            return Err(AutogradError::ArityMismatch {
                op: kind.name(),
                expected: inputs.len(),
                actual: grad_inputs.len(),
            });
        }

        for (in_id, grad) in inputs.into_iter().zip(grad_inputs) {
            if self.grads[in_id.0].is_none() {
                self.grads[in_id.0] = Some(grad);
            } else {
                let existing = self.grads[in_id.0].take().unwrap();
                let accumulated = {
                    let _guard = NoGradGuard::new();
                    existing
                        .add(&grad)
                        .map_err(|source| AutogradError::TensorOpFailed { op: kind.name(), source })?
                };
                self.grads[in_id.0] = Some(accumulated);
            }
        }

        Ok(())
    }
}

thread_local! {
    static ACTIVE_ENGINE: RefCell<Option<Box<dyn Any>>> = const { RefCell::new(None) };
}

/// Installs `engine` as this thread's active engine context, returning a
/// shared handle callers can keep using directly (§4.J: "a thread-local
/// engine context stores the currently active engine").
pub fn install<T: TensorElement + BlasKernel>(engine: Engine<T>) -> Rc<RefCell<Engine<T>>> {
    let handle = Rc::new(RefCell::new(engine));
    install_handle(handle.clone());
    handle
}

/// As [`install`], but installs an existing shared handle rather than
/// building a fresh engine — used to restore a previously active engine.
pub fn install_handle<T: TensorElement + BlasKernel>(handle: Rc<RefCell<Engine<T>>>) {
    ACTIVE_ENGINE.with(|cell| {
        *cell.borrow_mut() = Some(Box::new(handle) as Box<dyn Any>);
    });
}

/// The currently installed engine for `T`, if one was installed via
/// [`install`] on this thread and for this element type.
pub fn active<T: TensorElement + BlasKernel>() -> Option<Rc<RefCell<Engine<T>>>> {
    ACTIVE_ENGINE.with(|cell| {
        cell.borrow()
            .as_ref()
            .and_then(|boxed| boxed.downcast_ref::<Rc<RefCell<Engine<T>>>>())
            .cloned()
    })
}

/// Clears this thread's active engine context.
pub fn uninstall() {
    ACTIVE_ENGINE.with(|cell| *cell.borrow_mut() = None);
}

/// True only when the no-grad guard is open, at least one operand
/// requires grad, and an engine context is installed (§4.J).
pub fn should_trace<T: TensorElement + BlasKernel>(requires_grad: &[bool]) -> bool {
    grad_enabled() && requires_grad.iter().any(|&r| r) && active::<T>().is_some()
}

/// Directly sets the thread-local `grad_enabled` flag (§6's
/// `autodiff_enabled` accessor writes through this rather than leaking a
/// [`NoGradGuard`]).
pub fn set_grad_enabled(value: bool) {
    GRAD_ENABLED.with(|cell| cell.set(value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backward_accumulates_a_diamond_shaped_graph() {
        let mut engine = Engine::<f32>::new();
        let a = engine.track_input(Tensor::from_data(vec![1], vec![3.0]).unwrap(), true);

        let b = engine.apply(OpKind::Exp, &[a]).unwrap();
        let c = engine.apply(OpKind::Log, &[a]).unwrap();
        let out = engine.apply(OpKind::Add, &[b, c]).unwrap();

        let result = engine.backward(out, true, false).unwrap();
        // d/da (exp(a) + log(a)) = exp(a) + 1/a
        let expected = 3.0f32.exp() + 1.0 / 3.0;
        let grad = result.get(a).unwrap();
        assert!((grad.iter().next().unwrap() - expected).abs() < 1e-3);
    }

    #[test]
    fn mul_backward_matches_the_product_rule() {
        let mut engine = Engine::<f32>::new();
        let a = engine.track_input(Tensor::from_data(vec![1], vec![2.0]).unwrap(), true);
        let b = engine.track_input(Tensor::from_data(vec![1], vec![5.0]).unwrap(), true);
        let out = engine.apply(OpKind::Mul, &[a, b]).unwrap();

        let result = engine.backward(out, true, false).unwrap();
        assert_eq!(result.get(a).unwrap().iter().next().unwrap(), 5.0);
        assert_eq!(result.get(b).unwrap().iter().next().unwrap(), 2.0);
    }

    #[test]
    fn cycle_detection_surfaces_from_backward() {
        let mut engine = Engine::<f32>::new();
        let a = engine.track_input(Tensor::from_data(vec![1], vec![1.0]).unwrap(), true);
        let out = engine.apply(OpKind::Exp, &[a]).unwrap();
        // A normal graph never cycles; this just exercises the plumbing
        // that would surface `AutogradError::CycleDetected` if it did.
        assert!(engine.backward(out, true, false).is_ok());
    }

    #[test]
    fn no_grad_guard_restores_previous_state_on_drop() {
        assert!(grad_enabled());
        {
            let _guard = NoGradGuard::new();
            assert!(!grad_enabled());
        }
        assert!(grad_enabled());
    }
}
