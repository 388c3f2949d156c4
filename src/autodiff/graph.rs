//! The autodiff graph (§4.H, §3 "Autodiff node"/"Graph").
//!
//! Grounded on `original_source/fusion/src/Fusion/autodiff/Graph.h` and
//! `Sort.h` for the id scheme (stable, never-reused integer identifiers)
//! and the exact Kahn's-algorithm shape (in-degree from producer edges,
//! queue zero-in-degree nodes, drain consumer edges); translated from the
//! C++'s parallel `std::vector`s into the same shape in Rust rather than,
//! say, a graph crate, since the graph here is a flat bookkeeping
//! structure rather than a general-purpose one.

use std::collections::VecDeque;

use crate::autodiff::op::OpNode;
use crate::error::AutogradError;

/// A stable identifier for a tracked value (§3 "Autodiff value").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub usize);

/// A stable identifier for a node (§3 "Autodiff node").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// `produced_by[value]`: the node and output slot that produced it, or
/// `None` for leaf inputs.
#[derive(Clone, Copy, Debug)]
pub struct ProducerInfo {
    pub node: NodeId,
    pub slot: usize,
}

/// One entry of `consumed_by[value]`: a node and the input slot `value`
/// was bound to.
#[derive(Clone, Copy, Debug)]
pub struct ConsumerInfo {
    pub node: NodeId,
    pub slot: usize,
}

/// The graph of type-erased operator nodes recorded during forward
/// execution (§4.H).
#[derive(Default)]
pub struct Graph {
    pub nodes: Vec<OpNode>,
    produced_by: Vec<Option<ProducerInfo>>,
    consumed_by: Vec<Vec<ConsumerInfo>>,
    edges: Vec<(NodeId, NodeId)>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Allocates a value identifier with no producer (a leaf input).
    pub fn new_input_value(&mut self) -> ValueId {
        let id = ValueId(self.produced_by.len());
        self.produced_by.push(None);
        self.consumed_by.push(Vec::new());
        id
    }

    /// Allocates a value identifier intended to be filled by
    /// [`Graph::set_produced_by`].
    pub fn new_intermediate_value(&mut self) -> ValueId {
        self.new_input_value()
    }

    pub fn set_produced_by(&mut self, value: ValueId, node: NodeId, slot: usize) {
        self.produced_by[value.0] = Some(ProducerInfo { node, slot });
    }

    pub fn producer_of(&self, value: ValueId) -> Option<ProducerInfo> {
        self.produced_by[value.0]
    }

    pub fn record_consumer(&mut self, value: ValueId, node: NodeId, slot: usize) {
        self.consumed_by[value.0].push(ConsumerInfo { node, slot });
    }

    /// Records a producer→consumer edge for the reverse walk, skipping
    /// when either endpoint has no producer node (§4.H: leaf inputs don't
    /// participate in the node-level edge list).
    pub fn add_edge(&mut self, src: Option<NodeId>, dst: NodeId) {
        if let Some(src) = src {
            self.edges.push((src, dst));
        }
    }

    pub fn push_node(&mut self, node: OpNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &OpNode {
        &self.nodes[id.0]
    }

    pub fn consumers_of(&self, value: ValueId) -> &[ConsumerInfo] {
        &self.consumed_by[value.0]
    }

    pub fn value_count(&self) -> usize {
        self.produced_by.len()
    }

    /// Discards every node/value/edge, returning the graph to its initial
    /// state (§4.J: backward resets the graph unless `retain_graph`).
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.produced_by.clear();
        self.consumed_by.clear();
        self.edges.clear();
    }

    /// Kahn's-algorithm topological sort over nodes (§4.H).
    ///
    /// In-degree counts producer edges only (an input with no producer —
    /// a leaf — contributes nothing). Fails with
    /// [`AutogradError::CycleDetected`] if the resulting order is shorter
    /// than the node count.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, AutogradError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        for (i, node) in self.nodes.iter().enumerate() {
            for &input in &node.inputs {
                if self.produced_by[input.0].is_some() {
                    in_degree[i] += 1;
                }
            }
        }

        let mut queue: VecDeque<NodeId> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(NodeId)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(nid) = queue.pop_front() {
            order.push(nid);
            let node = &self.nodes[nid.0];
            for &output in &node.outputs {
                for consumer in &self.consumed_by[output.0] {
                    in_degree[consumer.node.0] -= 1;
                    if in_degree[consumer.node.0] == 0 {
                        queue.push_back(consumer.node);
                    }
                }
            }
        }

        if order.len() != n {
            return Err(AutogradError::CycleDetected);
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::op::{OpKind, OpNode};

    fn simple_node(inputs: Vec<ValueId>, outputs: Vec<ValueId>) -> OpNode {
        OpNode {
            kind: OpKind::Add,
            inputs,
            outputs,
        }
    }

    #[test]
    fn topological_sort_orders_producers_before_consumers() {
        let mut graph = Graph::new();
        let a = graph.new_input_value();
        let b = graph.new_input_value();
        let c = graph.new_intermediate_value();

        let n0 = graph.push_node(simple_node(vec![a, b], vec![c]));
        graph.set_produced_by(c, n0, 0);
        graph.add_edge(None, n0);
        graph.record_consumer(a, n0, 0);
        graph.record_consumer(b, n0, 1);

        let d = graph.new_intermediate_value();
        let n1 = graph.push_node(simple_node(vec![c, a], vec![d]));
        graph.set_produced_by(d, n1, 0);
        graph.add_edge(Some(n0), n1);
        graph.record_consumer(c, n1, 0);
        graph.record_consumer(a, n1, 1);

        let order = graph.topological_sort().unwrap();
        assert_eq!(order, vec![n0, n1]);
    }

    #[test]
    fn cycle_is_detected() {
        let mut graph = Graph::new();
        let a = graph.new_intermediate_value();
        let b = graph.new_intermediate_value();

        let n0 = graph.push_node(simple_node(vec![b], vec![a]));
        let n1 = graph.push_node(simple_node(vec![a], vec![b]));
        graph.set_produced_by(a, n0, 0);
        graph.set_produced_by(b, n1, 0);
        graph.record_consumer(b, n0, 0);
        graph.record_consumer(a, n1, 0);

        let err = graph.topological_sort().unwrap_err();
        assert!(matches!(err, AutogradError::CycleDetected));
    }
}
