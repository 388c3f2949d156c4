/// Errors raised by the operator registry and autodiff engine (§4.I, §4.J).
#[derive(Debug, thiserror::Error)]
pub enum AutogradError {
    /// An operation that requires gradient tracking was attempted with no
    /// engine installed in the thread-local context.
    #[error("no autodiff engine installed in the current thread's context")]
    NoEngineInContext,

    /// A backward closure returned a different number of gradients than the
    /// node has inputs.
    #[error("arity mismatch: op {op} has {expected} input(s), backward returned {actual}")]
    ArityMismatch {
        /// The operator's stable name.
        op: &'static str,
        /// The number of inputs the forward pass recorded.
        expected: usize,
        /// The number of gradients the backward closure produced.
        actual: usize,
    },

    /// A backward closure looked up a context key that forward never saved.
    #[error("missing saved context entry {key:?} for op {op}")]
    MissingContext {
        /// The operator's stable name.
        op: &'static str,
        /// The context key that was missing.
        key: &'static str,
    },

    /// Kahn's algorithm didn't consume every node: the graph has a cycle.
    #[error("cycle detected in autodiff graph")]
    CycleDetected,

    /// A value identifier was used that the graph never allocated.
    #[error("value {0:?} is not tracked by this engine")]
    ValueNotTracked(crate::autodiff::graph::ValueId),

    /// An operator's backward closure failed; this wraps the underlying
    /// failure with the operator's name attached.
    #[error("backward failed in op {op}: {source}")]
    OperatorFailed {
        /// The operator's stable name.
        op: &'static str,
        /// The underlying failure.
        #[source]
        source: Box<AutogradError>,
    },

    /// An operator's forward or backward raised a raw tensor error (shape
    /// mismatch, rank too low, and so on).
    #[error("op {op} failed: {source}")]
    TensorOpFailed {
        /// The operator's stable name.
        op: &'static str,
        /// The underlying tensor error.
        #[source]
        source: crate::error::TensorError,
    },
}
