/// Errors raised while building a loop plan (§4.D).
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// A contraction or fast-path selection required a layout the operand
    /// doesn't have (e.g. a GEMM-like descriptor over a non-contiguous
    /// operand).
    #[error("unsupported layout for this plan")]
    UnsupportedLayout,

    /// An einsum-style label binding referenced a label with inconsistent
    /// extents, or an output label not present in any operand.
    #[error("einsum label mismatch: {label:?}")]
    LabelMismatch {
        /// The offending label.
        label: char,
    },
}
