/// Errors raised by storage construction and by eager tensor operations
/// (§4.C, §4.G).
#[derive(Debug, thiserror::Error)]
pub enum TensorError {
    /// A constructor was given data whose length disagrees with the shape's
    /// flat size, or an in-place op would need to change the receiver's
    /// shape.
    #[error("shape mismatch: expected {expected} element(s), got {actual}")]
    ShapeMismatch {
        /// The element count the shape requires.
        expected: usize,
        /// The element count actually supplied.
        actual: usize,
    },

    /// Two operand shapes cannot be broadcast together.
    #[error("incompatible shapes for broadcasting: {lhs:?} vs {rhs:?}")]
    IncompatibleShapes {
        /// The left operand's shape.
        lhs: Vec<usize>,
        /// The right operand's shape.
        rhs: Vec<usize>,
    },

    /// An operation needed at least `minimum` dimensions but the operand's
    /// rank was lower.
    #[error("rank too low: operation requires at least rank {minimum}, got rank {actual}")]
    RankTooLow {
        /// The minimum rank the operation requires.
        minimum: usize,
        /// The operand's actual rank.
        actual: usize,
    },

    /// An axis index fell outside `0..rank`.
    #[error("axis {axis} out of range for rank {rank}")]
    AxisOutOfRange {
        /// The offending axis index.
        axis: usize,
        /// The operand's rank.
        rank: usize,
    },

    /// Two operands that must share a dtype didn't.
    #[error("dtype mismatch: {lhs:?} vs {rhs:?}")]
    DtypeMismatch {
        /// The left operand's dtype.
        lhs: crate::dtype::DType,
        /// The right operand's dtype.
        rhs: crate::dtype::DType,
    },

    /// Two operands that must share a device didn't.
    #[error("device mismatch: {lhs:?} vs {rhs:?}")]
    DeviceMismatch {
        /// The left operand's device.
        lhs: crate::dtype::Device,
        /// The right operand's device.
        rhs: crate::dtype::Device,
    },

    /// An element access fell outside the storage's bounds.
    #[error("index {index} out of range for length {len}")]
    OutOfRange {
        /// The offending flat index.
        index: usize,
        /// The storage's element count.
        len: usize,
    },
}
