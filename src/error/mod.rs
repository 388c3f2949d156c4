//! The error taxonomy.
//!
//! Each subsystem owns its own error enum rather than funnelling everything
//! through one flat kind, since the failure domains don't overlap: a caller
//! who mismatches tensor shapes never needs to know the allocator's
//! vocabulary, and vice versa. See the component sections of SPEC_FULL.md
//! for which operations return which of these.

pub use self::alloc_error::AllocError;
pub use self::autograd_error::AutogradError;
pub use self::plan_error::PlanError;
pub use self::tensor_error::TensorError;

mod alloc_error;
mod autograd_error;
mod plan_error;
mod tensor_error;
