//! A hybrid eager/autodiff CPU tensor engine: a best-fit-with-coalescing
//! memory pool (§4.A–§4.B), a shape/stride execution planner (§4.D) and
//! iteration driver (§4.E) shared by every kernel (§4.F), an eager
//! `Tensor` built on top (§4.G), and a dynamic reverse-mode autodiff
//! engine layered over that (§4.H–§4.J).
//!
//! See `SPEC_FULL.md` for the full component design; modules below are
//! named and ordered the same way.

pub mod alloc;
pub mod autodiff;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod dtype;
pub mod error;
pub mod kernel;
pub mod layout;
pub mod logging;
pub mod planner;
pub mod storage;
pub mod tensor;

#[cfg(feature = "binding")]
pub mod binding;

pub use dtype::{DType, Device, TensorElement};
pub use error::{AllocError, AutogradError, PlanError, TensorError};
pub use logging::init_logging;
pub use tensor::Tensor;

/// Common imports for working with tensors and the autodiff engine.
pub mod prelude {
    pub use crate::autodiff::{BackwardResult, Engine, NoGradGuard, OpKind};
    pub use crate::dtype::{DType, Device, TensorElement};
    pub use crate::error::{AllocError, AutogradError, PlanError, TensorError};
    pub use crate::tensor::Tensor;

    #[cfg(feature = "binding")]
    pub use crate::binding::{GradTape, HostBinding, TrackedTensor};
}
