//! Element type and device tags.
//!
//! These are runtime-inspectable markers, not the mechanism by which
//! generic code picks an implementation (that's [`TensorElement`]) — they
//! exist so two tensors can be compared for compatibility without either
//! side knowing the other's static type, e.g. across the type-erased
//! autodiff context.

use std::fmt;

/// The element type backing a tensor's storage.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum DType {
    /// 32-bit IEEE-754 float.
    F32,
    /// 64-bit IEEE-754 float.
    F64,
}

impl DType {
    /// The size, in bytes, of one element of this type.
    pub fn itemsize(self) -> usize {
        match self {
            DType::F32 => std::mem::size_of::<f32>(),
            DType::F64 => std::mem::size_of::<f64>(),
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
        }
    }
}

/// The compute device a tensor's storage lives on.
///
/// Only `Cpu` exists today; the variant is kept as an enum (rather than a
/// unit struct) so the rest of the engine already speaks in terms of a
/// device boundary, per §1's "CPU backend abstraction boundary" non-goal —
/// a future device just adds a variant, it doesn't change any call site
/// that already matches on `Device`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Device {
    /// The host CPU.
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
        }
    }
}

/// A type usable as tensor storage's element type.
///
/// Sealed: only `f32` and `f64` implement it. The autodiff engine, the
/// planner, and every kernel trait are generic over `T: TensorElement`
/// rather than over a dtype enum dispatched at runtime, so that the
/// compiler monomorphises the hot loops per element type the way the
/// teacher's kernel traits are written per-backend rather than dispatched
/// through a vtable per element.
pub trait TensorElement:
    num_traits::Float + Copy + Default + fmt::Debug + Send + Sync + 'static
{
    /// This type's runtime dtype tag.
    const DTYPE: DType;
}

impl TensorElement for f32 {
    const DTYPE: DType = DType::F32;
}

impl TensorElement for f64 {
    const DTYPE: DType = DType::F64;
}
