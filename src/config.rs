//! Pool configuration (§4.L).
//!
//! Grounded on the teacher's `Framework`/`Backend` construction parameters
//! (small, `Copy`-able structs of tunables passed by value at construction
//! rather than threaded through every call) — here the tunables are the
//! pool's minimum allocation unit, its starting growth quantum, and the
//! alignment floor the sub-allocator enforces on every region.

/// Tunables for constructing a [`Pool`](crate::alloc::Pool).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    /// The smallest remainder a split will carve off (§4.B); below this the
    /// pool hands out the whole chunk rather than fragmenting it further.
    pub min_allocation_unit: usize,
    /// The size, in bytes, of the first region the pool grows to.
    /// Subsequent growths double this quantum until it covers the request.
    pub initial_quantum: usize,
    /// The minimum alignment the sub-allocator will honour for any region,
    /// regardless of what a caller requests.
    pub sub_allocator_alignment_floor: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            min_allocation_unit: crate::alloc::MIN_ALLOCATION_UNIT,
            initial_quantum: crate::alloc::MIN_ALLOCATION_UNIT,
            sub_allocator_alignment_floor: std::mem::size_of::<usize>(),
        }
    }
}
