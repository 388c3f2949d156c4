//! The memory pool allocator (§4.A–§4.B): an aligned sub-allocator feeding
//! a best-fit-with-coalescing pool.

pub mod chunk;
pub mod pool;
pub mod sub_allocator;

pub use chunk::{Bucket, Chunk, ChunkId, NO_CHUNK};
pub use pool::{Allocator, Pool, MIN_ALLOCATION_UNIT};
pub use sub_allocator::{CpuSubAllocator, SubAllocator};

use std::sync::{Arc, OnceLock};

use crate::config::Config;

static DEFAULT_POOL: OnceLock<Arc<Pool>> = OnceLock::new();

/// The process-wide default pool (§4.L), lazily constructed on first use
/// behind a coarse mutex (§5's shared-pool configuration).
///
/// Installs the `stderr` logger the first time it's touched, mirroring the
/// teacher's habit of logging on first backend construction.
pub fn default_pool() -> Arc<Pool> {
    DEFAULT_POOL
        .get_or_init(|| {
            crate::logging::init_logging();
            let config = Config::default();
            log::info!(
                "alloc: constructing default pool (min_allocation_unit={}, initial_quantum={})",
                config.min_allocation_unit,
                config.initial_quantum
            );
            Arc::new(Pool::with_config(Box::new(CpuSubAllocator), &config))
        })
        .clone()
}
