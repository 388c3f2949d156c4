//! The best-fit-with-coalescing pool allocator (§4.B).
//!
//! Grounded on `original_source/fusion/src/Fusion/alloc/BFCPoolAllocator.cpp`
//! for the exact split/coalesce/grow algorithm (region growth by doubling a
//! quantum, best-fit selection scanning buckets upward, left-neighbour-only
//! coalescing loop), reimplemented against the `ChunkId`/`Bucket` model of
//! `chunk.rs` and the public contract (`allocate`/`deallocate`) spelled out
//! in spec.md §4.B rather than the C++ class's wider internal surface.

use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;
use std::sync::Mutex;

use crate::alloc::chunk::{Bucket, Chunk, ChunkId, NO_CHUNK};
use crate::alloc::sub_allocator::{CpuSubAllocator, SubAllocator};
use crate::error::AllocError;

/// The minimum allocation unit (§4.B): a split is only performed when the
/// remainder would be at least this large, so fragments never shrink below
/// a useful size.
pub const MIN_ALLOCATION_UNIT: usize = 64;

/// Allocates and frees byte regions on behalf of tensor storage.
///
/// Implemented by [`Pool`]; kept as a trait so `Buffer` (§4.C) can hold a
/// `dyn Allocator` without caring whether it's the process-wide default
/// pool or a private per-thread one (§5 allows both configurations).
pub trait Allocator: Send + Sync {
    /// Allocates `size` bytes aligned to `alignment`.
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError>;

    /// Frees a region previously returned by `allocate`.
    ///
    /// # Errors
    ///
    /// [`AllocError::UnknownPointer`] if `ptr` was not returned by this
    /// allocator (or has already been freed).
    fn deallocate(&self, ptr: NonNull<u8>) -> Result<(), AllocError>;
}

struct PoolState {
    sub_allocator: Box<dyn SubAllocator>,
    chunks: Vec<Chunk>,
    buckets: BTreeMap<usize, Bucket>,
    ptr_to_chunk: HashMap<usize, ChunkId>,
    current_quantum: usize,
    min_allocation_unit: usize,
}

impl PoolState {
    fn get(&self, id: ChunkId) -> &Chunk {
        &self.chunks[id]
    }

    fn get_mut(&mut self, id: ChunkId) -> &mut Chunk {
        &mut self.chunks[id]
    }

    fn bucket_mut(&mut self, bucket_size: usize) -> &mut Bucket {
        self.buckets.entry(bucket_size).or_default()
    }

    fn erase_from_bucket(&mut self, id: ChunkId) {
        let chunk = self.get(id).clone();
        if chunk.size == 0 {
            return;
        }
        let bucket_size = round_down_pow2(chunk.size);
        if let Some(bucket) = self.buckets.get_mut(&bucket_size) {
            bucket.remove(&chunk);
        }
    }

    fn insert_into_bucket(&mut self, id: ChunkId) {
        let chunk = self.get(id).clone();
        let bucket_size = round_down_pow2(chunk.size);
        self.bucket_mut(bucket_size).insert(&chunk);
    }

    fn find_free_chunk_for_size(&self, size: usize) -> Option<ChunkId> {
        let size_class = round_up_pow2(size);
        for (_, bucket) in self.buckets.range(size_class..) {
            if bucket.is_empty() {
                continue;
            }
            if let Some(id) = bucket.best_fit(size) {
                return Some(id);
            }
        }
        None
    }

    fn grow_for_size(&mut self, size: usize, alignment: usize) -> Result<(), AllocError> {
        while self.current_quantum < size {
            self.current_quantum = self
                .current_quantum
                .checked_mul(2)
                .ok_or(AllocError::OutOfMemory { size, alignment })?;
        }

        let region_size = self.current_quantum;
        let ptr = self
            .sub_allocator
            .allocate_region(alignment, region_size)?;

        let id = self.chunks.len();
        let chunk = Chunk {
            ptr,
            id,
            size: region_size,
            requested_size: 0,
            in_use: false,
            prev: NO_CHUNK,
            next: NO_CHUNK,
            dead: false,
        };
        self.ptr_to_chunk.insert(ptr.as_ptr() as usize, id);
        self.chunks.push(chunk);
        self.insert_into_bucket(id);

        log::debug!(
            "pool: grew region to {} bytes (quantum now {})",
            region_size,
            self.current_quantum
        );

        Ok(())
    }

    /// Splits `id` so that the leading `size` bytes become the allocated
    /// chunk, returning its id (always `id` itself — the split never moves
    /// the base pointer of the requested allocation).
    fn split_for_allocation(&mut self, id: ChunkId, size: usize) -> ChunkId {
        let (chunk_ptr, chunk_size, chunk_next) = {
            let chunk = self.get(id);
            (chunk.ptr, chunk.size, chunk.next)
        };

        let remainder_size = chunk_size - size;
        if remainder_size < self.min_allocation_unit {
            return id;
        }

        // SAFETY: the remainder starts `size` bytes into a region the sub
        // allocator gave us, and stays within that region because
        // `remainder_size = chunk_size - size` by construction.
        let remainder_ptr = unsafe { NonNull::new_unchecked(chunk_ptr.as_ptr().add(size)) };
        let remainder_id = self.chunks.len();
        let remainder = Chunk {
            ptr: remainder_ptr,
            id: remainder_id,
            size: remainder_size,
            requested_size: 0,
            in_use: false,
            prev: id,
            next: chunk_next,
            dead: false,
        };

        if chunk_next != NO_CHUNK {
            self.get_mut(chunk_next).prev = remainder_id;
        }
        {
            let chunk = self.get_mut(id);
            chunk.next = remainder_id;
            chunk.size = size;
        }

        self.ptr_to_chunk
            .insert(remainder_ptr.as_ptr() as usize, remainder_id);
        self.chunks.push(remainder);
        self.insert_into_bucket(remainder_id);

        id
    }

    fn merge_with_left(&mut self, left: ChunkId, right: ChunkId) -> ChunkId {
        let (left_end, right_ptr, right_size, right_next) = {
            let l = self.get(left);
            let r = self.get(right);
            (l.end_ptr(), r.ptr, r.size, r.next)
        };

        if left_end != right_ptr.as_ptr() as *const u8 {
            // Not physically adjacent (shouldn't happen given `prev`
            // linkage, but guards against a malformed chain).
            return right;
        }

        self.ptr_to_chunk.remove(&(right_ptr.as_ptr() as usize));
        self.erase_from_bucket(right);
        self.erase_from_bucket(left);

        {
            let l = self.get_mut(left);
            l.size += right_size;
            l.next = right_next;
        }
        if right_next != NO_CHUNK {
            self.get_mut(right_next).prev = left;
        }

        let r = self.get_mut(right);
        r.dead = true;
        r.size = 0;
        r.requested_size = 0;
        r.prev = NO_CHUNK;
        r.next = NO_CHUNK;

        left
    }

    /// Walks the previous-neighbour chain coalescing free, physically
    /// adjacent chunks, per §4.B step 2. Returns the id of the resulting
    /// (possibly merged) chunk.
    fn free_and_maybe_coalesce(&mut self, id: ChunkId) -> ChunkId {
        let mut current = id;
        loop {
            let prev = self.get(current).prev;
            if prev == NO_CHUNK {
                break;
            }
            if self.get(prev).in_use {
                break;
            }
            let merged = self.merge_with_left(prev, current);
            if merged == current {
                break;
            }
            current = merged;
        }
        current
    }
}

fn round_up_pow2(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        n.next_power_of_two()
    }
}

fn round_down_pow2(n: usize) -> usize {
    if n <= 1 {
        1
    } else {
        1usize << (usize::BITS - 1 - n.leading_zeros())
    }
}

/// A best-fit-with-coalescing memory pool over regions obtained from a
/// [`SubAllocator`] (§4.B).
///
/// All public operations take `&self` and serialise internally through a
/// single [`Mutex`] — the "coarse mutex in the shared-pool configuration"
/// §5 describes. Callers who want per-thread pools instead simply construct
/// one `Pool` per thread; nothing here assumes there is exactly one.
pub struct Pool {
    state: Mutex<PoolState>,
}

impl Pool {
    /// Creates a pool using the default [`CpuSubAllocator`] and the
    /// standard minimum allocation unit.
    pub fn new() -> Self {
        Self::with_sub_allocator(Box::new(CpuSubAllocator))
    }

    /// Creates a pool over a caller-supplied [`SubAllocator`], useful for
    /// tests that want to observe or constrain region growth.
    pub fn with_sub_allocator(sub_allocator: Box<dyn SubAllocator>) -> Self {
        Pool {
            state: Mutex::new(PoolState {
                sub_allocator,
                chunks: Vec::new(),
                buckets: BTreeMap::new(),
                ptr_to_chunk: HashMap::new(),
                current_quantum: MIN_ALLOCATION_UNIT,
                min_allocation_unit: MIN_ALLOCATION_UNIT,
            }),
        }
    }

    /// Creates a pool over a caller-supplied [`SubAllocator`], honouring
    /// the tunables in `config` (§4.L) instead of the defaults.
    pub fn with_config(sub_allocator: Box<dyn SubAllocator>, config: &crate::config::Config) -> Self {
        Pool {
            state: Mutex::new(PoolState {
                sub_allocator,
                chunks: Vec::new(),
                buckets: BTreeMap::new(),
                ptr_to_chunk: HashMap::new(),
                current_quantum: config.initial_quantum,
                min_allocation_unit: config.min_allocation_unit,
            }),
        }
    }

    /// Snapshot of every chunk currently known to the pool (both free and
    /// in-use), for tests that check region-level invariants.
    pub fn chunk_snapshot(&self) -> Vec<Chunk> {
        self.state.lock().unwrap().chunks.clone()
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl Allocator for Pool {
    fn allocate(&self, size: usize, alignment: usize) -> Result<NonNull<u8>, AllocError> {
        let size = round_up_pow2(size.max(1));
        let mut state = self.state.lock().unwrap();

        let free_id = match state.find_free_chunk_for_size(size) {
            Some(id) => id,
            None => {
                state.grow_for_size(size, alignment)?;
                state
                    .find_free_chunk_for_size(size)
                    .ok_or(AllocError::OutOfMemory { size, alignment })?
            }
        };

        state.erase_from_bucket(free_id);
        let allocated_id = state.split_for_allocation(free_id, size);

        let ptr = {
            let chunk = state.get_mut(allocated_id);
            chunk.in_use = true;
            chunk.requested_size = size;
            chunk.ptr
        };

        log::debug!("pool: allocated {} bytes at {:p}", size, ptr.as_ptr());
        Ok(ptr)
    }

    fn deallocate(&self, ptr: NonNull<u8>) -> Result<(), AllocError> {
        let mut state = self.state.lock().unwrap();

        let id = match state.ptr_to_chunk.get(&(ptr.as_ptr() as usize)).copied() {
            Some(id) => id,
            None => {
                log::warn!("pool: deallocate called with unknown pointer {:p}", ptr);
                return Err(AllocError::UnknownPointer);
            }
        };

        {
            let chunk = state.get_mut(id);
            chunk.in_use = false;
            chunk.requested_size = 0;
        }

        let merged_id = state.free_and_maybe_coalesce(id);
        state.insert_into_bucket(merged_id);
        Ok(())
    }
}
