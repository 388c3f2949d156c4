//! Chunk and bucket records for the BFC pool (§3 "Allocator chunk/bucket").

use std::collections::BTreeSet;
use std::ptr::NonNull;

/// A stable identifier for a chunk. Chunks are never removed from
/// [`Pool`](super::pool::Pool)'s backing `Vec`; coalescing "deletes" a
/// chunk by marking it dead and unlinking it from the physical chain, so
/// old ids can't be confused with new ones reusing the same slot.
pub type ChunkId = usize;

/// Sentinel meaning "no chunk" (used for `prev`/`next` at region
/// boundaries).
pub const NO_CHUNK: ChunkId = ChunkId::MAX;

/// A node in the pool: a physically contiguous segment of a region.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Base address of this chunk's memory.
    pub ptr: NonNull<u8>,
    /// The chunk's id (its index into `Pool::chunks`).
    pub id: ChunkId,
    /// Total size of the chunk, in bytes (always a power of two: either a
    /// freshly grown region or the result of splitting one).
    pub size: usize,
    /// The size actually requested by the allocation this chunk serves,
    /// `0` when free.
    pub requested_size: usize,
    /// Whether the chunk is currently handed out to a caller.
    pub in_use: bool,
    /// Id of the chunk immediately before this one in the same region, or
    /// [`NO_CHUNK`] if this is the first chunk in its region.
    pub prev: ChunkId,
    /// Id of the chunk immediately after this one in the same region, or
    /// [`NO_CHUNK`] if this is the last chunk in its region.
    pub next: ChunkId,
    /// Marks a chunk removed by coalescing; its id is never reused but the
    /// slot is skipped everywhere.
    pub dead: bool,
}

impl Chunk {
    /// One past the last address owned by this chunk.
    pub fn end_ptr(&self) -> *const u8 {
        // SAFETY: arithmetic only, no dereference.
        unsafe { self.ptr.as_ptr().add(self.size) }
    }
}

// SAFETY: `ptr` is an opaque base address owned by the chunk's region; all
// access to chunk memory is serialised through `Pool`'s `Mutex`, so `Chunk`
// can be moved across and shared between threads like any other handle.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

/// A size class: a best-fit-ordered set of free chunk ids.
///
/// Ordering is `(size, address)` so that within one bucket the smallest
/// adequate chunk wins, with ties broken toward the lowest base address —
/// per §4.B, this keeps regions from drifting toward low-address
/// fragmentation.
#[derive(Debug, Default)]
pub struct Bucket {
    free_chunks: BTreeSet<(usize, usize, ChunkId)>,
}

impl Bucket {
    /// Inserts a free chunk into the bucket's ordered set.
    pub fn insert(&mut self, chunk: &Chunk) {
        self.free_chunks
            .insert((chunk.size, chunk.ptr.as_ptr() as usize, chunk.id));
    }

    /// Removes a chunk from the bucket, if present.
    pub fn remove(&mut self, chunk: &Chunk) {
        self.free_chunks
            .remove(&(chunk.size, chunk.ptr.as_ptr() as usize, chunk.id));
    }

    /// Returns the best-fit chunk id with `size >= requested`, if any.
    pub fn best_fit(&self, requested: usize) -> Option<ChunkId> {
        self.free_chunks
            .range((requested, 0, 0)..)
            .map(|&(_, _, id)| id)
            .next()
    }

    /// True if the bucket currently holds no free chunks.
    pub fn is_empty(&self) -> bool {
        self.free_chunks.is_empty()
    }

    /// All free chunk ids currently in the bucket, in best-fit order.
    pub fn free_ids(&self) -> Vec<ChunkId> {
        self.free_chunks.iter().map(|&(_, _, id)| id).collect()
    }
}
