//! BFC pool invariants (§8 seed scenario 5).

use tensorforge::alloc::{Allocator, Pool};

mod allocator_spec {
    use super::*;

    #[test]
    fn round_trip_of_mixed_sizes_in_allocation_order_leaves_one_free_chunk_per_region() {
        let pool = Pool::new();
        let sizes = [17usize, 96, 257, 4097];
        let mut live = Vec::new();
        for i in 0..1000 {
            let size = sizes[i % sizes.len()];
            let ptr = pool.allocate(size, 8).unwrap();
            live.push(ptr);
        }
        for ptr in live.into_iter().rev() {
            pool.deallocate(ptr).unwrap();
        }

        let snapshot = pool.chunk_snapshot();
        assert!(snapshot.iter().all(|c| !c.in_use));
    }

    #[test]
    fn zero_size_allocation_rounds_up_to_one_byte_and_round_trips() {
        let pool = Pool::new();
        let ptr = pool.allocate(0, 8).unwrap();
        pool.deallocate(ptr).unwrap();
    }

    #[test]
    fn deallocating_an_unknown_pointer_fails() {
        use std::ptr::NonNull;
        let pool = Pool::new();
        let dangling = NonNull::new(0x1000 as *mut u8).unwrap();
        assert!(pool.deallocate(dangling).is_err());
    }

    #[test]
    fn allocations_never_overlap() {
        let pool = Pool::new();
        let a = pool.allocate(128, 8).unwrap();
        let b = pool.allocate(128, 8).unwrap();
        assert_ne!(a.as_ptr(), b.as_ptr());
        pool.deallocate(a).unwrap();
        pool.deallocate(b).unwrap();
    }
}
