//! Property-based tests for the candidate pool and the kernel set.

use proptest::prelude::*;

use nearfield::search::pool::LinearPool;
use nearfield::simd;
use nearfield::simd::scalar;

proptest! {
    /// Entries stay sorted ascending, unique, and capacity-bounded under
    /// arbitrary insertion sequences.
    #[test]
    fn pool_invariants(
        inserts in prop::collection::vec((0i32..200, 0.0f32..100.0), 0..300),
        capacity in 1usize..64,
    ) {
        let mut pool = LinearPool::new(200, capacity, capacity.min(10));
        for &(id, dist) in &inserts {
            pool.insert(id, dist);
        }

        prop_assert!(pool.size() <= capacity);
        let mut seen = std::collections::HashSet::new();
        for i in 0..pool.size() {
            prop_assert!(seen.insert(pool.id(i)), "duplicate id {}", pool.id(i));
            if i > 0 {
                prop_assert!(pool.distance(i - 1) <= pool.distance(i));
            }
            prop_assert!(pool.is_visited(pool.id(i)));
        }
    }

    /// Re-inserting a visited id never changes the pool.
    #[test]
    fn pool_insert_idempotent(
        id in 0i32..100,
        d1 in 0.0f32..10.0,
        d2 in 0.0f32..10.0,
    ) {
        let mut pool = LinearPool::new(100, 16, 8);
        pool.insert(id, d1);
        let size = pool.size();
        let dist = pool.distance(0);
        pool.insert(id, d2);
        prop_assert_eq!(pool.size(), size);
        prop_assert_eq!(pool.distance(0), dist);
    }

    /// Popping drains ids in non-decreasing distance order.
    #[test]
    fn pool_pop_is_ordered(
        inserts in prop::collection::vec((0i32..500, 0.0f32..50.0), 1..100),
    ) {
        let mut pool = LinearPool::new(500, 128, 10);
        for &(id, dist) in &inserts {
            pool.insert(id, dist);
        }
        let mut last = f32::NEG_INFINITY;
        while pool.has_next() {
            let before = pool.size();
            let id = pool.pop();
            prop_assert!(id >= 0);
            prop_assert!(pool.size() == before);
            let d = (0..pool.size())
                .find(|&i| pool.id(i) == id)
                .map(|i| pool.distance(i))
                .unwrap();
            prop_assert!(d >= last);
            last = d;
        }
    }

    /// Dispatched f32 kernels agree with the scalar reference on every
    /// dimension, including awkward tails.
    #[test]
    fn f32_kernels_match_reference(
        seed in 0u64..1000,
        dim_idx in 0usize..12,
    ) {
        const DIMS: [usize; 12] = [1, 4, 8, 16, 32, 63, 64, 65, 127, 128, 129, 256];
        let n = DIMS[dim_idx];
        let mut state = seed.wrapping_mul(0x9e3779b97f4a7c15).wrapping_add(1);
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 40) as f32 / (1u64 << 24) as f32 - 0.5
        };
        let a: Vec<f32> = (0..n).map(|_| next()).collect();
        let b: Vec<f32> = (0..n).map(|_| next()).collect();

        let rel = |x: f32, y: f32| (x - y).abs() / y.abs().max(1.0);
        prop_assert!(rel(simd::l2_sqr(&a, &b), scalar::l2_sqr(&a, &b)) <= 1e-5);
        prop_assert!(rel(simd::ip(&a, &b), scalar::ip(&a, &b)) <= 1e-5);
        prop_assert!(
            rel(simd::cosine_distance(&a, &b), scalar::cosine_distance(&a, &b)) <= 1e-5
        );
    }

    /// Integer code kernels are exact across dimensions.
    #[test]
    fn code_kernels_match_reference(
        a in prop::collection::vec(any::<u8>(), 0..300),
    ) {
        let b: Vec<u8> = a.iter().rev().copied().collect();
        prop_assert_eq!(simd::l2_sqr_sq8(&a, &b), scalar::l2_sqr_sq8(&a, &b));
        prop_assert_eq!(simd::ip_sq8(&a, &b), scalar::ip_sq8(&a, &b));
        let n_values = a.len() * 2;
        prop_assert_eq!(
            simd::l2_sqr_sq4(&a, &b, n_values),
            scalar::l2_sqr_sq4(&a, &b, n_values)
        );
    }
}
