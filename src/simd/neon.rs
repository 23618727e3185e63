//! NEON kernel bodies for aarch64.
//!
//! NEON is mandatory on aarch64, so no runtime probe is needed. Only the
//! f32 kernels have vector bodies; the code-space kernels use the scalar
//! references, matching how the dispatch table treats this level.

#![cfg(target_arch = "aarch64")]

use std::arch::aarch64::*;

pub fn l2_sqr_neon(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    let chunks = n / 4;
    // Safety: neon is part of the aarch64 baseline; loads are unaligned.
    unsafe {
        let mut acc = vdupq_n_f32(0.0);
        for i in 0..chunks {
            let va = vld1q_f32(a.as_ptr().add(i * 4));
            let vb = vld1q_f32(b.as_ptr().add(i * 4));
            let d = vsubq_f32(va, vb);
            acc = vfmaq_f32(acc, d, d);
        }
        let mut sum = vaddvq_f32(acc);
        for i in chunks * 4..n {
            let d = a[i] - b[i];
            sum += d * d;
        }
        sum
    }
}

pub fn ip_neon(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len();
    let chunks = n / 4;
    // Safety: as above.
    unsafe {
        let mut acc = vdupq_n_f32(0.0);
        for i in 0..chunks {
            let va = vld1q_f32(a.as_ptr().add(i * 4));
            let vb = vld1q_f32(b.as_ptr().add(i * 4));
            acc = vfmaq_f32(acc, va, vb);
        }
        let mut sum = vaddvq_f32(acc);
        for i in chunks * 4..n {
            sum += a[i] * b[i];
        }
        sum
    }
}

pub fn cosine_distance_neon(a: &[f32], b: &[f32]) -> f32 {
    1.0 - ip_neon(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::scalar;

    #[test]
    fn neon_matches_scalar() {
        for n in [0usize, 1, 3, 4, 5, 63, 64, 65, 128] {
            let a: Vec<f32> = (0..n).map(|i| (i as f32).sin()).collect();
            let b: Vec<f32> = (0..n).map(|i| (i as f32).cos()).collect();
            let rel = |x: f32, y: f32| (x - y).abs() / y.abs().max(1.0);
            assert!(rel(l2_sqr_neon(&a, &b), scalar::l2_sqr(&a, &b)) <= 1e-5);
            assert!(rel(ip_neon(&a, &b), scalar::ip(&a, &b)) <= 1e-5);
        }
    }
}
