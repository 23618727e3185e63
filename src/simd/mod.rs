//! Distance kernels with one-time runtime dispatch.
//!
//! The hot path calls these functions millions of times per second, so the
//! implementation is chosen exactly once: a capability probe at first use
//! fills a table of plain function pointers, and every public kernel reads
//! through that table. No per-call feature branching.
//!
//! Kernel set:
//!
//! | kernel | input | result |
//! |--------|-------|--------|
//! | [`l2_sqr`] | f32 | Σ (a−b)² |
//! | [`ip`] | f32 | Σ a·b |
//! | [`cosine_distance`] | f32 (unit-norm) | 1 − Σ a·b |
//! | [`l2_sqr_sq8`] | u8 codes | Σ (a−b)² |
//! | [`ip_sq8`] | u8 codes | Σ a·b |
//! | [`l2_sqr_sq4`] | packed nibbles | Σ (a−b)² |
//!
//! All kernels accept any length, handle scalar tails, and agree with the
//! scalar references to within 1e-5 relative error (SIMD reductions may
//! reassociate and use FMA).

pub mod scalar;

#[cfg(target_arch = "aarch64")]
mod neon;
#[cfg(target_arch = "x86_64")]
mod x86;

use std::sync::OnceLock;

/// The vector-capability level selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    Avx512,
    Avx2,
    Sse,
    Neon,
    Scalar,
}

/// Function-pointer table binding every kernel to one implementation.
#[derive(Clone, Copy)]
pub struct KernelTable {
    pub level: SimdLevel,
    pub l2_sqr: fn(&[f32], &[f32]) -> f32,
    pub ip: fn(&[f32], &[f32]) -> f32,
    pub cosine_distance: fn(&[f32], &[f32]) -> f32,
    pub l2_sqr_sq8: fn(&[u8], &[u8]) -> f32,
    pub ip_sq8: fn(&[u8], &[u8]) -> f32,
    pub l2_sqr_sq4: fn(&[u8], &[u8], usize) -> f32,
}

const SCALAR_TABLE: KernelTable = KernelTable {
    level: SimdLevel::Scalar,
    l2_sqr: scalar::l2_sqr,
    ip: scalar::ip,
    cosine_distance: scalar::cosine_distance,
    l2_sqr_sq8: scalar::l2_sqr_sq8,
    ip_sq8: scalar::ip_sq8,
    l2_sqr_sq4: scalar::l2_sqr_sq4,
};

#[allow(unreachable_code)]
fn probe() -> KernelTable {
    #[cfg(target_arch = "x86_64")]
    {
        let avx2 = is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma");
        // AVX-512-capable parts always run the AVX2 bodies; dedicated
        // 512-bit bodies are not worth the frequency licensing they cost.
        let level = if is_x86_feature_detected!("avx512f") && avx2 {
            SimdLevel::Avx512
        } else if avx2 {
            SimdLevel::Avx2
        } else {
            SimdLevel::Sse
        };
        return match level {
            SimdLevel::Avx512 | SimdLevel::Avx2 => KernelTable {
                level,
                l2_sqr: x86::l2_sqr_avx2,
                ip: x86::ip_avx2,
                cosine_distance: x86::cosine_distance_avx2,
                l2_sqr_sq8: x86::l2_sqr_sq8_avx2,
                ip_sq8: x86::ip_sq8_avx2,
                l2_sqr_sq4: x86::l2_sqr_sq4_avx2,
            },
            _ => KernelTable {
                level: SimdLevel::Sse,
                l2_sqr: x86::l2_sqr_sse,
                ip: x86::ip_sse,
                cosine_distance: x86::cosine_distance_sse,
                ..SCALAR_TABLE
            },
        };
    }

    #[cfg(target_arch = "aarch64")]
    {
        return KernelTable {
            level: SimdLevel::Neon,
            l2_sqr: neon::l2_sqr_neon,
            ip: neon::ip_neon,
            cosine_distance: neon::cosine_distance_neon,
            ..SCALAR_TABLE
        };
    }

    SCALAR_TABLE
}

/// The process-wide kernel table. Probed once, immutable afterwards.
pub fn kernels() -> &'static KernelTable {
    static TABLE: OnceLock<KernelTable> = OnceLock::new();
    TABLE.get_or_init(probe)
}

/// Squared Euclidean distance.
#[inline]
pub fn l2_sqr(a: &[f32], b: &[f32]) -> f32 {
    (kernels().l2_sqr)(a, b)
}

/// Inner product.
#[inline]
pub fn ip(a: &[f32], b: &[f32]) -> f32 {
    (kernels().ip)(a, b)
}

/// Cosine distance, 1 − Σ a·b. Inputs must be unit-norm.
#[inline]
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    (kernels().cosine_distance)(a, b)
}

/// Squared Euclidean distance over SQ8 codes.
#[inline]
pub fn l2_sqr_sq8(a: &[u8], b: &[u8]) -> f32 {
    (kernels().l2_sqr_sq8)(a, b)
}

/// Inner product over SQ8 codes.
#[inline]
pub fn ip_sq8(a: &[u8], b: &[u8]) -> f32 {
    (kernels().ip_sq8)(a, b)
}

/// Squared Euclidean distance over packed SQ4 codes (`n_values` unpacked values).
#[inline]
pub fn l2_sqr_sq4(a: &[u8], b: &[u8], n_values: usize) -> f32 {
    (kernels().l2_sqr_sq4)(a, b, n_values)
}

/// Issue `lines` L1 cache-line prefetches starting at `ptr`.
#[inline(always)]
pub fn prefetch_l1(ptr: *const u8, lines: usize) {
    #[cfg(target_arch = "x86_64")]
    {
        use std::arch::x86_64::{_MM_HINT_T0, _mm_prefetch};
        for i in 0..lines {
            // Safety: prefetch never faults, even on invalid addresses.
            unsafe { _mm_prefetch::<_MM_HINT_T0>(ptr.add(i * 64) as *const i8) };
        }
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        let _ = (ptr, lines);
    }
}
