//! 4-bit scalar quantization: one global affine range, two values per byte.

use std::time::Instant;

use log::info;

use crate::distance::Metric;
use crate::error::{AnnError, Result};
use crate::memory::{AlignedBytes, align_up};
use crate::quantization::{CODE_ALIGN, Fp32Quantizer, Quantizer, QueryCode, reorder_exact};
use crate::search::pool::LinearPool;
use crate::simd;

/// Global affine quantizer to 4 bits: `code = round((x - offset) / scale)`
/// clamped to `0..=15`, packed two per byte (low nibble = even index,
/// high nibble = odd index). Only the L2 kernel exists for this code type.
pub struct Sq4Quantizer {
    dim: usize,
    d_align: usize,
    n: usize,
    kernel: fn(&[u8], &[u8], usize) -> f32,
    offset: f32,
    scale: f32,
    codes: AlignedBytes,
    companion: Fp32Quantizer,
}

impl Sq4Quantizer {
    pub fn new(metric: Metric, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(AnnError::InvalidArgument("dimension must be positive".into()));
        }
        let kernel = match metric {
            Metric::L2 => simd::kernels().l2_sqr_sq4,
            Metric::Ip => {
                return Err(AnnError::Unsupported("inner product on SQ4 codes".into()));
            }
            Metric::Cosine => {
                return Err(AnnError::Unsupported("cosine metric on SQ4 codes".into()));
            }
        };
        let d_align = align_up(dim, CODE_ALIGN);
        Ok(Self {
            dim,
            d_align,
            n: 0,
            kernel,
            offset: 0.0,
            scale: 1.0,
            codes: AlignedBytes::zeroed(0)?,
            companion: Fp32Quantizer::new(metric, dim)?,
        })
    }

    /// Learned global parameters (offset, scale).
    pub fn params(&self) -> (f32, f32) {
        (self.offset, self.scale)
    }
}

impl Quantizer for Sq4Quantizer {
    fn train(&mut self, data: &[f32], n: usize, dim: usize) -> Result<()> {
        if dim != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: dim,
            });
        }
        if n == 0 || data.len() < n * dim {
            return Err(AnnError::InvalidArgument(
                "training corpus is empty or undersized".into(),
            ));
        }
        let started = Instant::now();

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for &x in &data[..n * dim] {
            min = min.min(x);
            max = max.max(x);
        }
        self.offset = min;
        let range = max - min;
        self.scale = if range == 0.0 { 1.0 } else { range / 15.0 };

        self.n = n;
        self.codes = AlignedBytes::zeroed(n * self.code_size())?;
        let stride = self.code_size();
        for i in 0..n {
            let row = &data[i * dim..(i + 1) * dim];
            let mut tmp = vec![0u8; stride];
            self.encode(row, &mut tmp);
            self.codes[i * stride..(i + 1) * stride].copy_from_slice(&tmp);
        }

        self.companion.train(data, n, dim)?;
        info!(
            "sq4 train: {} x {} in {:.2?} ({} bytes/vector)",
            n,
            dim,
            started.elapsed(),
            stride
        );
        Ok(())
    }

    fn encode(&self, input: &[f32], code: &mut [u8]) {
        debug_assert_eq!(code.len(), self.code_size());
        code.fill(0);
        for (j, &x) in input.iter().take(self.dim).enumerate() {
            let q = ((x - self.offset) / self.scale).round().clamp(0.0, 15.0) as u8;
            if j % 2 == 0 {
                code[j / 2] |= q;
            } else {
                code[j / 2] |= q << 4;
            }
        }
    }

    fn decode(&self, code: &[u8], out: &mut [f32]) {
        for (j, slot) in out.iter_mut().take(self.dim).enumerate() {
            let q = if j % 2 == 0 {
                code[j / 2] & 0x0f
            } else {
                code[j / 2] >> 4
            };
            *slot = q as f32 * self.scale + self.offset;
        }
    }

    #[inline]
    fn code(&self, i: usize) -> &[u8] {
        let stride = self.code_size();
        &self.codes[i * stride..(i + 1) * stride]
    }

    fn encode_query(&self, query: &[f32]) -> Result<QueryCode> {
        if query.len() != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut buf = AlignedBytes::zeroed(self.code_size())?;
        self.encode(query, &mut buf);
        Ok(QueryCode::new(buf))
    }

    #[inline]
    fn query_distance(&self, query: &QueryCode, i: usize) -> f32 {
        (self.kernel)(query.as_bytes(), self.code(i), self.d_align)
    }

    #[inline]
    fn query_distance_raw(&self, query: &QueryCode, code: &[u8]) -> f32 {
        (self.kernel)(query.as_bytes(), code, self.d_align)
    }

    #[inline]
    fn code_size(&self) -> usize {
        self.d_align / 2
    }

    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "SQ4"
    }

    #[inline]
    fn prefetch(&self, i: usize, lines: usize) {
        simd::prefetch_l1(self.code(i).as_ptr(), lines);
    }

    fn reorder(&self, pool: &LinearPool, raw_query: &[f32], out: &mut [i32], k: usize) {
        reorder_exact(&self.companion, pool, raw_query, out, k);
    }
}
