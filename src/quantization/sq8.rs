//! 8-bit scalar quantization with per-dimension affine parameters.

use std::time::Instant;

use log::info;

use crate::distance::Metric;
use crate::error::{AnnError, Result};
use crate::memory::{AlignedBytes, align_up};
use crate::quantization::{CODE_ALIGN, Fp32Quantizer, Quantizer, QueryCode, reorder_exact};
use crate::search::pool::LinearPool;
use crate::simd;

fn neg_ip_sq8(a: &[u8], b: &[u8]) -> f32 {
    -simd::ip_sq8(a, b)
}

/// Per-dimension affine quantizer: `code = round((x - offset[j]) / scale[j])`
/// clamped to `0..=255`, with `offset = min`, `scale = range / 255`
/// learned from the training corpus. Zero-range dimensions use scale 1.
///
/// Query distances run entirely in code space; the FP32 companion restores
/// precision during [`Quantizer::reorder`].
pub struct Sq8Quantizer {
    dim: usize,
    d_align: usize,
    n: usize,
    kernel: fn(&[u8], &[u8]) -> f32,
    offset: Vec<f32>,
    scale: Vec<f32>,
    codes: AlignedBytes,
    companion: Fp32Quantizer,
}

impl Sq8Quantizer {
    pub fn new(metric: Metric, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(AnnError::InvalidArgument("dimension must be positive".into()));
        }
        let table = simd::kernels();
        let kernel = match metric {
            Metric::L2 => table.l2_sqr_sq8,
            Metric::Ip => neg_ip_sq8,
            Metric::Cosine => {
                return Err(AnnError::Unsupported("cosine metric on SQ8 codes".into()));
            }
        };
        let d_align = align_up(dim, CODE_ALIGN);
        Ok(Self {
            dim,
            d_align,
            n: 0,
            kernel,
            offset: vec![0.0; d_align],
            scale: vec![1.0; d_align],
            codes: AlignedBytes::zeroed(0)?,
            companion: Fp32Quantizer::new(metric, dim)?,
        })
    }

    /// Learned per-dimension parameters (offset, scale).
    pub fn params(&self, j: usize) -> (f32, f32) {
        (self.offset[j], self.scale[j])
    }
}

impl Quantizer for Sq8Quantizer {
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

        let mut min = vec![f32::INFINITY; dim];
        let mut max = vec![f32::NEG_INFINITY; dim];
        for row in data[..n * dim].chunks_exact(dim) {
            for (j, &x) in row.iter().enumerate() {
                min[j] = min[j].min(x);
                max[j] = max[j].max(x);
            }
        }
        for j in 0..dim {
            self.offset[j] = min[j];
            let range = max[j] - min[j];
            self.scale[j] = if range == 0.0 { 1.0 } else { range / 255.0 };
        }
        for j in dim..self.d_align {
            self.offset[j] = 0.0;
            self.scale[j] = 1.0;
        }

        self.n = n;
        self.codes = AlignedBytes::zeroed(n * self.d_align)?;
        let stride = self.d_align;
        for i in 0..n {
            let row = &data[i * dim..(i + 1) * dim];
            let mut tmp = vec![0u8; stride];
            self.encode(row, &mut tmp);
            self.codes[i * stride..(i + 1) * stride].copy_from_slice(&tmp);
        }

        self.companion.train(data, n, dim)?;
        info!(
            "sq8 train: {} x {} in {:.2?} ({} bytes/vector)",
            n,
            dim,
            started.elapsed(),
            stride
        );
        Ok(())
    }

    fn encode(&self, input: &[f32], code: &mut [u8]) {
        debug_assert_eq!(code.len(), self.d_align);
        for (j, &x) in input.iter().take(self.dim).enumerate() {
            let q = ((x - self.offset[j]) / self.scale[j]).round();
            code[j] = q.clamp(0.0, 255.0) as u8;
        }
        code[self.dim..].fill(0);
    }

    fn decode(&self, code: &[u8], out: &mut [f32]) {
        for (j, slot) in out.iter_mut().take(self.dim).enumerate() {
            *slot = code[j] as f32 * self.scale[j] + self.offset[j];
        }
    }

    #[inline]
    fn code(&self, i: usize) -> &[u8] {
        &self.codes[i * self.d_align..(i + 1) * self.d_align]
    }

    fn encode_query(&self, query: &[f32]) -> Result<QueryCode> {
        if query.len() != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        let mut buf = AlignedBytes::zeroed(self.d_align)?;
        self.encode(query, &mut buf);
        Ok(QueryCode::new(buf))
    }

    #[inline]
    fn query_distance(&self, query: &QueryCode, i: usize) -> f32 {
        (self.kernel)(query.as_bytes(), self.code(i))
    }

    #[inline]
    fn query_distance_raw(&self, query: &QueryCode, code: &[u8]) -> f32 {
        (self.kernel)(query.as_bytes(), code)
    }

    #[inline]
    fn code_size(&self) -> usize {
        self.d_align
    }

    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "SQ8"
    }

    #[inline]
    fn prefetch(&self, i: usize, lines: usize) {
        simd::prefetch_l1(self.code(i).as_ptr(), lines);
    }

    fn reorder(&self, pool: &LinearPool, raw_query: &[f32], out: &mut [i32], k: usize) {
        reorder_exact(&self.companion, pool, raw_query, out, k);
    }
}
