//! Full-precision storage: identity encoding with an aligned stride.

use log::debug;

use crate::distance::Metric;
use crate::error::{AnnError, Result};
use crate::memory::{AlignedBytes, align_up};
use crate::quantization::{CODE_ALIGN, Quantizer, QueryCode};
use crate::search::pool::{EMPTY_ID, LinearPool};
use crate::simd;

fn neg_ip(a: &[f32], b: &[f32]) -> f32 {
    -simd::ip(a, b)
}

/// Identity "quantizer": the code arena holds the corpus as padded f32.
///
/// Doubles as the reorder companion inside the lossy encodings, where
/// [`Fp32Quantizer::exact_distance`] supplies the re-ranking distances.
pub struct Fp32Quantizer {
    dim: usize,
    d_align: usize,
    n: usize,
    metric: Metric,
    kernel: fn(&[f32], &[f32]) -> f32,
    codes: AlignedBytes,
}

impl Fp32Quantizer {
    pub fn new(metric: Metric, dim: usize) -> Result<Self> {
        if dim == 0 {
            return Err(AnnError::InvalidArgument("dimension must be positive".into()));
        }
        let table = simd::kernels();
        let kernel = match metric {
            Metric::L2 => table.l2_sqr,
            Metric::Ip => neg_ip,
            Metric::Cosine => table.cosine_distance,
        };
        Ok(Self {
            dim,
            d_align: align_up(dim, CODE_ALIGN),
            n: 0,
            metric,
            kernel,
            codes: AlignedBytes::zeroed(0)?,
        })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    /// Padded f32 view of corpus vector `i`.
    #[inline]
    pub fn vector(&self, i: usize) -> &[f32] {
        let all = self.codes.as_f32();
        &all[i * self.d_align..(i + 1) * self.d_align]
    }

    /// Exact metric distance between an unpadded query and corpus vector `i`.
    #[inline]
    pub fn exact_distance(&self, query: &[f32], i: usize) -> f32 {
        (self.kernel)(query, &self.vector(i)[..self.dim])
    }
}

impl Quantizer for Fp32Quantizer {
    fn train(&mut self, data: &[f32], n: usize, dim: usize) -> Result<()> {
        if dim != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: dim,
            });
        }
        if data.len() < n * dim {
            return Err(AnnError::InvalidArgument(format!(
                "corpus slice holds {} floats, expected {}",
                data.len(),
                n * dim
            )));
        }
        self.n = n;
        self.codes = AlignedBytes::zeroed(n * self.code_size())?;
        let stride = self.code_size();
        for i in 0..n {
            let row = &data[i * dim..(i + 1) * dim];
            let mut tmp = vec![0u8; stride];
            self.encode(row, &mut tmp);
            self.codes[i * stride..(i + 1) * stride].copy_from_slice(&tmp);
        }
        debug!("fp32 storage ready: {} x {} ({} bytes/vector)", n, dim, stride);
        Ok(())
    }

    fn encode(&self, input: &[f32], code: &mut [u8]) {
        debug_assert_eq!(code.len(), self.code_size());
        for (j, &x) in input.iter().take(self.dim).enumerate() {
            code[j * 4..j * 4 + 4].copy_from_slice(&x.to_le_bytes());
        }
        code[self.dim * 4..].fill(0);
    }

    fn decode(&self, code: &[u8], out: &mut [f32]) {
        for (j, slot) in out.iter_mut().take(self.dim).enumerate() {
            let mut b = [0u8; 4];
            b.copy_from_slice(&code[j * 4..j * 4 + 4]);
            *slot = f32::from_le_bytes(b);
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
        buf.as_f32_mut()[..self.dim].copy_from_slice(query);
        Ok(QueryCode::new(buf))
    }

    #[inline]
    fn query_distance(&self, query: &QueryCode, i: usize) -> f32 {
        (self.kernel)(query.as_f32(), self.vector(i))
    }

    #[inline]
    fn query_distance_raw(&self, query: &QueryCode, code: &[u8]) -> f32 {
        // Safety: codes are 64-byte aligned f32 rows by construction.
        let row = unsafe {
            std::slice::from_raw_parts(code.as_ptr() as *const f32, self.d_align)
        };
        (self.kernel)(query.as_f32(), row)
    }

    #[inline]
    fn code_size(&self) -> usize {
        self.d_align * 4
    }

    #[inline]
    fn dim(&self) -> usize {
        self.dim
    }

    fn name(&self) -> &'static str {
        "FP32"
    }

    #[inline]
    fn prefetch(&self, i: usize, lines: usize) {
        simd::prefetch_l1(self.code(i).as_ptr(), lines);
    }

    /// Pool distances are already exact; emit the first k ids as-is.
    fn reorder(&self, pool: &LinearPool, _raw_query: &[f32], out: &mut [i32], k: usize) {
        let take = k.min(pool.size());
        for i in 0..take {
            out[i] = pool.id(i);
        }
        for slot in out.iter_mut().take(k).skip(take) {
            *slot = EMPTY_ID;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_is_identity() {
        let q = Fp32Quantizer::new(Metric::L2, 5).unwrap();
        let x = [1.0f32, -2.0, 3.5, 0.25, -0.125];
        let mut code = vec![0u8; q.code_size()];
        q.encode(&x, &mut code);
        let mut back = [0f32; 5];
        q.decode(&code, &mut back);
        assert_eq!(x, back);
        // alignment tail is zeroed
        assert!(code[20..].iter().all(|&b| b == 0));
    }

    #[test]
    fn query_distance_matches_metric() {
        let mut q = Fp32Quantizer::new(Metric::L2, 3).unwrap();
        let data = [0.0f32, 0.0, 0.0, 3.0, 4.0, 0.0];
        q.train(&data, 2, 3).unwrap();
        let qc = q.encode_query(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(q.query_distance(&qc, 0), 0.0);
        assert!((q.query_distance(&qc, 1) - 25.0).abs() < 1e-5);
    }

    #[test]
    fn train_rejects_dim_mismatch() {
        let mut q = Fp32Quantizer::new(Metric::L2, 4).unwrap();
        assert!(matches!(
            q.train(&[0.0; 12], 2, 6),
            Err(AnnError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn reorder_copies_pool_prefix_and_pads() {
        let q = Fp32Quantizer::new(Metric::L2, 4).unwrap();
        let mut pool = LinearPool::new(10, 5, 5);
        pool.insert(2, 0.2);
        pool.insert(1, 0.1);
        let mut out = [0i32; 4];
        q.reorder(&pool, &[0.0; 4], &mut out, 4);
        assert_eq!(out, [1, 2, EMPTY_ID, EMPTY_ID]);
    }
}
