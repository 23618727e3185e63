//! Vector storage and scalar quantization.
//!
//! A quantizer owns the encoded corpus (a 64-byte-aligned code arena) and
//! the distance kernel matching its metric and code type. Three encodings:
//!
//! - [`Fp32Quantizer`]: identity; codes are the padded f32 vectors.
//! - [`Sq8Quantizer`]: per-dimension affine quantization to u8.
//! - [`Sq4Quantizer`]: global affine quantization to packed 4-bit codes.
//!
//! SQ8 and SQ4 carry an FP32 companion trained on the same corpus; the
//! final [`Quantizer::reorder`] step re-ranks pool candidates with exact
//! distances before results are returned.
//!
//! The metric/code-type pairing is fixed at construction: an encoding
//! without a kernel for the requested metric (cosine on SQ8/SQ4, inner
//! product on SQ4) fails with `Unsupported`.

mod fp32;
mod sq4;
mod sq8;

pub use fp32::Fp32Quantizer;
pub use sq4::Sq4Quantizer;
pub use sq8::Sq8Quantizer;

use crate::error::Result;
use crate::memory::AlignedBytes;
use crate::search::pool::LinearPool;

/// Alignment unit, in elements, for code strides.
pub(crate) const CODE_ALIGN: usize = 16;

/// An encoded query, held for the duration of one search call.
///
/// The buffer is 64-byte aligned and in the owning quantizer's code
/// format, so code-space kernels can run directly against corpus codes.
pub struct QueryCode {
    buf: AlignedBytes,
}

impl QueryCode {
    pub(crate) fn new(buf: AlignedBytes) -> Self {
        Self { buf }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub(crate) fn as_f32(&self) -> &[f32] {
        self.buf.as_f32()
    }
}

/// Contract shared by all corpus encodings.
///
/// `train` populates parameters and fills the code arena; everything else
/// operates on the trained state. The search engine is monomorphized over
/// the implementing type, so `query_distance` compiles to a direct call
/// into the bound kernel.
pub trait Quantizer: Send + Sync {
    /// Learn encoding parameters from the corpus and encode it.
    fn train(&mut self, data: &[f32], n: usize, dim: usize) -> Result<()>;

    /// Encode one vector into `code` (length [`Quantizer::code_size`]).
    /// Any alignment tail is zero-filled.
    fn encode(&self, input: &[f32], code: &mut [u8]);

    /// Decode one code back to f32 (length [`Quantizer::dim`]).
    fn decode(&self, code: &[u8], out: &mut [f32]);

    /// Stable view of the i-th encoded vector.
    fn code(&self, i: usize) -> &[u8];

    /// Encode a query for subsequent code-space distance calls.
    fn encode_query(&self, query: &[f32]) -> Result<QueryCode>;

    /// Code-space distance between the encoded query and corpus vector `i`.
    fn query_distance(&self, query: &QueryCode, i: usize) -> f32;

    /// Code-space distance between the encoded query and an arbitrary code.
    fn query_distance_raw(&self, query: &QueryCode, code: &[u8]) -> f32;

    /// Bytes per encoded vector (the stride of the code arena).
    fn code_size(&self) -> usize;

    /// Input dimensionality.
    fn dim(&self) -> usize;

    /// Human-readable encoding name.
    fn name(&self) -> &'static str;

    /// Issue `lines` L1 prefetches for corpus vector `i`'s code.
    fn prefetch(&self, i: usize, lines: usize);

    /// Write the final top-`k` ids into `out`, re-ranking pool candidates
    /// with full-precision distances where the encoding is lossy. Slots
    /// past the number of available candidates are set to −1.
    fn reorder(&self, pool: &LinearPool, raw_query: &[f32], out: &mut [i32], k: usize);
}

/// Shared reorder body for the quantized encodings: re-score every pool
/// candidate against the raw query using the FP32 companion, sort
/// ascending, emit the top k.
pub(crate) fn reorder_exact(
    companion: &Fp32Quantizer,
    pool: &LinearPool,
    raw_query: &[f32],
    out: &mut [i32],
    k: usize,
) {
    let mut rescored: Vec<(i32, f32)> = Vec::with_capacity(pool.size());
    for i in 0..pool.size() {
        let id = pool.id(i);
        if id >= 0 {
            rescored.push((id, companion.exact_distance(raw_query, id as usize)));
        }
    }
    rescored.sort_by(|a, b| a.1.total_cmp(&b.1));

    let take = k.min(rescored.len());
    for i in 0..take {
        out[i] = rescored[i].0;
    }
    for slot in out.iter_mut().take(k).skip(take) {
        *slot = crate::search::pool::EMPTY_ID;
    }
}
