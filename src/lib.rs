// Allow unsafe operations in unsafe fn without explicit unsafe blocks
// (Rust 2024 edition strictness - the SIMD kernel bodies are unsafe fns
// whose every statement is an intrinsic call).
#![allow(unsafe_op_in_unsafe_fn)]

//! nearfield: approximate nearest neighbor search over dense vectors.
//!
//! Builds a hierarchical navigable proximity graph over a corpus of f32
//! vectors and answers top-k queries with a bounded best-first traversal
//! over scalar-quantized codes.
//!
//! # Pipeline
//!
//! - **Build**: [`index::Index`] inserts points one at a time into a
//!   layered graph ([`hnsw`]), then freezes the base layer into a dense
//!   adjacency arena and the upper layers into a greedy-descent
//!   initializer ([`graph`]).
//! - **Search**: [`search::Searcher`] encodes the query
//!   ([`quantization`]), descends to the base layer, expands the frontier
//!   through a distance-ordered candidate pool with code prefetching, and
//!   re-ranks the survivors at full precision.
//!
//! # Quantizer levels
//!
//! | level | encoding | bytes/dim | notes |
//! |-------|----------|-----------|-------|
//! | 0 | FP32 | 4 | exact distances, no reorder needed |
//! | 1 | SQ8 | 1 | per-dimension affine, FP32 reorder |
//! | 2 | SQ4 | 0.5 | global affine, packed nibbles, L2 only |
//!
//! # Example
//!
//! ```
//! use nearfield::distance::Metric;
//! use nearfield::hnsw::HnswConfig;
//! use nearfield::index::{AnySearcher, Index, QuantLevel};
//!
//! # fn main() -> nearfield::Result<()> {
//! let dim = 8;
//! let data: Vec<f32> = (0..64 * dim).map(|i| (i * 37 % 101) as f32 * 0.01).collect();
//!
//! let index = Index::with_config(
//!     dim,
//!     Metric::L2,
//!     HnswConfig { m: 8, ef_construction: 40, ..Default::default() },
//! )?;
//! let graph = index.build(&data, 64, dim)?;
//!
//! let mut searcher = AnySearcher::new(graph, &data, Metric::L2, QuantLevel::Fp32)?;
//! searcher.set_ef(32);
//! let ids = searcher.search(&data[..dim], 5)?;
//! assert_eq!(ids[0], 0);
//! # Ok(())
//! # }
//! ```
//!
//! Distance kernels are selected once at startup from a CPU-capability
//! probe ([`simd::kernels`]); searches are lock-free and reentrant.

pub mod distance;
pub mod error;
pub mod graph;
pub mod hnsw;
pub mod index;
pub mod io;
pub mod memory;
pub mod quantization;
pub mod search;
pub mod simd;

pub use distance::Metric;
pub use error::{AnnError, Result};
pub use graph::Graph;
pub use index::{AnySearcher, Index, QuantLevel, set_num_threads};
