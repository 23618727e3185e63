//! Hierarchical navigable small-world graph construction.
//!
//! Builds the layered proximity graph: every point draws a geometric
//! level, descends greedily from the current top entry point, runs a
//! bounded best-first search on each layer it joins, and connects to a
//! diversity-pruned neighbor set with reciprocal edges. The finished
//! hierarchy is frozen into a [`crate::graph::DenseGraph`] (arity 2M at
//! the base layer) plus a [`crate::graph::HnswInitializer`] (M neighbors
//! per upper layer).
//!
//! Insertion is serial; construction-time distances are computed in full
//! precision through the dispatched kernels.

mod builder;

pub use builder::HnswBuilder;

/// Construction parameters.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    /// Target arity per node on upper layers; the base layer uses `2 * m`.
    pub m: usize,
    /// Candidate-pool breadth during insertion.
    pub ef_construction: usize,
    /// Capacity hint; grown automatically when the corpus is larger.
    pub max_elements: usize,
    /// Seed for the level-assignment RNG.
    pub random_seed: u64,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: 32,
            ef_construction: 200,
            max_elements: 0,
            random_seed: 100,
        }
    }
}

impl HnswConfig {
    /// Level-probability multiplier `mL = 1 / ln(M)`.
    pub(crate) fn ml(&self) -> f64 {
        1.0 / (self.m as f64).ln()
    }
}
