//! Best-first graph search with prefetch scheduling.
//!
//! [`Searcher`] owns an immutable graph and a trained quantizer, and is
//! monomorphized over the quantizer type so the inner loop's distance
//! calls compile down to the bound kernel. Per-query state (encoded
//! query, candidate pool, visited bitset) lives on the stack of one
//! `search` call, so a single engine is shared freely across threads.
//!
//! Two prefetch parameters shape the hot loop: `po` (how many neighbors
//! ahead to prefetch codes for) and `pl` (cache lines per code prefetch).
//! [`Searcher::optimize`] sweeps both over sampled corpus queries and
//! keeps the fastest pair.

pub mod pool;

use std::time::Instant;

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;

use crate::error::{AnnError, Result};
use crate::graph::Graph;
use crate::quantization::{Quantizer, QueryCode};
use self::pool::{EMPTY_ID, LinearPool};

/// Queries sampled from the corpus for the prefetch sweep.
const OPTIMIZE_POINTS: usize = 1000;
/// Upper bound on the neighbor-lookahead candidates tried.
const TRY_POS: usize = 10;
/// Upper bound on the cache-lines-per-code candidates tried.
const TRY_PLS: usize = 5;
/// Result depth used while timing the sweep.
const TRY_K: usize = 10;
/// Seed for the corpus sample; fixed so the sample is reproducible.
const SAMPLE_SEED: u64 = 42;

/// Graph search engine bound to one quantizer.
pub struct Searcher<Q: Quantizer> {
    graph: Graph,
    quantizer: Q,
    nb: usize,
    dim: usize,
    ef: usize,
    po: usize,
    pl: usize,
    graph_po: usize,
    optimize_queries: Vec<f32>,
}

impl<Q: Quantizer> Searcher<Q> {
    /// Wrap a built (or loaded) graph and an untrained quantizer.
    pub fn new(graph: Graph, quantizer: Q) -> Self {
        let graph_po = (graph.max_degree() / 16).max(1);
        Self {
            graph,
            quantizer,
            nb: 0,
            dim: 0,
            ef: 32,
            po: 1,
            pl: 1,
            graph_po,
            optimize_queries: Vec::new(),
        }
    }

    /// Train the quantizer on the corpus and draw the auto-tune sample.
    pub fn set_data(&mut self, data: &[f32], n: usize, dim: usize) -> Result<()> {
        if n != self.graph.num_nodes() {
            return Err(AnnError::InvalidArgument(format!(
                "corpus has {} points but the graph has {} nodes",
                n,
                self.graph.num_nodes()
            )));
        }
        let started = Instant::now();
        self.quantizer.train(data, n, dim)?;
        debug!("quantizer {} trained in {:.2?}", self.quantizer.name(), started.elapsed());

        self.nb = n;
        self.dim = dim;

        let samples = OPTIMIZE_POINTS.min(n.saturating_sub(1));
        let mut rng = StdRng::seed_from_u64(SAMPLE_SEED);
        let picked = rand::seq::index::sample(&mut rng, n, samples);
        self.optimize_queries = Vec::with_capacity(samples * dim);
        for i in picked {
            self.optimize_queries
                .extend_from_slice(&data[i * dim..(i + 1) * dim]);
        }
        Ok(())
    }

    pub fn set_ef(&mut self, ef: usize) {
        self.ef = ef;
    }

    pub fn ef(&self) -> usize {
        self.ef
    }

    /// The tuned `(po, pl)` prefetch pair.
    pub fn prefetch_params(&self) -> (usize, usize) {
        (self.po, self.pl)
    }

    pub fn quantizer(&self) -> &Q {
        &self.quantizer
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Top-`k` search. `out` receives `k` ids, padded with −1 when fewer
    /// than `k` candidates exist.
    pub fn search(&self, query: &[f32], k: usize, out: &mut [i32]) -> Result<()> {
        if self.nb == 0 {
            return Err(AnnError::NotInitialized("set_data has not been called".into()));
        }
        if query.len() != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: query.len(),
            });
        }
        if k == 0 || out.len() < k {
            return Err(AnnError::InvalidArgument(format!(
                "k = {k} with an output buffer of {}",
                out.len()
            )));
        }

        let encoded = self.quantizer.encode_query(query)?;
        let mut pool = LinearPool::new(self.nb, k.max(self.ef), k);
        self.graph.initialize_search(&mut pool, &self.quantizer, &encoded)?;
        self.expand(&mut pool, &encoded);
        self.quantizer.reorder(&pool, query, out, k);
        Ok(())
    }

    /// Convenience wrapper returning the ids as a vector.
    pub fn search_vec(&self, query: &[f32], k: usize) -> Result<Vec<i32>> {
        let mut out = vec![EMPTY_ID; k];
        self.search(query, k, &mut out)?;
        Ok(out)
    }

    /// Base-layer best-first expansion.
    fn expand(&self, pool: &mut LinearPool, query: &QueryCode) {
        let max_degree = self.graph.max_degree();
        while pool.has_next() {
            let u = pool.pop() as usize;
            self.graph.prefetch_neighbors(u, self.graph_po);
            for i in 0..self.po.min(max_degree) {
                let to = self.graph.at(u, i);
                if to == EMPTY_ID {
                    break;
                }
                self.quantizer.prefetch(to as usize, self.pl);
            }
            for i in 0..max_degree {
                let v = self.graph.at(u, i);
                if v == EMPTY_ID {
                    break;
                }
                if i + self.po < max_degree {
                    let ahead = self.graph.at(u, i + self.po);
                    if ahead != EMPTY_ID {
                        self.quantizer.prefetch(ahead as usize, self.pl);
                    }
                }
                if pool.is_visited(v) {
                    continue;
                }
                let d = self.quantizer.query_distance(query, v as usize);
                pool.insert(v, d);
            }
        }
    }

    /// Sweep `(po, pl)` over the sampled corpus queries and keep the pair
    /// with the lowest wall time. Runs the sample in parallel; the engine
    /// state afterwards differs from before only in the tuned pair.
    pub fn optimize(&mut self, num_threads: usize) -> Result<()> {
        if self.nb == 0 {
            return Err(AnnError::NotInitialized("set_data has not been called".into()));
        }
        let samples = self.optimize_queries.len() / self.dim.max(1);
        if samples == 0 {
            debug!("optimize skipped: corpus too small to sample");
            return Ok(());
        }

        let try_pos = 1..=TRY_POS.min(self.graph.max_degree());
        let try_pls = 1..=TRY_PLS.min(self.quantizer.code_size().div_ceil(64)).max(1);

        // A private pool keeps the sweep's thread count away from the
        // global rayon state; it is torn down before returning.
        let threadpool = if num_threads > 0 {
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .build()
                    .map_err(|e| AnnError::InvalidArgument(e.to_string()))?,
            )
        } else {
            None
        };
        let run_round = |s: &Self| {
            let body = || {
                (0..samples).into_par_iter().for_each(|qi| {
                    let q = &s.optimize_queries[qi * s.dim..(qi + 1) * s.dim];
                    let mut out = [EMPTY_ID; TRY_K];
                    let _ = s.search(q, TRY_K, &mut out);
                });
            };
            match &threadpool {
                Some(p) => p.install(body),
                None => body(),
            }
        };

        // Warm caches before timing anything.
        run_round(self);

        let mut best = (1usize, 1usize);
        let mut best_elapsed = f64::INFINITY;
        for po in try_pos {
            for pl in try_pls.clone() {
                self.po = po;
                self.pl = pl;
                let started = Instant::now();
                run_round(self);
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed < best_elapsed {
                    best_elapsed = elapsed;
                    best = (po, pl);
                }
            }
        }

        self.po = 1;
        self.pl = 1;
        let started = Instant::now();
        run_round(self);
        let baseline = started.elapsed().as_secs_f64();

        self.po = best.0;
        self.pl = best.1;
        info!(
            "prefetch tuned: po = {}, pl = {} ({:.1}% over baseline)",
            self.po,
            self.pl,
            100.0 * (baseline / best_elapsed - 1.0)
        );
        Ok(())
    }
}
