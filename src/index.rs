//! Build-then-search façade.
//!
//! [`Index`] drives graph construction; [`AnySearcher`] wires a level-
//! selected quantizer (0 = FP32, 1 = SQ8, 2 = SQ4) to a search engine.
//! Dispatch over the quantizer kind happens once per call here; the
//! engines underneath are monomorphized.

use rayon::prelude::*;

use crate::distance::Metric;
use crate::error::{AnnError, Result};
use crate::graph::Graph;
use crate::hnsw::{HnswBuilder, HnswConfig};
use crate::quantization::{Fp32Quantizer, Quantizer as _, Sq4Quantizer, Sq8Quantizer};
use crate::search::Searcher;

/// Index construction driver.
#[derive(Debug, Clone)]
pub struct Index {
    dim: usize,
    metric: Metric,
    config: HnswConfig,
}

impl Index {
    /// `m` and `ef_construction` default to 32 and 200 via
    /// [`HnswConfig::default`]; pass a custom config with
    /// [`Index::with_config`].
    pub fn new(dim: usize, metric: Metric) -> Result<Self> {
        Self::with_config(dim, metric, HnswConfig::default())
    }

    pub fn with_config(dim: usize, metric: Metric, config: HnswConfig) -> Result<Self> {
        if dim == 0 {
            return Err(AnnError::InvalidArgument("dimension must be positive".into()));
        }
        Ok(Self {
            dim,
            metric,
            config,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Build the navigable graph over `n` vectors of `dim` f32s.
    pub fn build(&self, data: &[f32], n: usize, dim: usize) -> Result<Graph> {
        let mut config = self.config.clone();
        if config.max_elements < n {
            config.max_elements = n;
        }
        HnswBuilder::new(self.metric, self.dim, config)?.build(data, n, dim)
    }
}

/// Quantizer selection for [`AnySearcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantLevel {
    Fp32,
    Sq8,
    Sq4,
}

impl QuantLevel {
    /// Numeric levels as exposed on the CLI: 0, 1, 2.
    pub fn from_level(level: usize) -> Result<Self> {
        match level {
            0 => Ok(QuantLevel::Fp32),
            1 => Ok(QuantLevel::Sq8),
            2 => Ok(QuantLevel::Sq4),
            other => Err(AnnError::InvalidArgument(format!(
                "unknown quantizer level: {other}"
            ))),
        }
    }
}

/// A search engine over any of the three supported encodings.
pub enum AnySearcher {
    Fp32(Searcher<Fp32Quantizer>),
    Sq8(Searcher<Sq8Quantizer>),
    Sq4(Searcher<Sq4Quantizer>),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            AnySearcher::Fp32($s) => $body,
            AnySearcher::Sq8($s) => $body,
            AnySearcher::Sq4($s) => $body,
        }
    };
}

impl AnySearcher {
    /// Construct an engine over `graph`, train the selected quantizer on
    /// the corpus, and draw the auto-tune sample.
    pub fn new(
        graph: Graph,
        data: &[f32],
        metric: Metric,
        level: QuantLevel,
    ) -> Result<Self> {
        let n = graph.num_nodes();
        if n == 0 {
            return Err(AnnError::NotInitialized("graph has no nodes".into()));
        }
        if data.len() % n != 0 {
            return Err(AnnError::InvalidArgument(format!(
                "corpus of {} floats does not divide into {} vectors",
                data.len(),
                n
            )));
        }
        let dim = data.len() / n;
        let mut searcher = match level {
            QuantLevel::Fp32 => {
                AnySearcher::Fp32(Searcher::new(graph, Fp32Quantizer::new(metric, dim)?))
            }
            QuantLevel::Sq8 => {
                AnySearcher::Sq8(Searcher::new(graph, Sq8Quantizer::new(metric, dim)?))
            }
            QuantLevel::Sq4 => {
                AnySearcher::Sq4(Searcher::new(graph, Sq4Quantizer::new(metric, dim)?))
            }
        };
        dispatch!(&mut searcher, s => s.set_data(data, n, dim)?);
        Ok(searcher)
    }

    pub fn set_ef(&mut self, ef: usize) {
        dispatch!(self, s => s.set_ef(ef));
    }

    pub fn ef(&self) -> usize {
        dispatch!(self, s => s.ef())
    }

    pub fn quantizer_name(&self) -> &'static str {
        dispatch!(self, s => s.quantizer().name())
    }

    /// Auto-tune the prefetch parameters (see [`Searcher::optimize`]).
    pub fn optimize(&mut self, num_threads: usize) -> Result<()> {
        dispatch!(self, s => s.optimize(num_threads))
    }

    /// Top-`k` ids for one query, padded with −1.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<i32>> {
        dispatch!(self, s => s.search_vec(query, k))
    }

    /// Top-`k` ids into a caller-provided buffer.
    pub fn search_into(&self, query: &[f32], k: usize, out: &mut [i32]) -> Result<()> {
        dispatch!(self, s => s.search(query, k, out))
    }

    /// Independent per-query searches over `nq` row-major queries.
    ///
    /// Runs on the global rayon pool (bounded by `num_threads` when
    /// non-zero). One query's failure does not abort its siblings; each
    /// query reports its own result.
    pub fn batch_search(
        &self,
        queries: &[f32],
        nq: usize,
        k: usize,
        num_threads: usize,
    ) -> Vec<Result<Vec<i32>>> {
        if nq == 0 {
            return Vec::new();
        }
        if queries.len() % nq != 0 {
            return vec![Err(AnnError::InvalidArgument(format!(
                "query buffer of {} floats does not divide into {} queries",
                queries.len(),
                nq
            )))];
        }
        let dim = queries.len() / nq;
        let body = || {
            (0..nq)
                .into_par_iter()
                .map(|i| self.search(&queries[i * dim..(i + 1) * dim], k))
                .collect()
        };
        if num_threads > 0 {
            match rayon::ThreadPoolBuilder::new().num_threads(num_threads).build() {
                Ok(pool) => pool.install(body),
                Err(e) => vec![Err(AnnError::InvalidArgument(e.to_string()))],
            }
        } else {
            body()
        }
    }
}

/// Configure the global rayon pool. A no-op once any parallel work has
/// already initialized it.
pub fn set_num_threads(n: usize) {
    let _ = rayon::ThreadPoolBuilder::new().num_threads(n).build_global();
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn corpus(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.random::<f32>() * 0.2 - 0.1).collect()
    }

    #[test]
    fn build_and_search_all_levels() {
        let (n, dim) = (80, 16);
        let data = corpus(n, dim, 21);
        let index = Index::with_config(
            dim,
            Metric::L2,
            HnswConfig {
                m: 8,
                ef_construction: 60,
                ..Default::default()
            },
        )
        .unwrap();
        let graph = index.build(&data, n, dim).unwrap();

        for level in [QuantLevel::Fp32, QuantLevel::Sq8, QuantLevel::Sq4] {
            let mut s = AnySearcher::new(graph.clone(), &data, Metric::L2, level).unwrap();
            s.set_ef(40);
            let ids = s.search(&data[..dim], 5).unwrap();
            assert_eq!(ids[0], 0, "level {level:?} missed the self-hit");
            assert!(ids.iter().all(|&v| v >= -1 && v < n as i32));
        }
    }

    #[test]
    fn sq4_with_ip_is_unsupported() {
        let (n, dim) = (30, 8);
        let data = corpus(n, dim, 3);
        let index = Index::new(dim, Metric::Ip).unwrap();
        let graph = index.build(&data, n, dim).unwrap();
        assert!(matches!(
            AnySearcher::new(graph, &data, Metric::Ip, QuantLevel::Sq4),
            Err(AnnError::Unsupported(_))
        ));
    }

    #[test]
    fn batch_search_reports_per_query() {
        let (n, dim) = (60, 8);
        let data = corpus(n, dim, 17);
        let index = Index::with_config(
            dim,
            Metric::L2,
            HnswConfig {
                m: 8,
                ef_construction: 60,
                ..Default::default()
            },
        )
        .unwrap();
        let graph = index.build(&data, n, dim).unwrap();
        let mut s = AnySearcher::new(graph, &data, Metric::L2, QuantLevel::Fp32).unwrap();
        s.set_ef(30);

        let queries = &data[..4 * dim];
        let results = s.batch_search(queries, 4, 3, 2);
        assert_eq!(results.len(), 4);
        for (i, r) in results.iter().enumerate() {
            let ids = r.as_ref().unwrap();
            assert_eq!(ids[0], i as i32);
        }
    }

    #[test]
    fn level_parsing() {
        assert_eq!(QuantLevel::from_level(0).unwrap(), QuantLevel::Fp32);
        assert_eq!(QuantLevel::from_level(1).unwrap(), QuantLevel::Sq8);
        assert_eq!(QuantLevel::from_level(2).unwrap(), QuantLevel::Sq4);
        assert!(QuantLevel::from_level(3).is_err());
    }
}
