//! Layered insertion with diversity pruning.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Instant;

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use crate::distance::Metric;
use crate::error::{AnnError, Result};
use crate::graph::{Graph, HnswInitializer};
use crate::hnsw::HnswConfig;
use crate::search::pool::VisitedSet;
use crate::simd;

type NeighborRow = SmallVec<[i32; 48]>;

/// Min-heap candidate for the layer-local best-first search.
#[derive(PartialEq)]
struct MinCandidate {
    id: i32,
    dist: f32,
}

impl Eq for MinCandidate {}

impl Ord for MinCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other.dist.total_cmp(&self.dist)
    }
}

impl PartialOrd for MinCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap result for tracking the worst retained candidate.
#[derive(PartialEq)]
struct MaxResult {
    id: i32,
    dist: f32,
}

impl Eq for MaxResult {}

impl Ord for MaxResult {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist.total_cmp(&other.dist)
    }
}

impl PartialOrd for MaxResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Builds the hierarchy one point at a time.
pub struct HnswBuilder {
    metric: Metric,
    dim: usize,
    config: HnswConfig,
    kernel: fn(&[f32], &[f32]) -> f32,
}

fn neg_ip(a: &[f32], b: &[f32]) -> f32 {
    -simd::ip(a, b)
}

/// Mutable construction state: one adjacency vector per layer, grown as
/// higher levels are drawn.
struct BuildState<'a> {
    data: &'a [f32],
    dim: usize,
    levels: Vec<i32>,
    layers: Vec<Vec<NeighborRow>>,
    ep: i32,
    top_level: i32,
    kernel: fn(&[f32], &[f32]) -> f32,
}

impl<'a> BuildState<'a> {
    #[inline]
    fn vector(&self, u: i32) -> &'a [f32] {
        let u = u as usize;
        &self.data[u * self.dim..(u + 1) * self.dim]
    }

    #[inline]
    fn dist(&self, a: &[f32], u: i32) -> f32 {
        (self.kernel)(a, self.vector(u))
    }

    /// ef = 1 greedy step on one layer: follow improving edges until a
    /// local minimum.
    fn greedy_closest(&self, query: &[f32], layer: usize, mut u: i32) -> i32 {
        let mut cur = self.dist(query, u);
        loop {
            let mut improved = false;
            for &v in &self.layers[layer][u as usize] {
                let d = self.dist(query, v);
                if d < cur {
                    cur = d;
                    u = v;
                    improved = true;
                }
            }
            if !improved {
                return u;
            }
        }
    }

    /// Bounded best-first search on one layer, returning up to `ef`
    /// candidates sorted ascending by distance.
    fn search_layer(&self, query: &[f32], layer: usize, entry: i32, ef: usize) -> Vec<(i32, f32)> {
        let mut candidates: BinaryHeap<MinCandidate> = BinaryHeap::with_capacity(ef * 2);
        let mut results: BinaryHeap<MaxResult> = BinaryHeap::with_capacity(ef + 1);
        let mut visited = VisitedSet::new(self.levels.len());

        let entry_dist = self.dist(query, entry);
        candidates.push(MinCandidate {
            id: entry,
            dist: entry_dist,
        });
        results.push(MaxResult {
            id: entry,
            dist: entry_dist,
        });
        visited.set(entry as u32);

        while let Some(c) = candidates.pop() {
            let worst = results.peek().map(|r| r.dist).unwrap_or(f32::INFINITY);
            if c.dist > worst && results.len() >= ef {
                break;
            }
            for &v in &self.layers[layer][c.id as usize] {
                if visited.get(v as u32) {
                    continue;
                }
                visited.set(v as u32);
                let d = self.dist(query, v);
                let worst = results.peek().map(|r| r.dist).unwrap_or(f32::INFINITY);
                if results.len() < ef || d < worst {
                    candidates.push(MinCandidate { id: v, dist: d });
                    results.push(MaxResult { id: v, dist: d });
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        let mut out: Vec<(i32, f32)> = results.into_iter().map(|r| (r.id, r.dist)).collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }

    /// Diversity selection: walk candidates in ascending distance and keep
    /// one only when it is closer to the query point than to every
    /// neighbor kept so far.
    fn select_neighbors(&self, candidates: &[(i32, f32)], m: usize) -> Vec<(i32, f32)> {
        let mut selected: Vec<(i32, f32)> = Vec::with_capacity(m);
        for &(c, dist_to_query) in candidates {
            if selected.len() >= m {
                break;
            }
            let c_vec = self.vector(c);
            let keep = selected
                .iter()
                .all(|&(s, _)| dist_to_query < self.dist(c_vec, s));
            if keep {
                selected.push((c, dist_to_query));
            }
        }
        selected
    }

    /// Re-run the selection heuristic over `u`'s current row after an
    /// overflow, shrinking it back to `m`.
    fn prune_row(&mut self, layer: usize, u: i32, m: usize) {
        let u_vec = self.vector(u);
        let mut with_dist: Vec<(i32, f32)> = self.layers[layer][u as usize]
            .iter()
            .map(|&v| (v, self.dist(u_vec, v)))
            .collect();
        with_dist.sort_by(|a, b| a.1.total_cmp(&b.1));
        let kept = self.select_neighbors(&with_dist, m);
        self.layers[layer][u as usize] = kept.iter().map(|&(v, _)| v).collect();
    }
}

impl HnswBuilder {
    pub fn new(metric: Metric, dim: usize, config: HnswConfig) -> Result<Self> {
        if dim == 0 {
            return Err(AnnError::InvalidArgument("dimension must be positive".into()));
        }
        if config.m < 2 {
            return Err(AnnError::InvalidArgument(format!(
                "connectivity m must be at least 2, got {}",
                config.m
            )));
        }
        let table = simd::kernels();
        let kernel = match metric {
            Metric::L2 => table.l2_sqr,
            Metric::Ip => neg_ip,
            Metric::Cosine => table.cosine_distance,
        };
        Ok(Self {
            metric,
            dim,
            config,
            kernel,
        })
    }

    /// Insert every corpus point and freeze the hierarchy into a graph.
    pub fn build(&self, data: &[f32], n: usize, dim: usize) -> Result<Graph> {
        if dim != self.dim {
            return Err(AnnError::DimensionMismatch {
                expected: self.dim,
                got: dim,
            });
        }
        if n == 0 {
            return Err(AnnError::InvalidArgument("cannot build an empty index".into()));
        }
        if data.len() < n * dim {
            return Err(AnnError::InvalidArgument(format!(
                "corpus slice holds {} floats, expected {}",
                data.len(),
                n * dim
            )));
        }
        if n > i32::MAX as usize {
            return Err(AnnError::InvalidArgument(format!(
                "corpus of {n} points exceeds the 32-bit id space"
            )));
        }

        let m = self.config.m;
        let ml = self.config.ml();
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let started = Instant::now();
        info!(
            "hnsw build: {} points, dim {}, m {}, ef_construction {}",
            n, dim, m, self.config.ef_construction
        );

        let mut state = BuildState {
            data,
            dim,
            levels: Vec::with_capacity(n),
            layers: vec![vec![NeighborRow::new(); n]],
            ep: 0,
            top_level: 0,
            kernel: self.kernel,
        };

        // Pre-draw levels so the RNG stream is independent of search work.
        for _ in 0..n {
            let u: f64 = 1.0 - rng.random::<f64>();
            state.levels.push((-u.ln() * ml).floor() as i32);
        }
        let max_level = state.levels.iter().copied().max().unwrap_or(0);
        while state.layers.len() <= max_level as usize {
            state.layers.push(vec![NeighborRow::new(); n]);
        }

        for i in 0..n {
            self.insert(&mut state, i as i32);
            if (i + 1) % 10_000 == 0 {
                info!("hnsw build progress: [{}/{}]", i + 1, n);
            }
        }

        info!("hnsw build completed in {:.2?}", started.elapsed());
        self.freeze(&state, n)
    }

    fn insert(&self, state: &mut BuildState<'_>, i: i32) {
        let level = state.levels[i as usize];
        if i == 0 {
            state.ep = 0;
            state.top_level = level;
            return;
        }

        let m = self.config.m;
        let query = state.vector(i);
        let mut entry = state.ep;

        // Descend through layers above the new point's level.
        if state.top_level > level {
            for l in ((level + 1)..=state.top_level).rev() {
                entry = state.greedy_closest(query, l as usize, entry);
            }
        }

        // Connect on every layer the point joins.
        for l in (0..=level.min(state.top_level)).rev() {
            let layer = l as usize;
            let candidates =
                state.search_layer(query, layer, entry, self.config.ef_construction);
            if let Some(&(best, _)) = candidates.first() {
                entry = best;
            }

            let arity = if l == 0 { 2 * m } else { m };
            let selected = state.select_neighbors(&candidates, arity);

            for &(v, _) in &selected {
                state.layers[layer][i as usize].push(v);
                let overflow = {
                    let row = &mut state.layers[layer][v as usize];
                    if row.contains(&i) {
                        false
                    } else {
                        row.push(i);
                        row.len() > arity
                    }
                };
                if overflow {
                    state.prune_row(layer, v, arity);
                }
            }
        }

        if level > state.top_level {
            state.ep = i;
            state.top_level = level;
        }
    }

    /// Freeze layer 0 into the dense arena and layers ≥ 1 into the
    /// initializer.
    fn freeze(&self, state: &BuildState<'_>, n: usize) -> Result<Graph> {
        let m = self.config.m;
        let mut graph = Graph::new(n, 2 * m)?;
        for u in 0..n {
            let row = &state.layers[0][u];
            let count = row.len().min(2 * m);
            graph.set_neighbors(u, &row[..count], count);
        }

        let mut init = HnswInitializer::new(n, m);
        init.set_entry_point(state.ep);
        for u in 0..n {
            let level = state.levels[u];
            if level > 0 {
                init.set_level(u, level);
                for l in 1..=level as usize {
                    if state.layers.len() > l {
                        let src = &state.layers[l][u];
                        let dst = init.edges_mut(l, u);
                        for (slot, &v) in dst.iter_mut().zip(src.iter()) {
                            *slot = v;
                        }
                    }
                }
            }
        }

        graph.set_initializer(init);
        graph.set_entry_points(vec![state.ep as usize]);
        graph.set_builder_name("hnsw");
        graph.set_distance_type(self.metric.name());
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::pool::EMPTY_ID;

    fn uniform_corpus(n: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n * dim).map(|_| rng.random::<f32>() * 0.2 - 0.1).collect()
    }

    #[test]
    fn build_produces_valid_adjacency() {
        let (n, dim) = (200, 16);
        let data = uniform_corpus(n, dim, 42);
        let builder = HnswBuilder::new(
            Metric::L2,
            dim,
            HnswConfig {
                m: 8,
                ef_construction: 60,
                ..Default::default()
            },
        )
        .unwrap();
        let graph = builder.build(&data, n, dim).unwrap();

        assert_eq!(graph.num_nodes(), n);
        assert_eq!(graph.max_degree(), 16);
        for u in 0..n {
            let row = graph.neighbors(u);
            let deg = graph.degree(u);
            assert!(deg <= graph.max_degree());
            let mut seen = std::collections::HashSet::new();
            for (i, &v) in row.iter().enumerate() {
                if i < deg {
                    assert!(v >= 0 && (v as usize) < n, "u={u} slot={i} v={v}");
                    assert_ne!(v as usize, u, "self-loop at {u}");
                    assert!(seen.insert(v), "duplicate neighbor {v} in row {u}");
                } else {
                    assert_eq!(v, EMPTY_ID);
                }
            }
        }
    }

    #[test]
    fn initializer_covers_all_upper_nodes() {
        let (n, dim) = (300, 8);
        let data = uniform_corpus(n, dim, 7);
        let builder = HnswBuilder::new(
            Metric::L2,
            dim,
            HnswConfig {
                m: 6,
                ef_construction: 40,
                ..Default::default()
            },
        )
        .unwrap();
        let graph = builder.build(&data, n, dim).unwrap();
        let init = graph.initializer().unwrap();

        assert_eq!(init.num_nodes(), n);
        assert_eq!(init.k(), 6);
        let ep = init.entry_point() as usize;
        // the entry point sits on the top layer
        let top = (0..n).map(|u| init.level(u)).max().unwrap();
        assert_eq!(init.level(ep), top);
        // every upper-layer edge points at a node that also lives there
        for u in 0..n {
            for l in 1..=init.level(u) {
                for &v in init.edges(l as usize, u) {
                    if v == EMPTY_ID {
                        continue;
                    }
                    assert!(init.level(v as usize) >= l, "edge {u}->{v} at layer {l}");
                }
            }
        }
    }

    #[test]
    fn single_point_build() {
        let data = vec![1.0f32; 4];
        let builder = HnswBuilder::new(Metric::L2, 4, HnswConfig::default()).unwrap();
        let graph = builder.build(&data, 1, 4).unwrap();
        assert_eq!(graph.num_nodes(), 1);
        assert_eq!(graph.degree(0), 0);
        assert_eq!(graph.entry_points(), &[0]);
    }

    #[test]
    fn build_rejects_bad_shapes() {
        let builder = HnswBuilder::new(Metric::L2, 8, HnswConfig::default()).unwrap();
        assert!(matches!(
            builder.build(&[0.0; 16], 2, 4),
            Err(AnnError::DimensionMismatch { .. })
        ));
        assert!(builder.build(&[], 0, 8).is_err());
    }
}
