//! Upper-layer navigation state for the hierarchical graph.
//!
//! Holds, for every node, the highest layer it appears on and a flat
//! `K`-per-layer neighbor list for layers ≥ 1, plus the single top-layer
//! entry point. Searches greedy-descend this structure to pick the
//! base-layer start node.

use std::io::{Read, Write};

use crate::error::Result;
use crate::quantization::{Quantizer, QueryCode};
use crate::search::pool::{EMPTY_ID, LinearPool};

use super::{read_exact_i32s, read_i32, write_i32};

/// Layered edge lists above the base layer.
#[derive(Debug, Clone)]
pub struct HnswInitializer {
    n: usize,
    k: usize,
    ep: i32,
    levels: Vec<i32>,
    lists: Vec<Vec<i32>>,
}

impl HnswInitializer {
    /// Create empty state for `n` nodes with `k` neighbors per upper layer.
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            ep: 0,
            levels: vec![0; n],
            lists: vec![Vec::new(); n],
        }
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.n
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn entry_point(&self) -> i32 {
        self.ep
    }

    pub fn set_entry_point(&mut self, ep: i32) {
        self.ep = ep;
    }

    /// Highest layer `u` appears on (0 = base only).
    #[inline]
    pub fn level(&self, u: usize) -> i32 {
        self.levels[u]
    }

    /// Allocate `u`'s upper-layer lists for `level` layers, all slots empty.
    pub fn set_level(&mut self, u: usize, level: i32) {
        self.levels[u] = level;
        self.lists[u] = vec![EMPTY_ID; level as usize * self.k];
    }

    /// Neighbor slots of `u` at `level` (1-based; `level ≤ levels[u]`).
    #[inline]
    pub fn edges(&self, level: usize, u: usize) -> &[i32] {
        &self.lists[u][(level - 1) * self.k..level * self.k]
    }

    #[inline]
    pub fn edges_mut(&mut self, level: usize, u: usize) -> &mut [i32] {
        &mut self.lists[u][(level - 1) * self.k..level * self.k]
    }

    /// Greedy descent from the top entry point to layer 1, then seed the
    /// pool with the resulting base-layer start node.
    pub fn initialize<Q: Quantizer>(&self, pool: &mut LinearPool, quant: &Q, query: &QueryCode) {
        let mut u = self.ep;
        let mut cur = quant.query_distance(query, u as usize);
        for level in (1..=self.levels[u as usize]).rev() {
            loop {
                let mut improved = false;
                for &v in self.edges(level as usize, u as usize) {
                    if v == EMPTY_ID {
                        break;
                    }
                    let d = quant.query_distance(query, v as usize);
                    if d < cur {
                        cur = d;
                        u = v;
                        improved = true;
                    }
                }
                if !improved {
                    break;
                }
            }
        }
        pool.insert(u, cur);
    }

    /// Serialize: `N, K, ep`, then per node `count` (= level·K) and the
    /// flat upper-layer adjacency. All fields i32 little-endian.
    pub fn save<W: Write>(&self, w: &mut W) -> Result<()> {
        write_i32(w, self.n as i32)?;
        write_i32(w, self.k as i32)?;
        write_i32(w, self.ep)?;
        for u in 0..self.n {
            let count = self.levels[u] * self.k as i32;
            write_i32(w, count)?;
            for &v in &self.lists[u] {
                write_i32(w, v)?;
            }
        }
        Ok(())
    }

    /// Deserialize, sizing every structure from the stream header.
    pub fn load<R: Read>(r: &mut R) -> Result<Self> {
        let n = read_i32(r)? as usize;
        let k = read_i32(r)? as usize;
        let ep = read_i32(r)?;
        let mut levels = vec![0i32; n];
        let mut lists = vec![Vec::new(); n];
        for u in 0..n {
            let count = read_i32(r)? as usize;
            levels[u] = if k == 0 { 0 } else { (count / k) as i32 };
            lists[u] = read_exact_i32s(r, count)?;
        }
        Ok(Self {
            n,
            k,
            ep,
            levels,
            lists,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::Metric;
    use crate::quantization::{Fp32Quantizer, Quantizer as _};

    /// Two-level line graph: node 0 on level 1 linked to node 2.
    fn sample() -> HnswInitializer {
        let mut init = HnswInitializer::new(4, 2);
        init.set_entry_point(0);
        init.set_level(0, 1);
        init.set_level(2, 1);
        init.edges_mut(1, 0)[0] = 2;
        init.edges_mut(1, 2)[0] = 0;
        init
    }

    #[test]
    fn descent_moves_toward_query() {
        // 1-d corpus at positions 0, 1, 10, 11
        let data = [0.0f32, 1.0, 10.0, 11.0];
        let mut quant = Fp32Quantizer::new(Metric::L2, 1).unwrap();
        quant.train(&data, 4, 1).unwrap();

        let init = sample();
        let query = quant.encode_query(&[10.5]).unwrap();
        let mut pool = LinearPool::new(4, 8, 4);
        init.initialize(&mut pool, &quant, &query);

        // descent reaches node 2 (distance 0.25), not the entry point
        assert_eq!(pool.size(), 1);
        assert_eq!(pool.id(0), 2);
        assert!(pool.is_visited(2));
    }

    #[test]
    fn save_load_roundtrip() {
        let init = sample();
        let mut buf = Vec::new();
        init.save(&mut buf).unwrap();
        let loaded = HnswInitializer::load(&mut buf.as_slice()).unwrap();
        assert_eq!(loaded.num_nodes(), 4);
        assert_eq!(loaded.k(), 2);
        assert_eq!(loaded.entry_point(), 0);
        assert_eq!(loaded.level(0), 1);
        assert_eq!(loaded.level(1), 0);
        assert_eq!(loaded.edges(1, 0), &[2, EMPTY_ID]);
        assert_eq!(loaded.edges(1, 2), &[0, EMPTY_ID]);
    }
}
