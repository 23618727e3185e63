//! Base-layer adjacency storage and graph persistence.
//!
//! `DenseGraph` is a contiguous, 64-byte-aligned row-major arena of
//! `num_nodes × max_degree` node ids. Unused slots hold [`EMPTY_ID`].
//! A parallel `degrees` array gives each row's active length, and an
//! optional boxed [`HnswInitializer`] carries the upper layers.
//!
//! The on-disk layout is fixed little-endian: initializer block, then the
//! adjacency arena with degrees and entry points, then a metadata record.

mod initializer;

pub use initializer::HnswInitializer;

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::debug;

use crate::error::{AnnError, Result};
use crate::memory::AlignedI32s;
use crate::quantization::{Quantizer, QueryCode};
use crate::search::pool::{EMPTY_ID, LinearPool};
use crate::simd;

/// Persisted description of a built graph.
#[derive(Debug, Clone, Default)]
pub struct GraphMetadata {
    pub num_nodes: usize,
    pub max_degree: usize,
    pub total_edges: usize,
    pub builder_name: String,
    pub distance_type: String,
    pub entry_points: Vec<usize>,
}

/// Fixed-arity adjacency arena with optional hierarchical initializer.
#[derive(Debug, Clone)]
pub struct DenseGraph {
    num_nodes: usize,
    max_degree: usize,
    data: AlignedI32s,
    degrees: Vec<usize>,
    entry_points: Vec<usize>,
    initializer: Option<Box<HnswInitializer>>,
    total_edges: usize,
    builder_name: String,
    distance_type: String,
}

/// The graph type produced by builders and consumed by searchers.
pub type Graph = DenseGraph;

impl DenseGraph {
    /// Allocate an `n × max_degree` arena with every slot empty.
    pub fn new(num_nodes: usize, max_degree: usize) -> Result<Self> {
        Ok(Self {
            num_nodes,
            max_degree,
            data: AlignedI32s::filled(num_nodes * max_degree, EMPTY_ID)?,
            degrees: vec![0; num_nodes],
            entry_points: Vec::new(),
            initializer: None,
            total_edges: 0,
            builder_name: String::new(),
            distance_type: String::new(),
        })
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    #[inline]
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Full neighbor row of `u`, including empty slots.
    #[inline]
    pub fn neighbors(&self, u: usize) -> &[i32] {
        &self.data[u * self.max_degree..(u + 1) * self.max_degree]
    }

    #[inline]
    pub fn degree(&self, u: usize) -> usize {
        self.degrees[u]
    }

    /// Neighbor slot `i` of node `u`.
    #[inline]
    pub fn at(&self, u: usize, i: usize) -> i32 {
        self.data[u * self.max_degree + i]
    }

    pub fn entry_points(&self) -> &[usize] {
        &self.entry_points
    }

    pub fn set_entry_points(&mut self, eps: Vec<usize>) {
        self.entry_points = eps;
    }

    pub fn initializer(&self) -> Option<&HnswInitializer> {
        self.initializer.as_deref()
    }

    pub fn set_initializer(&mut self, init: HnswInitializer) {
        self.initializer = Some(Box::new(init));
    }

    pub fn set_builder_name(&mut self, name: impl Into<String>) {
        self.builder_name = name.into();
    }

    pub fn set_distance_type(&mut self, name: impl Into<String>) {
        self.distance_type = name.into();
    }

    /// Replace row `u` with `count` ids from `neighbors`; the remainder of
    /// the row is reset to empty.
    pub fn set_neighbors(&mut self, u: usize, neighbors: &[i32], count: usize) {
        debug_assert!(count <= self.max_degree);
        let row = &mut self.data[u * self.max_degree..(u + 1) * self.max_degree];
        self.total_edges = self.total_edges + count - self.degrees[u];
        row[..count].copy_from_slice(&neighbors[..count]);
        row[count..].fill(EMPTY_ID);
        self.degrees[u] = count;
    }

    /// Append `v` to `u`'s row. Duplicate edges are skipped; a full row
    /// drops the edge silently.
    pub fn add_edge(&mut self, u: usize, v: i32) {
        let row = &mut self.data[u * self.max_degree..(u + 1) * self.max_degree];
        let deg = &mut self.degrees[u];
        if row[..*deg].contains(&v) {
            return;
        }
        if *deg < self.max_degree {
            row[*deg] = v;
            *deg += 1;
            self.total_edges += 1;
        }
    }

    /// Remove `v` from `u`'s row, compacting the remaining neighbors.
    pub fn remove_edge(&mut self, u: usize, v: i32) {
        let row = &mut self.data[u * self.max_degree..(u + 1) * self.max_degree];
        let deg = &mut self.degrees[u];
        if let Some(pos) = row[..*deg].iter().position(|&x| x == v) {
            row.copy_within(pos + 1..*deg, pos);
            row[*deg - 1] = EMPTY_ID;
            *deg -= 1;
            self.total_edges -= 1;
        }
    }

    /// Issue `lines` L1 prefetches for `u`'s neighbor row.
    #[inline]
    pub fn prefetch_neighbors(&self, u: usize, lines: usize) {
        let row = &self.data[u * self.max_degree..];
        simd::prefetch_l1(row.as_ptr() as *const u8, lines);
    }

    /// Seed the pool for a search: greedy-descend the initializer when one
    /// is present, otherwise insert every entry point. A graph with
    /// neither cannot start a search.
    pub fn initialize_search<Q: Quantizer>(
        &self,
        pool: &mut LinearPool,
        quant: &Q,
        query: &QueryCode,
    ) -> Result<()> {
        if let Some(init) = &self.initializer {
            init.initialize(pool, quant, query);
            return Ok(());
        }
        if self.entry_points.is_empty() {
            return Err(AnnError::NotInitialized(
                "graph has no initializer and no entry points".into(),
            ));
        }
        for &ep in &self.entry_points {
            pool.insert(ep as i32, quant.query_distance(query, ep));
        }
        Ok(())
    }

    /// Metadata record as persisted alongside the adjacency.
    pub fn metadata(&self) -> GraphMetadata {
        GraphMetadata {
            num_nodes: self.num_nodes,
            max_degree: self.max_degree,
            total_edges: self.total_edges,
            builder_name: self.builder_name.clone(),
            distance_type: self.distance_type.clone(),
            entry_points: self.entry_points.clone(),
        }
    }

    /// Write the graph to `path` in the fixed binary layout.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path.as_ref())?);

        match &self.initializer {
            Some(init) => init.save(&mut w)?,
            // Absent initializer: an empty header so readers still parse.
            None => {
                write_i32(&mut w, 0)?;
                write_i32(&mut w, 0)?;
                write_i32(&mut w, EMPTY_ID)?;
            }
        }

        write_u64(&mut w, self.num_nodes as u64)?;
        write_u64(&mut w, self.max_degree as u64)?;
        for &v in self.data.iter() {
            write_i32(&mut w, v)?;
        }

        write_u64(&mut w, self.degrees.len() as u64)?;
        for &d in &self.degrees {
            write_u64(&mut w, d as u64)?;
        }
        write_u64(&mut w, self.entry_points.len() as u64)?;
        for &ep in &self.entry_points {
            write_u64(&mut w, ep as u64)?;
        }

        write_u64(&mut w, self.total_edges as u64)?;
        write_str(&mut w, &self.builder_name)?;
        write_str(&mut w, &self.distance_type)?;

        w.flush()?;
        debug!(
            "graph saved: {} nodes, max degree {}, {} edges",
            self.num_nodes, self.max_degree, self.total_edges
        );
        Ok(())
    }

    /// Load a graph previously written by [`DenseGraph::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut r = BufReader::new(File::open(path.as_ref())?);

        let init = HnswInitializer::load(&mut r)?;
        let initializer = if init.num_nodes() > 0 {
            Some(Box::new(init))
        } else {
            None
        };

        let num_nodes = read_u64(&mut r)? as usize;
        let max_degree = read_u64(&mut r)? as usize;
        let mut data = AlignedI32s::filled(num_nodes * max_degree, EMPTY_ID)?;
        read_i32s_into(&mut r, &mut data)?;

        let degrees_len = read_u64(&mut r)? as usize;
        let mut degrees = Vec::with_capacity(degrees_len);
        for _ in 0..degrees_len {
            degrees.push(read_u64(&mut r)? as usize);
        }
        let eps_len = read_u64(&mut r)? as usize;
        let mut entry_points = Vec::with_capacity(eps_len);
        for _ in 0..eps_len {
            entry_points.push(read_u64(&mut r)? as usize);
        }

        let total_edges = read_u64(&mut r)? as usize;
        let builder_name = read_str(&mut r)?;
        let distance_type = read_str(&mut r)?;

        debug!(
            "graph loaded: {} nodes, max degree {}, {} edges",
            num_nodes, max_degree, total_edges
        );
        Ok(Self {
            num_nodes,
            max_degree,
            data,
            degrees,
            entry_points,
            initializer,
            total_edges,
            builder_name,
            distance_type,
        })
    }
}

// Little-endian field I/O shared with the initializer.

pub(crate) fn write_i32<W: Write>(w: &mut W, v: i32) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_u64<W: Write>(w: &mut W, v: u64) -> Result<()> {
    w.write_all(&v.to_le_bytes())?;
    Ok(())
}

pub(crate) fn write_str<W: Write>(w: &mut W, s: &str) -> Result<()> {
    write_u64(w, s.len() as u64)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

pub(crate) fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_str<R: Read>(r: &mut R) -> Result<String> {
    let len = read_u64(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|e| AnnError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

pub(crate) fn read_exact_i32s<R: Read>(r: &mut R, count: usize) -> Result<Vec<i32>> {
    let mut out = vec![0i32; count];
    read_i32s_into(r, &mut out)?;
    Ok(out)
}

pub(crate) fn read_i32s_into<R: Read>(r: &mut R, out: &mut [i32]) -> Result<()> {
    let mut buf = [0u8; 4];
    for slot in out.iter_mut() {
        r.read_exact(&mut buf)?;
        *slot = i32::from_le_bytes(buf);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_start_empty() {
        let g = DenseGraph::new(4, 3).unwrap();
        assert_eq!(g.neighbors(0), &[EMPTY_ID; 3]);
        assert_eq!(g.degree(0), 0);
    }

    #[test]
    fn add_edge_is_idempotent_and_bounded() {
        let mut g = DenseGraph::new(4, 2).unwrap();
        g.add_edge(0, 1);
        g.add_edge(0, 1);
        assert_eq!(g.degree(0), 1);
        g.add_edge(0, 2);
        g.add_edge(0, 3); // row full, dropped
        assert_eq!(g.degree(0), 2);
        assert_eq!(g.neighbors(0), &[1, 2]);
    }

    #[test]
    fn remove_edge_compacts_row() {
        let mut g = DenseGraph::new(4, 3).unwrap();
        g.set_neighbors(0, &[1, 2, 3], 3);
        g.remove_edge(0, 2);
        assert_eq!(g.neighbors(0), &[1, 3, EMPTY_ID]);
        assert_eq!(g.degree(0), 2);
        g.remove_edge(0, 9); // absent, no-op
        assert_eq!(g.degree(0), 2);
    }

    #[test]
    fn set_neighbors_tracks_edge_count() {
        let mut g = DenseGraph::new(3, 4).unwrap();
        g.set_neighbors(0, &[1, 2], 2);
        g.set_neighbors(1, &[0], 1);
        assert_eq!(g.metadata().total_edges, 3);
        g.set_neighbors(0, &[2], 1);
        assert_eq!(g.metadata().total_edges, 2);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.bin");

        let mut g = DenseGraph::new(3, 4).unwrap();
        g.set_neighbors(0, &[1, 2], 2);
        g.set_neighbors(1, &[0, 2], 2);
        g.set_neighbors(2, &[1], 1);
        g.set_entry_points(vec![0]);
        g.set_builder_name("hnsw");
        g.set_distance_type("L2");

        let mut init = HnswInitializer::new(3, 2);
        init.set_entry_point(1);
        init.set_level(1, 1);
        g.set_initializer(init);

        g.save(&path).unwrap();
        let loaded = DenseGraph::load(&path).unwrap();

        assert_eq!(loaded.num_nodes(), 3);
        assert_eq!(loaded.max_degree(), 4);
        for u in 0..3 {
            assert_eq!(loaded.neighbors(u), g.neighbors(u));
            assert_eq!(loaded.degree(u), g.degree(u));
        }
        assert_eq!(loaded.entry_points(), &[0]);
        let meta = loaded.metadata();
        assert_eq!(meta.builder_name, "hnsw");
        assert_eq!(meta.distance_type, "L2");
        assert_eq!(meta.total_edges, 5);
        let init = loaded.initializer().unwrap();
        assert_eq!(init.entry_point(), 1);
        assert_eq!(init.level(1), 1);
    }
}
