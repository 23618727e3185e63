//! Bounded, distance-ordered candidate pool for best-first graph search.
//!
//! `LinearPool` keeps up to `capacity` candidates sorted ascending by
//! distance, with a cursor marking the frontier head (the closest entry
//! not yet expanded). A visited bitset over the whole corpus guards
//! against duplicate insertion; popped entries carry a checked flag so a
//! cursor rewind never re-expands them.

/// Sentinel for unused result/adjacency slots.
pub const EMPTY_ID: i32 = -1;

/// Flat bitset sized to the corpus.
#[derive(Debug, Clone)]
pub struct VisitedSet {
    bits: Vec<u64>,
}

impl VisitedSet {
    pub fn new(n: usize) -> Self {
        Self {
            bits: vec![0u64; n.div_ceil(64)],
        }
    }

    #[inline]
    pub fn get(&self, id: u32) -> bool {
        let id = id as usize;
        self.bits[id / 64] >> (id % 64) & 1 != 0
    }

    #[inline]
    pub fn set(&mut self, id: u32) {
        let id = id as usize;
        self.bits[id / 64] |= 1 << (id % 64);
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: i32,
    dist: f32,
    checked: bool,
}

/// Distance-ordered working set for a single search.
#[derive(Debug)]
pub struct LinearPool {
    entries: Vec<Entry>,
    capacity: usize,
    k: usize,
    cursor: usize,
    visited: VisitedSet,
}

impl LinearPool {
    /// `n` is the corpus size (visited-bitset width); `capacity` bounds the
    /// pool and is at least `k`.
    pub fn new(n: usize, capacity: usize, k: usize) -> Self {
        let capacity = capacity.max(k).max(1);
        Self {
            entries: Vec::with_capacity(capacity + 1),
            capacity,
            k,
            cursor: 0,
            visited: VisitedSet::new(n),
        }
    }

    /// Insert a candidate unless its id was already visited.
    ///
    /// Marks the id visited either way, keeps the entries sorted ascending
    /// by distance (ties keep insertion order), drops the worst entry when
    /// over capacity, and rewinds the cursor when the new entry lands in
    /// front of it.
    pub fn insert(&mut self, id: i32, dist: f32) {
        debug_assert!(id >= 0);
        if self.visited.get(id as u32) {
            return;
        }
        self.visited.set(id as u32);

        let pos = self.entries.partition_point(|e| e.dist <= dist);
        if pos >= self.capacity {
            return;
        }
        self.entries.insert(
            pos,
            Entry {
                id,
                dist,
                checked: false,
            },
        );
        if self.entries.len() > self.capacity {
            self.entries.pop();
        }
        if pos < self.cursor {
            self.cursor = pos;
        }
    }

    /// Whether the cursor references an unexpanded entry.
    #[inline]
    pub fn has_next(&self) -> bool {
        self.cursor < self.entries.len()
    }

    /// Return the id at the cursor and advance past expanded entries.
    pub fn pop(&mut self) -> i32 {
        debug_assert!(self.has_next());
        let id = self.entries[self.cursor].id;
        self.entries[self.cursor].checked = true;
        while self.cursor < self.entries.len() && self.entries[self.cursor].checked {
            self.cursor += 1;
        }
        id
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn id(&self, i: usize) -> i32 {
        self.entries[i].id
    }

    #[inline]
    pub fn distance(&self, i: usize) -> f32 {
        self.entries[i].dist
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn is_visited(&self, id: i32) -> bool {
        self.visited.get(id as u32)
    }

    /// Mark an id visited without inserting it.
    #[inline]
    pub fn mark_visited(&mut self, id: i32) {
        self.visited.set(id as u32);
    }
}
