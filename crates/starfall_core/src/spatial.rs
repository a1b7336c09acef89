//! Grid-bucketed spatial index for proximity queries.
//!
//! Detection and targeting need radius and nearest-neighbour queries over
//! entities positioned on the galactic plane. [`SpatialGrid`] buckets
//! entries into square cells and answers:
//!
//! - [`SpatialGrid::query_radius`] - all entries within a distance
//! - [`SpatialGrid::find_nearest`] - expanding ring search that only ever
//!   visits the perimeter cells of each growing radius, terminating once the
//!   best candidate is provably closer than any unsearched cell
//!
//! The index carries the day it was built for as an explicit epoch. Queries
//! against a different day fail hard rather than returning stale results;
//! the pipeline rebuilds the index each phase that needs one.

use std::collections::HashMap;

use crate::error::{GameError, Result};

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    x: f64,
    z: f64,
}

/// Grid-bucketed index over (id, x, z) entries.
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f64,
    built_day: u64,
    entries: Vec<Entry>,
    cells: HashMap<(i64, i64), Vec<usize>>,
    min_cell: (i64, i64),
    max_cell: (i64, i64),
}

impl SpatialGrid {
    /// Create an empty index for the given day.
    #[must_use]
    pub fn new(built_day: u64, cell_size: f64) -> Self {
        Self {
            cell_size: if cell_size > 0.0 { cell_size } else { 1.0 },
            built_day,
            entries: Vec::new(),
            cells: HashMap::new(),
            min_cell: (0, 0),
            max_cell: (0, 0),
        }
    }

    /// Day this index was built for.
    #[must_use]
    pub const fn built_day(&self) -> u64 {
        self.built_day
    }

    fn cell_of(&self, x: f64, z: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (z / self.cell_size).floor() as i64,
        )
    }

    /// Insert an entry.
    pub fn insert(&mut self, id: impl Into<String>, x: f64, z: f64) {
        let cell = self.cell_of(x, z);
        if self.entries.is_empty() {
            self.min_cell = cell;
            self.max_cell = cell;
        } else {
            self.min_cell = (self.min_cell.0.min(cell.0), self.min_cell.1.min(cell.1));
            self.max_cell = (self.max_cell.0.max(cell.0), self.max_cell.1.max(cell.1));
        }
        let index = self.entries.len();
        self.entries.push(Entry {
            id: id.into(),
            x,
            z,
        });
        self.cells.entry(cell).or_default().push(index);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the index has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_epoch(&self, day: u64) -> Result<()> {
        if day == self.built_day {
            Ok(())
        } else {
            Err(GameError::StaleSpatialIndex {
                built: self.built_day,
                queried: day,
            })
        }
    }

    /// All entries within `max_dist` of the point, sorted by (distance, id).
    ///
    /// # Errors
    ///
    /// Fails with [`GameError::StaleSpatialIndex`] if `day` differs from the
    /// day the index was built for.
    pub fn query_radius(&self, day: u64, x: f64, z: f64, max_dist: f64) -> Result<Vec<(String, f64)>> {
        self.check_epoch(day)?;

        let max_sq = max_dist * max_dist;
        let (min_cx, min_cz) = self.cell_of(x - max_dist, z - max_dist);
        let (max_cx, max_cz) = self.cell_of(x + max_dist, z + max_dist);

        let mut hits: Vec<(String, f64)> = Vec::new();
        for cx in min_cx..=max_cx {
            for cz in min_cz..=max_cz {
                let Some(indices) = self.cells.get(&(cx, cz)) else {
                    continue;
                };
                for &i in indices {
                    let entry = &self.entries[i];
                    let dx = entry.x - x;
                    let dz = entry.z - z;
                    let dist_sq = dx * dx + dz * dz;
                    if dist_sq <= max_sq {
                        hits.push((entry.id.clone(), dist_sq.sqrt()));
                    }
                }
            }
        }
        hits.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.cmp(&b.0)));
        Ok(hits)
    }

    /// Nearest entry satisfying the predicate, with its distance.
    ///
    /// Searches cells ring by ring outward from the query point, visiting
    /// only the perimeter cells of each ring. A cell in ring `k` is at least
    /// `(k - 1) * cell_size` away from the query point, so once the best
    /// candidate found is within `r * cell_size` after finishing ring `r`,
    /// no unsearched cell can beat it and the search stops.
    ///
    /// Ties on distance resolve to the lexicographically smallest id.
    ///
    /// # Errors
    ///
    /// Fails with [`GameError::StaleSpatialIndex`] on an epoch mismatch.
    pub fn find_nearest<P>(&self, day: u64, x: f64, z: f64, mut predicate: P) -> Result<Option<(String, f64)>>
    where
        P: FnMut(&str) -> bool,
    {
        self.check_epoch(day)?;

        if self.entries.is_empty() {
            return Ok(None);
        }

        let (cx, cz) = self.cell_of(x, z);
        // Rings beyond the populated extent cannot contain entries.
        let max_ring = (cx - self.min_cell.0)
            .abs()
            .max((self.max_cell.0 - cx).abs())
            .max((cz - self.min_cell.1).abs())
            .max((self.max_cell.1 - cz).abs());

        let mut best: Option<(String, f64)> = None;

        for ring in 0..=max_ring {
            self.visit_ring(cx, cz, ring, |entry| {
                if !predicate(&entry.id) {
                    return;
                }
                let dx = entry.x - x;
                let dz = entry.z - z;
                let dist = (dx * dx + dz * dz).sqrt();
                let better = match &best {
                    None => true,
                    Some((best_id, best_dist)) => {
                        dist < *best_dist || (dist == *best_dist && entry.id < *best_id)
                    }
                };
                if better {
                    best = Some((entry.id.clone(), dist));
                }
            });

            if let Some((_, best_dist)) = &best {
                if *best_dist <= ring as f64 * self.cell_size {
                    break;
                }
            }
        }

        Ok(best)
    }

    /// Visit every entry in the perimeter cells of the given ring.
    fn visit_ring<F>(&self, cx: i64, cz: i64, ring: i64, mut visit: F)
    where
        F: FnMut(&Entry),
    {
        let mut visit_cell = |cell: (i64, i64)| {
            if let Some(indices) = self.cells.get(&cell) {
                for &i in indices {
                    visit(&self.entries[i]);
                }
            }
        };

        if ring == 0 {
            visit_cell((cx, cz));
            return;
        }

        // Top and bottom rows of the ring.
        for dx in -ring..=ring {
            visit_cell((cx + dx, cz - ring));
            visit_cell((cx + dx, cz + ring));
        }
        // Left and right columns, corners already covered.
        for dz in (-ring + 1)..=(ring - 1) {
            visit_cell((cx - ring, cz + dz));
            visit_cell((cx + ring, cz + dz));
        }
    }
}
