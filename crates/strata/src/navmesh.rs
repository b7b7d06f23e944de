//! # Navigation Mesh Maintainer
//!
//! One walkability grid per chunk, rebuilt lazily:
//!
//! ```text
//!   set_column_block ──> mark_dirty(key) ──> pending queue
//!                                              │
//!   tick ──> begin_tick ──> evict_outside ──> process_pending(budget)
//!                                              │
//!                               ok ────────────┼──── MissingChunk
//!                               v              v
//!                          grids[key]      failed (this tick)
//! ```
//!
//! A column is unwalkable when its top block is a hazard, when it is empty,
//! or when every in-grid neighbour differs by more than the step height.
//! Mobs standing in a failed chunk skip pathing for the tick.

use std::collections::{HashMap, HashSet, VecDeque};

use strata_worldgen::{ChunkKey, ChunkManager};

use crate::config::NavigationConfig;
use crate::error::NavError;

const NEIGHBOURS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Walkability of one column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavCell {
    /// Column height (standing level).
    pub height: u16,
    /// Top block is a hazard.
    pub hazard: bool,
    /// A mob may stand here.
    pub walkable: bool,
}

impl NavCell {
    /// A walkable cell.
    #[must_use]
    pub const fn walkable(height: u16) -> Self {
        Self {
            height,
            hazard: false,
            walkable: true,
        }
    }

    /// A hazard cell.
    #[must_use]
    pub const fn hazard(height: u16) -> Self {
        Self {
            height,
            hazard: true,
            walkable: false,
        }
    }
}

/// Walkability grid of one chunk.
#[derive(Clone, Debug)]
pub struct NavGrid {
    key: ChunkKey,
    origin: (i32, i32),
    size: usize,
    cells: Vec<NavCell>,
}

impl NavGrid {
    /// Cell at world column `(gx, gz)`, if inside this chunk.
    #[must_use]
    pub fn cell(&self, gx: i32, gz: i32) -> Option<&NavCell> {
        let lx = gx - self.origin.0;
        let lz = gz - self.origin.1;
        let size = self.size as i32;
        if !(0..size).contains(&lx) || !(0..size).contains(&lz) {
            return None;
        }
        self.cells.get((lx * size + lz) as usize)
    }

    /// Number of walkable cells.
    #[must_use]
    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|c| c.walkable).count()
    }

    /// Chunk this grid covers.
    #[must_use]
    pub const fn key(&self) -> ChunkKey {
        self.key
    }
}

/// Result of one rebuild.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NavRebuild {
    /// Rebuilt chunk.
    pub key: ChunkKey,
    /// Walkable cells in it.
    pub walkable_cell_count: usize,
}

/// What one `process_pending` call did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NavTickReport {
    /// Successful rebuilds.
    pub rebuilt: Vec<NavRebuild>,
    /// Chunks that could not be rebuilt.
    pub failed: Vec<(ChunkKey, NavError)>,
    /// Chunks still queued.
    pub remaining: usize,
}

/// Builds the grid for `key` from the current chunk data.
///
/// # Errors
///
/// [`NavError::MissingChunk`] when the chunk does not exist.
pub fn build_grid(chunks: &ChunkManager, key: ChunkKey, step_height: u16) -> Result<NavGrid, NavError> {
    if !chunks.contains_chunk(key) {
        return Err(NavError::MissingChunk(key));
    }
    let size = chunks.chunk_size();
    let origin = key.origin(size);
    let mut cells = Vec::with_capacity(size * size);

    for lx in 0..size as i32 {
        for lz in 0..size as i32 {
            let (gx, gz) = (origin.0 + lx, origin.1 + lz);
            let Some(height) = chunks.height_at(gx, gz) else {
                cells.push(NavCell::default());
                continue;
            };
            let hazard = chunks.top_block(gx, gz).is_some_and(|b| b.kind.is_hazard());
            let walkable = !hazard && height > 0 && has_step(chunks, gx, gz, height, step_height);
            cells.push(NavCell {
                height,
                hazard,
                walkable,
            });
        }
    }

    Ok(NavGrid {
        key,
        origin,
        size,
        cells,
    })
}

fn has_step(chunks: &ChunkManager, gx: i32, gz: i32, height: u16, step_height: u16) -> bool {
    let mut any_neighbour = false;
    for (dx, dz) in NEIGHBOURS {
        if let Some(other) = chunks.height_at(gx + dx, gz + dz) {
            any_neighbour = true;
            if height.abs_diff(other) <= step_height {
                return true;
            }
        }
    }
    // A single-column world has nowhere to step but is still standable.
    !any_neighbour
}

/// Per-chunk navigation grids with a rebuild queue.
pub struct NavMesh {
    grids: HashMap<ChunkKey, NavGrid>,
    pending: VecDeque<ChunkKey>,
    queued: HashSet<ChunkKey>,
    failed: HashSet<ChunkKey>,
    config: NavigationConfig,
}

impl NavMesh {
    /// Empty mesh.
    #[must_use]
    pub fn new(config: NavigationConfig) -> Self {
        Self {
            grids: HashMap::new(),
            pending: VecDeque::new(),
            queued: HashSet::new(),
            failed: HashSet::new(),
            config,
        }
    }

    /// Rebuilds `key` immediately.
    ///
    /// # Errors
    ///
    /// [`NavError::MissingChunk`]; the chunk is then marked failed for this
    /// tick and its old grid dropped.
    pub fn rebuild_for_chunk(&mut self, chunks: &ChunkManager, key: ChunkKey) -> Result<NavRebuild, NavError> {
        match build_grid(chunks, key, self.config.step_height) {
            Ok(grid) => {
                let walkable_cell_count = grid.walkable_count();
                self.grids.insert(key, grid);
                self.failed.remove(&key);
                Ok(NavRebuild {
                    key,
                    walkable_cell_count,
                })
            }
            Err(err) => {
                self.grids.remove(&key);
                self.failed.insert(key);
                Err(err)
            }
        }
    }

    fn enqueue(&mut self, key: ChunkKey) {
        if self.queued.insert(key) {
            self.pending.push_back(key);
        }
    }

    /// Queues `key` and every existing chunk within the pathing radius.
    pub fn mark_dirty(&mut self, key: ChunkKey, chunks: &ChunkManager) {
        self.enqueue(key);
        let r = self.config.pathing_radius as i32;
        for dx in -r..=r {
            for dz in -r..=r {
                let neighbour = ChunkKey::new(key.cx + dx, key.cz + dz);
                if neighbour != key && (chunks.contains_chunk(neighbour) || self.grids.contains_key(&neighbour)) {
                    self.enqueue(neighbour);
                }
            }
        }
    }

    /// Queues existing chunks around `center` that have no grid yet.
    pub fn ensure_active(&mut self, center: ChunkKey, chunks: &ChunkManager) {
        let r = self.config.active_radius as i32;
        for dx in -r..=r {
            for dz in -r..=r {
                let key = ChunkKey::new(center.cx + dx, center.cz + dz);
                if chunks.contains_chunk(key) && !self.grids.contains_key(&key) {
                    self.enqueue(key);
                }
            }
        }
    }

    /// Forgets last tick's failures.
    pub fn begin_tick(&mut self) {
        self.failed.clear();
    }

    /// Rebuilds up to `budget` queued chunks.
    pub fn process_pending(&mut self, chunks: &ChunkManager, budget: usize) -> NavTickReport {
        let mut report = NavTickReport::default();
        for _ in 0..budget {
            let Some(key) = self.pending.pop_front() else {
                break;
            };
            self.queued.remove(&key);
            match self.rebuild_for_chunk(chunks, key) {
                Ok(rebuild) => report.rebuilt.push(rebuild),
                Err(err) => report.failed.push((key, err)),
            }
        }
        report.remaining = self.pending.len();
        report
    }

    /// Drops grids further than the active radius from `center`.
    pub fn evict_outside(&mut self, center: ChunkKey) -> usize {
        let radius = self.config.active_radius;
        let before = self.grids.len();
        self.grids.retain(|key, _| key.distance(center) <= radius);
        let evicted = before - self.grids.len();
        if evicted > 0 {
            tracing::debug!(evicted, center = %center, "nav grids evicted");
        }
        evicted
    }

    /// True when `key` has a grid and did not fail this tick.
    #[must_use]
    pub fn can_path(&self, key: ChunkKey) -> bool {
        self.grids.contains_key(&key) && !self.failed.contains(&key)
    }

    /// Walkability of column `(gx, gz)` according to the built grids.
    #[must_use]
    pub fn is_walkable(&self, gx: i32, gz: i32, chunk_size: usize) -> bool {
        let key = ChunkKey::for_column(gx, gz, chunk_size);
        self.grids
            .get(&key)
            .and_then(|grid| grid.cell(gx, gz))
            .is_some_and(|cell| cell.walkable)
    }

    /// Grid for `key`.
    #[must_use]
    pub fn grid(&self, key: ChunkKey) -> Option<&NavGrid> {
        self.grids.get(&key)
    }

    /// Number of built grids.
    #[must_use]
    pub fn grid_count(&self) -> usize {
        self.grids.len()
    }

    /// Number of queued rebuilds.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Chunks failed this tick.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Step height used for walkability.
    #[must_use]
    pub const fn step_height(&self) -> u16 {
        self.config.step_height
    }

    /// Drops everything (world swap).
    pub fn clear(&mut self) {
        self.grids.clear();
        self.pending.clear();
        self.queued.clear();
        self.failed.clear();
    }

    /// Copies every cell of non-failed grids within `radius` of `center`.
    #[must_use]
    pub fn snapshot_region(&self, center: ChunkKey, radius: u32) -> NavSnapshot {
        let mut snapshot = NavSnapshot::default();
        for (key, grid) in &self.grids {
            if key.distance(center) > radius || self.failed.contains(key) {
                continue;
            }
            let size = grid.size as i32;
            for lx in 0..size {
                for lz in 0..size {
                    let (gx, gz) = (grid.origin.0 + lx, grid.origin.1 + lz);
                    if let Some(cell) = grid.cell(gx, gz) {
                        snapshot.insert((gx, gz), *cell);
                    }
                }
            }
        }
        snapshot
    }
}

/// Owned copy of nav cells, sent to `ai-step` workers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NavSnapshot {
    cells: HashMap<(i32, i32), NavCell>,
}

impl NavSnapshot {
    /// Sets the cell at `column`.
    pub fn insert(&mut self, column: (i32, i32), cell: NavCell) {
        self.cells.insert(column, cell);
    }

    /// Standing height at `column`.
    #[must_use]
    pub fn height(&self, column: (i32, i32)) -> Option<u16> {
        self.cells.get(&column).map(|c| c.height)
    }

    /// True when `column` is known and walkable.
    #[must_use]
    pub fn is_walkable(&self, column: (i32, i32)) -> bool {
        self.cells.get(&column).is_some_and(|c| c.walkable)
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Greedy step from `from` toward `target`.
    ///
    /// Picks the walkable 4-neighbour, within `step_height` of the current
    /// height, that gets strictly closer (Manhattan) to the target. `None`
    /// when no neighbour improves.
    #[must_use]
    pub fn next_step(&self, from: (i32, i32), target: (i32, i32), step_height: u16) -> Option<(i32, i32)> {
        let distance = |c: (i32, i32)| (c.0 - target.0).abs() + (c.1 - target.1).abs();
        let here = self.height(from);
        let mut best: Option<((i32, i32), i32)> = None;

        for (dx, dz) in NEIGHBOURS {
            let candidate = (from.0 + dx, from.1 + dz);
            let Some(cell) = self.cells.get(&candidate) else {
                continue;
            };
            if !cell.walkable {
                continue;
            }
            if here.is_some_and(|h| h.abs_diff(cell.height) > step_height) {
                continue;
            }
            let d = distance(candidate);
            if d < distance(from) && best.map_or(true, |(_, bd)| d < bd) {
                best = Some((candidate, d));
            }
        }
        best.map(|(cell, _)| cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_worldgen::{BlockKind, ColumnMutation, HeightMatrix, Palette};

    fn flat_world(height: u16) -> ChunkManager {
        ChunkManager::from_matrix(&HeightMatrix::filled(32, height), &Palette::default(), 16, 64)
    }

    fn nav() -> NavMesh {
        NavMesh::new(NavigationConfig::default())
    }

    #[test]
    fn test_flat_chunk_fully_walkable() {
        let chunks = flat_world(4);
        let mut nav = nav();
        let rebuild = nav.rebuild_for_chunk(&chunks, ChunkKey::new(0, 0)).unwrap();
        assert_eq!(rebuild.walkable_cell_count, 256);
        assert!(nav.is_walkable(3, 3, 16));
    }

    #[test]
    fn test_missing_chunk_fails_for_tick() {
        let chunks = flat_world(4);
        let mut nav = nav();
        let key = ChunkKey::new(9, 9);

        assert_eq!(nav.rebuild_for_chunk(&chunks, key), Err(NavError::MissingChunk(key)));
        assert!(!nav.can_path(key));
        assert_eq!(nav.failed_count(), 1);

        nav.begin_tick();
        assert_eq!(nav.failed_count(), 0);
    }

    #[test]
    fn test_hazard_and_cliff_cells() {
        let mut chunks = flat_world(4);
        chunks.set_column_block(2, 2, ColumnMutation::Place(BlockKind::Lava)).unwrap();
        // Tower 4 blocks above its neighbours.
        for _ in 0..4 {
            chunks.set_column_block(8, 8, ColumnMutation::Place(BlockKind::Stone)).unwrap();
        }

        let mut nav = nav();
        nav.rebuild_for_chunk(&chunks, ChunkKey::new(0, 0)).unwrap();
        let grid = nav.grid(ChunkKey::new(0, 0)).unwrap();
        assert!(grid.cell(2, 2).unwrap().hazard);
        assert!(!grid.cell(2, 2).unwrap().walkable);
        assert!(!grid.cell(8, 8).unwrap().walkable, "cliff on every side");
        assert!(grid.cell(8, 9).unwrap().walkable);
    }

    #[test]
    fn test_empty_column_unwalkable() {
        let mut chunks = ChunkManager::from_matrix(&HeightMatrix::filled(16, 1), &Palette::default(), 16, 64);
        chunks.set_column_block(5, 5, ColumnMutation::Mine).unwrap();
        let grid = build_grid(&chunks, ChunkKey::new(0, 0), 1).unwrap();
        assert_eq!(grid.cell(5, 5).unwrap().height, 0);
        assert!(!grid.cell(5, 5).unwrap().walkable);
    }

    #[test]
    fn test_mark_dirty_covers_pathing_radius() {
        let chunks = flat_world(4);
        let mut nav = nav();
        nav.mark_dirty(ChunkKey::new(0, 0), &chunks);
        // 2x2 chunk world: the key plus its three existing neighbours.
        assert_eq!(nav.pending_count(), 4);

        let report = nav.process_pending(&chunks, 3);
        assert_eq!(report.rebuilt.len(), 3);
        assert_eq!(report.remaining, 1);
    }

    #[test]
    fn test_eviction_outside_active_radius() {
        let chunks = ChunkManager::from_matrix(&HeightMatrix::filled(160, 2), &Palette::default(), 16, 64);
        let mut nav = nav();
        nav.ensure_active(ChunkKey::new(0, 0), &chunks);
        nav.process_pending(&chunks, 100);
        // Radius 3 from the corner: 4x4 chunks.
        assert_eq!(nav.grid_count(), 16);

        let evicted = nav.evict_outside(ChunkKey::new(5, 5));
        assert_eq!(evicted, 12);
        assert_eq!(nav.grid_count(), 4);
    }

    #[test]
    fn test_next_step_greedy() {
        let mut snapshot = NavSnapshot::default();
        for x in 0..5 {
            snapshot.insert((x, 0), NavCell::walkable(3));
        }
        snapshot.insert((2, 0), NavCell::walkable(5));

        assert_eq!(snapshot.next_step((0, 0), (4, 0), 1), Some((1, 0)));
        assert_eq!(snapshot.next_step((1, 0), (4, 0), 1), None, "step of 2 is too high");
        assert_eq!(snapshot.next_step((1, 0), (4, 0), 2), Some((2, 0)));
        assert_eq!(snapshot.next_step((4, 0), (4, 0), 1), None);
    }
}
