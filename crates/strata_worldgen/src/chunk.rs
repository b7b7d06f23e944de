//! # Chunk Manager
//!
//! The world grid is split into square chunks of `chunk_size x chunk_size`
//! columns. A chunk is the unit of dirty tracking and mesh rebuilds.
//!
//! ## Lifecycle
//!
//! ```text
//!  set_column_block ──> column mutated, height map updated
//!                       chunk.edit_generation += 1
//!                       chunk.dirty = true, queued once (FIFO)
//!
//!  rebuild_dirty_chunks(budget)             (main thread, inline)
//!  mesh_inputs + apply_prepared_mesh         (worker round trip)
//!                       └─> mesh replaced, mesh_version += 1, dirty = false
//!                           zero blocks => hidden (never deleted)
//! ```
//!
//! Mutations never rebuild anything themselves; rebuild cost is paid in
//! bounded batches per frame.
//!
//! ## Ownership
//!
//! The manager owns every chunk and every column. Everything else (entities,
//! navigation, workers) refers to chunks by [`ChunkKey`] and asks the manager.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::column::{Block, BlockKind, Cap, Column, ColumnError, ColumnMutation};
use crate::generator::HeightMatrix;
use crate::mesh::{prepare_chunk_mesh, ChunkMesh, ChunkMeshInput, SurfaceTag};
use crate::profile::{DimensionProfile, Palette};

/// Default columns per chunk side.
pub const DEFAULT_CHUNK_SIZE: usize = 16;

/// Chunk coordinate: `floor(gx / size) | floor(gz / size)`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    /// Chunk X.
    pub cx: i32,
    /// Chunk Z.
    pub cz: i32,
}

impl ChunkKey {
    /// Creates a key.
    #[inline]
    #[must_use]
    pub const fn new(cx: i32, cz: i32) -> Self {
        Self { cx, cz }
    }

    /// Chunk containing grid column `(gx, gz)`.
    #[inline]
    #[must_use]
    pub const fn for_column(gx: i32, gz: i32, chunk_size: usize) -> Self {
        let size = chunk_size as i32;
        Self {
            cx: gx.div_euclid(size),
            cz: gz.div_euclid(size),
        }
    }

    /// Chunk containing world position `(x, z)`.
    #[inline]
    #[must_use]
    pub fn for_position(x: f32, z: f32, chunk_size: usize) -> Self {
        Self::for_column(x.floor() as i32, z.floor() as i32, chunk_size)
    }

    /// Chebyshev distance in chunks.
    #[inline]
    #[must_use]
    pub const fn distance(self, other: Self) -> u32 {
        let dx = self.cx.abs_diff(other.cx);
        let dz = self.cz.abs_diff(other.cz);
        if dx > dz {
            dx
        } else {
            dz
        }
    }

    /// Grid column of this chunk's origin corner.
    #[inline]
    #[must_use]
    pub const fn origin(self, chunk_size: usize) -> (i32, i32) {
        let size = chunk_size as i32;
        (self.cx * size, self.cz * size)
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.cx, self.cz)
    }
}

/// Failure to parse a `"cx|cz"` key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid chunk key {0:?}, expected \"cx|cz\"")]
pub struct ChunkKeyParseError(pub String);

impl FromStr for ChunkKey {
    type Err = ChunkKeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ChunkKeyParseError(s.to_string());
        let (cx, cz) = s.split_once('|').ok_or_else(err)?;
        Ok(Self {
            cx: cx.trim().parse().map_err(|_| err())?,
            cz: cz.trim().parse().map_err(|_| err())?,
        })
    }
}

/// One chunk: its columns, dirty state and last built mesh.
#[derive(Clone, Debug)]
pub struct Chunk {
    key: ChunkKey,
    size: usize,
    columns: Vec<Column>,
    dirty: bool,
    queued: bool,
    mesh_version: u64,
    edit_generation: u64,
    hidden: bool,
    mesh: Option<ChunkMesh>,
    block_count: u64,
}

impl Chunk {
    fn empty(key: ChunkKey, size: usize) -> Self {
        Self {
            key,
            size,
            columns: vec![Column::new(); size * size],
            dirty: false,
            queued: false,
            mesh_version: 0,
            edit_generation: 0,
            hidden: false,
            mesh: None,
            block_count: 0,
        }
    }

    /// Key of this chunk.
    #[inline]
    #[must_use]
    pub const fn key(&self) -> ChunkKey {
        self.key
    }

    /// Needs a mesh rebuild.
    #[inline]
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of meshes installed so far.
    #[inline]
    #[must_use]
    pub const fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    /// Bumped on every column mutation.
    #[inline]
    #[must_use]
    pub const fn edit_generation(&self) -> u64 {
        self.edit_generation
    }

    /// True when the last rebuild found no blocks.
    #[inline]
    #[must_use]
    pub const fn is_hidden(&self) -> bool {
        self.hidden
    }

    /// Last installed mesh.
    #[inline]
    #[must_use]
    pub fn mesh(&self) -> Option<&ChunkMesh> {
        self.mesh.as_ref()
    }

    /// Non-empty blocks counted at the last rebuild.
    #[inline]
    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Column at local `(lx, lz)`.
    #[inline]
    #[must_use]
    pub fn column(&self, lx: usize, lz: usize) -> Option<&Column> {
        if lx < self.size && lz < self.size {
            self.columns.get(lx * self.size + lz)
        } else {
            None
        }
    }

    fn install(&mut self, mesh: ChunkMesh) -> u64 {
        self.block_count = mesh.block_count;
        self.hidden = mesh.block_count == 0;
        self.mesh = Some(mesh);
        self.mesh_version += 1;
        self.dirty = false;
        self.mesh_version
    }
}

/// What a successful mutation did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Owning chunk, now dirty.
    pub key: ChunkKey,
    /// Height before.
    pub previous_height: u16,
    /// Height after.
    pub height: u16,
    /// Block removed by a mine.
    pub removed: Option<Block>,
}

/// Result of one budgeted rebuild pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
    /// Chunks rebuilt, in rebuild order.
    pub rebuilt: Vec<ChunkKey>,
    /// How many of them ended up hidden.
    pub hidden: usize,
    /// Dirty chunks left for later frames.
    pub remaining: usize,
}

/// Outcome of [`ChunkManager::apply_prepared_mesh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshApply {
    /// Mesh installed with this version.
    Installed {
        /// New mesh version.
        mesh_version: u64,
    },
    /// The chunk was edited after the snapshot; it stays dirty.
    Outdated,
    /// No such chunk (world was swapped).
    UnknownChunk,
}

/// Owns the columns, height map and chunks of one world.
#[derive(Clone, Debug)]
pub struct ChunkManager {
    chunk_size: usize,
    max_column_height: u16,
    palette: Palette,
    heights: HeightMatrix,
    chunks: HashMap<ChunkKey, Chunk>,
    dirty_queue: VecDeque<ChunkKey>,
}

impl ChunkManager {
    /// An empty world: every column at height 0, no chunks yet.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    #[must_use]
    pub fn new(grid_size: usize, chunk_size: usize, max_column_height: u16, palette: Palette) -> Self {
        assert!(chunk_size > 0, "chunk size must be greater than zero");
        Self {
            chunk_size,
            max_column_height,
            palette,
            heights: HeightMatrix::filled(grid_size, 0),
            chunks: HashMap::new(),
            dirty_queue: VecDeque::new(),
        }
    }

    /// Fills columns from a height matrix.
    ///
    /// Level 0 is bedrock (for columns taller than one block), the top is the
    /// capped surface block, a subsurface band sits below it and filler takes
    /// the rest. Every touched chunk starts dirty.
    #[must_use]
    pub fn from_matrix(
        matrix: &HeightMatrix,
        palette: &Palette,
        chunk_size: usize,
        max_column_height: u16,
    ) -> Self {
        let mut manager = Self::new(matrix.size(), chunk_size, max_column_height, palette.clone());
        for (gx, gz, height) in matrix.iter() {
            let height = height.min(max_column_height);
            let column = Self::fill_column(palette, height);
            manager.install_column(gx as i32, gz as i32, column);
        }
        manager
    }

    /// [`ChunkManager::from_matrix`] with the profile's palette and flooding.
    #[must_use]
    pub fn from_profile(
        matrix: &HeightMatrix,
        profile: &DimensionProfile,
        chunk_size: usize,
        max_column_height: u16,
    ) -> Self {
        let limit = max_column_height.max(profile.max_height);
        let mut manager = Self::from_matrix(matrix, &profile.palette, chunk_size, limit);
        if let (Some(level), Some(liquid)) = (profile.water_level, profile.palette.liquid) {
            manager.flood(level, liquid);
        }
        manager
    }

    fn fill_column(palette: &Palette, height: u16) -> Column {
        let mut blocks = Vec::with_capacity(usize::from(height));
        for level in 0..height {
            let from_top = height - 1 - level;
            let block = if from_top == 0 {
                let cap = if palette.surface.accepts_cap() {
                    palette.surface_cap
                } else {
                    Cap::None
                };
                Block::capped(palette.surface, level, cap)
            } else if level == 0 {
                Block::new(palette.bedrock, level)
            } else if from_top <= palette.subsurface_depth {
                Block::new(palette.subsurface, level)
            } else {
                Block::new(palette.filler, level)
            };
            blocks.push(block);
        }
        Column::from_blocks(blocks)
    }

    fn install_column(&mut self, gx: i32, gz: i32, column: Column) {
        let key = self.chunk_key_for_column(gx, gz);
        let local = self.local_index(gx, gz);
        let size = self.chunk_size;
        self.heights.set(gx as usize, gz as usize, column.height());
        let chunk = self.chunks.entry(key).or_insert_with(|| Chunk::empty(key, size));
        chunk.columns[local] = column;
        if !chunk.queued {
            chunk.dirty = true;
            chunk.queued = true;
            self.dirty_queue.push_back(key);
        }
    }

    fn flood(&mut self, level: u16, liquid: BlockKind) {
        for chunk in self.chunks.values_mut() {
            for column in &mut chunk.columns {
                let h = column.height();
                if h > 0 && h <= level {
                    column.replace_top(liquid);
                }
            }
        }
    }

    #[inline]
    fn local_index(&self, gx: i32, gz: i32) -> usize {
        let size = self.chunk_size as i32;
        (gx.rem_euclid(size) * size + gz.rem_euclid(size)) as usize
    }

    #[inline]
    fn in_grid(&self, gx: i32, gz: i32) -> bool {
        let n = self.heights.size() as i64;
        (0..n).contains(&i64::from(gx)) && (0..n).contains(&i64::from(gz))
    }

    /// Returns the chunk for `key`, creating an empty one if needed.
    pub fn ensure_chunk(&mut self, key: ChunkKey) -> &mut Chunk {
        let size = self.chunk_size;
        self.chunks.entry(key).or_insert_with(|| Chunk::empty(key, size))
    }

    /// Applies a place or mine to column `(gx, gz)`.
    ///
    /// Updates the height map, bumps the owning chunk's edit generation and
    /// queues it for rebuild. Nothing is rebuilt here.
    ///
    /// # Errors
    ///
    /// Any [`ColumnError`]. A rejected mutation leaves everything unchanged,
    /// dirty flags included.
    pub fn set_column_block(
        &mut self,
        gx: i32,
        gz: i32,
        mutation: ColumnMutation,
    ) -> Result<MutationOutcome, ColumnError> {
        if !self.in_grid(gx, gz) {
            return Err(ColumnError::OutOfBounds { gx, gz });
        }
        let key = self.chunk_key_for_column(gx, gz);
        let local = self.local_index(gx, gz);
        let max = self.max_column_height;
        let exposed = self.palette.exposed_cap;
        let size = self.chunk_size;

        let chunk = self.chunks.entry(key).or_insert_with(|| Chunk::empty(key, size));
        let column = &mut chunk.columns[local];
        let previous_height = column.height();
        let removed = match mutation {
            ColumnMutation::Place(kind) => {
                column.place(kind, max)?;
                None
            }
            ColumnMutation::Mine => Some(column.mine(exposed)?),
        };
        let height = column.height();

        chunk.edit_generation += 1;
        chunk.dirty = true;
        if !chunk.queued {
            chunk.queued = true;
            self.dirty_queue.push_back(key);
        }
        self.heights.set(gx as usize, gz as usize, height);

        Ok(MutationOutcome {
            key,
            previous_height,
            height,
            removed,
        })
    }

    /// Pops up to `max` dirty chunks off the rebuild queue, oldest first.
    ///
    /// Popped chunks stay dirty until a mesh is installed.
    pub fn drain_dirty_batch(&mut self, max: usize) -> Vec<ChunkKey> {
        let mut batch = Vec::with_capacity(max.min(self.dirty_queue.len()));
        while batch.len() < max {
            let Some(key) = self.dirty_queue.pop_front() else {
                break;
            };
            if let Some(chunk) = self.chunks.get_mut(&key) {
                chunk.queued = false;
                if chunk.dirty {
                    batch.push(key);
                }
            }
        }
        batch
    }

    /// Puts dirty chunks that fell off the queue back at its end.
    ///
    /// Returns how many were re-queued.
    pub fn requeue_dirty(&mut self) -> usize {
        let mut orphans: Vec<ChunkKey> = self
            .chunks
            .values()
            .filter(|c| c.dirty && !c.queued)
            .map(Chunk::key)
            .collect();
        orphans.sort_unstable();
        for key in &orphans {
            if let Some(chunk) = self.chunks.get_mut(key) {
                chunk.queued = true;
            }
            self.dirty_queue.push_back(*key);
        }
        orphans.len()
    }

    /// Rebuilds at most `frame_budget` dirty chunks in FIFO order.
    pub fn rebuild_dirty_chunks(&mut self, frame_budget: usize) -> RebuildReport {
        let batch = self.drain_dirty_batch(frame_budget);
        let mut report = RebuildReport::default();
        for key in batch {
            let Some(input) = self.mesh_input(key) else {
                continue;
            };
            let mesh = prepare_chunk_mesh(&input);
            if let Some(chunk) = self.chunks.get_mut(&key) {
                chunk.install(mesh);
                if chunk.hidden {
                    report.hidden += 1;
                }
                report.rebuilt.push(key);
            }
        }
        report.remaining = self.dirty_count();
        if !report.rebuilt.is_empty() {
            tracing::debug!(
                rebuilt = report.rebuilt.len(),
                hidden = report.hidden,
                remaining = report.remaining,
                "rebuilt dirty chunks"
            );
        }
        report
    }

    /// Snapshot of one chunk for off-thread mesh preparation.
    #[must_use]
    pub fn mesh_input(&self, key: ChunkKey) -> Option<ChunkMeshInput> {
        let chunk = self.chunks.get(&key)?;
        let size = self.chunk_size;
        let padded = size + 2;
        let (ox, oz) = key.origin(size);

        let mut heights = vec![0u16; padded * padded];
        for px in 0..padded {
            for pz in 0..padded {
                let gx = ox + px as i32 - 1;
                let gz = oz + pz as i32 - 1;
                heights[px * padded + pz] = self.height_at(gx, gz).unwrap_or(0);
            }
        }

        let surfaces = chunk
            .columns
            .iter()
            .map(|column| {
                column.top().map_or(SurfaceTag::default(), |top| SurfaceTag {
                    block: top.kind.tag(),
                    cap: top.cap.tag(),
                })
            })
            .collect();

        Some(ChunkMeshInput {
            key,
            chunk_size: size,
            edit_generation: chunk.edit_generation,
            heights,
            surfaces,
        })
    }

    /// Snapshots for several chunks, skipping unknown keys.
    #[must_use]
    pub fn mesh_inputs(&self, keys: &[ChunkKey]) -> Vec<ChunkMeshInput> {
        keys.iter().filter_map(|&key| self.mesh_input(key)).collect()
    }

    /// Installs a mesh prepared elsewhere.
    ///
    /// Rejected when the chunk was edited after its snapshot was taken; the
    /// chunk then stays dirty and goes back on the queue.
    pub fn apply_prepared_mesh(&mut self, mesh: ChunkMesh) -> MeshApply {
        let Some(chunk) = self.chunks.get_mut(&mesh.key) else {
            return MeshApply::UnknownChunk;
        };
        if chunk.edit_generation != mesh.edit_generation {
            if !chunk.queued {
                chunk.queued = true;
                self.dirty_queue.push_back(mesh.key);
            }
            return MeshApply::Outdated;
        }
        let mesh_version = chunk.install(mesh);
        MeshApply::Installed { mesh_version }
    }

    /// Chunk containing grid column `(gx, gz)`.
    #[inline]
    #[must_use]
    pub const fn chunk_key_for_column(&self, gx: i32, gz: i32) -> ChunkKey {
        ChunkKey::for_column(gx, gz, self.chunk_size)
    }

    /// Chunk containing world position `(x, z)`.
    #[inline]
    #[must_use]
    pub fn chunk_key_for_position(&self, x: f32, z: f32) -> ChunkKey {
        ChunkKey::for_position(x, z, self.chunk_size)
    }

    /// Height of column `(gx, gz)`, `None` outside the grid.
    #[must_use]
    pub fn height_at(&self, gx: i32, gz: i32) -> Option<u16> {
        if !self.in_grid(gx, gz) {
            return None;
        }
        self.heights.get(gx as usize, gz as usize)
    }

    /// Column at `(gx, gz)`, if its chunk exists.
    #[must_use]
    pub fn column(&self, gx: i32, gz: i32) -> Option<&Column> {
        let chunk = self.chunks.get(&self.chunk_key_for_column(gx, gz))?;
        chunk.columns.get(self.local_index(gx, gz))
    }

    /// Top block of column `(gx, gz)`.
    #[must_use]
    pub fn top_block(&self, gx: i32, gz: i32) -> Option<&Block> {
        self.column(gx, gz)?.top()
    }

    /// Chunk by key.
    #[inline]
    #[must_use]
    pub fn chunk(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(&key)
    }

    /// True if the chunk exists.
    #[inline]
    #[must_use]
    pub fn contains_chunk(&self, key: ChunkKey) -> bool {
        self.chunks.contains_key(&key)
    }

    /// All chunk keys, sorted.
    #[must_use]
    pub fn chunk_keys(&self) -> Vec<ChunkKey> {
        let mut keys: Vec<_> = self.chunks.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Number of chunks.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks waiting for a mesh.
    #[must_use]
    pub fn dirty_count(&self) -> usize {
        self.chunks.values().filter(|c| c.dirty).count()
    }

    /// Chunks hidden because they hold no blocks.
    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.chunks.values().filter(|c| c.hidden).count()
    }

    /// Side length of the world grid.
    #[inline]
    #[must_use]
    pub const fn grid_size(&self) -> usize {
        self.heights.size()
    }

    /// Columns per chunk side.
    #[inline]
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Placement limit.
    #[inline]
    #[must_use]
    pub const fn max_column_height(&self) -> u16 {
        self.max_column_height
    }

    /// Block palette of this world.
    #[inline]
    #[must_use]
    pub const fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Current height map.
    #[inline]
    #[must_use]
    pub const fn heights(&self) -> &HeightMatrix {
        &self.heights
    }

    /// Total non-empty blocks.
    #[must_use]
    pub fn total_blocks(&self) -> u64 {
        self.heights.voxel_count()
    }

    /// Where new arrivals and relocated entities stand.
    #[must_use]
    pub fn spawn_column(&self) -> (i32, i32) {
        let mid = (self.grid_size() / 2) as i32;
        (mid, mid)
    }

    /// Checks `column.height() == height map` and the height limit for
    /// every column in the grid.
    #[must_use]
    pub fn check_invariants(&self) -> bool {
        for (gx, gz, expected) in self.heights.iter() {
            let actual = self.column(gx as i32, gz as i32).map_or(0, Column::height);
            if actual != expected || expected > self.max_column_height {
                tracing::error!(gx, gz, expected, actual, "column height mismatch");
                return false;
            }
        }
        true
    }
}
