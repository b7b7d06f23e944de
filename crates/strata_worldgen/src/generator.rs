//! # World Generator
//!
//! `generate(seed, profile, grid_size, budget)` turns a seed and a dimension
//! profile into a square height matrix. It is a pure function: no clock, no
//! thread RNG, no global state.
//!
//! ## Pipeline
//!
//! ```text
//! layered simplex ──> * amplitude + base ──> round ──> clamp [min, max]
//!                                                          │
//!                                      sum(heights) <= budget? ── yes ──> Generated
//!                                                          │ no
//!                               1. reduce variance (x0.75, x0.5, x0.25 toward min)
//!                               2. flatten outliers (clamp to median)
//!                               3. flat world (base, lowered to fit, >= min)
//!                                                          │
//!                                                       Fallback
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::noise::{SimplexNoise, WorldSeed};
use crate::profile::DimensionProfile;

/// Variance reduction factors, tried in order.
pub const VARIANCE_FACTORS: [f64; 3] = [0.75, 0.5, 0.25];

const PERSISTENCE: f64 = 0.5;
const LACUNARITY: f64 = 2.0;

/// Maximum total voxel count for one generated world.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VoxelBudget {
    /// No limit.
    #[default]
    Unlimited,
    /// At most this many voxels.
    Limit(u64),
}

impl VoxelBudget {
    /// Whether `voxels` fits.
    #[inline]
    #[must_use]
    pub const fn allows(self, voxels: u64) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limit(limit) => voxels <= limit,
        }
    }
}

/// Square grid of column heights.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightMatrix {
    size: usize,
    heights: Vec<u16>,
}

impl HeightMatrix {
    /// A `size x size` matrix filled with `height`.
    #[must_use]
    pub fn filled(size: usize, height: u16) -> Self {
        Self {
            size,
            heights: vec![height; size * size],
        }
    }

    /// Side length.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn index(&self, gx: usize, gz: usize) -> Option<usize> {
        (gx < self.size && gz < self.size).then_some(gx * self.size + gz)
    }

    /// Height at `(gx, gz)`.
    #[inline]
    #[must_use]
    pub fn get(&self, gx: usize, gz: usize) -> Option<u16> {
        self.index(gx, gz).map(|i| self.heights[i])
    }

    /// Overwrites the height at `(gx, gz)`. Returns false when out of bounds.
    pub fn set(&mut self, gx: usize, gz: usize, height: u16) -> bool {
        match self.index(gx, gz) {
            Some(i) => {
                self.heights[i] = height;
                true
            }
            None => false,
        }
    }

    /// `(gx, gz, height)` for every cell.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, u16)> + '_ {
        let size = self.size;
        self.heights
            .iter()
            .enumerate()
            .map(move |(i, &h)| (i / size, i % size, h))
    }

    /// Sum of all heights.
    #[must_use]
    pub fn voxel_count(&self) -> u64 {
        self.heights.iter().map(|&h| u64::from(h)).sum()
    }

    /// Lowest height, 0 for an empty matrix.
    #[must_use]
    pub fn min(&self) -> u16 {
        self.heights.iter().copied().min().unwrap_or(0)
    }

    /// Highest height, 0 for an empty matrix.
    #[must_use]
    pub fn max(&self) -> u16 {
        self.heights.iter().copied().max().unwrap_or(0)
    }

    /// Median height (upper median for even counts).
    #[must_use]
    pub fn median(&self) -> u16 {
        let mut sorted = self.heights.clone();
        sorted.sort_unstable();
        sorted.get(sorted.len() / 2).copied().unwrap_or(0)
    }

    fn map(&self, f: impl Fn(u16) -> u16) -> Self {
        Self {
            size: self.size,
            heights: self.heights.iter().map(|&h| f(h)).collect(),
        }
    }
}

/// Whether the matrix came straight from noise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationSource {
    /// Noise output within budget.
    Generated,
    /// A budget fallback fired.
    Fallback,
}

/// Which fallback strategy produced the matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "strategy")]
pub enum FallbackReason {
    /// Heights compressed toward the minimum.
    ReduceVariance {
        /// Compression factor in percent.
        factor_percent: u8,
    },
    /// Columns above the median clamped to it.
    FlattenOutliers,
    /// Entire world flattened.
    FlatWorld,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReduceVariance { factor_percent } => write!(f, "reduce-variance({factor_percent}%)"),
            Self::FlattenOutliers => f.write_str("flatten-outliers"),
            Self::FlatWorld => f.write_str("flat-world"),
        }
    }
}

/// Facts about a generation run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMeta {
    /// Seed used.
    pub seed: u64,
    /// Side length.
    pub grid_size: usize,
    /// Sum of heights of the final matrix.
    pub voxel_count: u64,
    /// Noise or fallback.
    pub source: GenerationSource,
    /// Strategy that fired, if any.
    pub fallback_reason: Option<FallbackReason>,
    /// Lowest final height.
    pub min_height: u16,
    /// Highest final height.
    pub max_height: u16,
}

/// Output of [`generate`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedWorld {
    /// Heights.
    pub matrix: HeightMatrix,
    /// Run facts.
    pub meta: GenerationMeta,
}

/// Generates the height matrix for `profile`.
///
/// Identical arguments always return identical matrices. Every cell lies in
/// `[profile.min_height, profile.max_height]`.
#[must_use]
pub fn generate(
    seed: WorldSeed,
    profile: &DimensionProfile,
    grid_size: usize,
    budget: VoxelBudget,
) -> GeneratedWorld {
    let min = profile.min_height.min(profile.max_height);
    let max = profile.max_height;
    let base = f64::from(profile.base_height().clamp(min, max));

    let noise = SimplexNoise::new(seed.derive_str(&profile.id));
    let octaves = profile.octaves.max(1);

    let mut raw = HeightMatrix::filled(grid_size, min);
    for gx in 0..grid_size {
        for gz in 0..grid_size {
            let n = noise.layered(
                gx as f64 * profile.noise_frequency,
                gz as f64 * profile.noise_frequency,
                octaves,
                PERSISTENCE,
                LACUNARITY,
            );
            let h = (base + n * profile.noise_amplitude).round();
            let h = h.clamp(f64::from(min), f64::from(max)) as u16;
            raw.set(gx, gz, h);
        }
    }

    let (matrix, reason) = fit_budget(raw, profile, budget);
    if let Some(reason) = reason {
        tracing::warn!(
            dimension = %profile.id,
            %reason,
            voxels = matrix.voxel_count(),
            "voxel budget exceeded, using fallback terrain"
        );
    }

    let meta = GenerationMeta {
        seed: seed.value(),
        grid_size,
        voxel_count: matrix.voxel_count(),
        source: if reason.is_some() {
            GenerationSource::Fallback
        } else {
            GenerationSource::Generated
        },
        fallback_reason: reason,
        min_height: matrix.min(),
        max_height: matrix.max(),
    };
    GeneratedWorld { matrix, meta }
}

fn fit_budget(
    raw: HeightMatrix,
    profile: &DimensionProfile,
    budget: VoxelBudget,
) -> (HeightMatrix, Option<FallbackReason>) {
    if budget.allows(raw.voxel_count()) {
        return (raw, None);
    }
    let min = profile.min_height.min(profile.max_height);

    let mut strongest = raw.clone();
    for factor in VARIANCE_FACTORS {
        let reduced = raw.map(|h| min + (f64::from(h - min) * factor).round() as u16);
        if budget.allows(reduced.voxel_count()) {
            let factor_percent = (factor * 100.0).round() as u8;
            return (reduced, Some(FallbackReason::ReduceVariance { factor_percent }));
        }
        strongest = reduced;
    }

    let median = strongest.median();
    let flattened = strongest.map(|h| h.min(median));
    if budget.allows(flattened.voxel_count()) {
        return (flattened, Some(FallbackReason::FlattenOutliers));
    }

    let cells = (raw.size() * raw.size()) as u64;
    let mut flat = profile.base_height().clamp(min, profile.max_height);
    if let VoxelBudget::Limit(limit) = budget {
        if cells > 0 {
            let affordable = u16::try_from(limit / cells).unwrap_or(u16::MAX);
            flat = flat.min(affordable).max(min);
        }
    }
    (
        HeightMatrix::filled(raw.size(), flat),
        Some(FallbackReason::FlatWorld),
    )
}
