//! # Dimension Profiles
//!
//! A dimension is a world variant: its own height range, noise shape,
//! block palette, physics multipliers, spawn table and asset manifest.
//!
//! Profiles are plain values. They are validated once when registered and
//! never change afterwards; swapping dimensions swaps whole profiles.
//!
//! ## TOML format
//!
//! ```toml
//! [[dimension]]
//! id = "rock"
//! name = "Rock Dimension"
//! minHeight = 2
//! maxHeight = 40
//! noiseFrequency = 0.06
//! noiseAmplitude = 10.0
//! gravity = 1.0
//! speedMultiplier = 0.9
//!
//! [dimension.palette]
//! surface = "stone"
//! surfaceCap = "snow"
//!
//! [[dimension.spawns]]
//! kind = "golem"
//! count = 2
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::column::{BlockKind, Cap};

/// Hard upper bound on any profile's `maxHeight`.
pub const MAX_COLUMN_HEIGHT: u16 = 256;

/// Profile validation and parsing errors.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// `id` is empty.
    #[error("dimension id must not be empty")]
    EmptyId,

    /// `minHeight > maxHeight` or `maxHeight` outside `1..=MAX_COLUMN_HEIGHT`.
    #[error("dimension {id}: invalid height range {min}..={max}")]
    InvalidHeightRange {
        /// Dimension id.
        id: String,
        /// Configured minimum.
        min: u16,
        /// Configured maximum.
        max: u16,
    },

    /// A height setting lies outside the height range.
    #[error("dimension {id}: {field} = {value} is outside {min}..={max}")]
    HeightOutOfRange {
        /// Dimension id.
        id: String,
        /// Field name.
        field: &'static str,
        /// Configured value.
        value: u16,
        /// Range minimum.
        min: u16,
        /// Range maximum.
        max: u16,
    },

    /// A numeric field is NaN, infinite or not positive where required.
    #[error("dimension {id}: {field} has invalid value {value}")]
    InvalidNumber {
        /// Dimension id.
        id: String,
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: f64,
    },

    /// `octaves` outside `1..=8`.
    #[error("dimension {id}: octaves must be in 1..=8, got {octaves}")]
    InvalidOctaves {
        /// Dimension id.
        id: String,
        /// Configured octaves.
        octaves: u32,
    },

    /// `waterLevel` set but the palette has no liquid.
    #[error("dimension {id}: waterLevel requires a palette liquid")]
    MissingLiquid {
        /// Dimension id.
        id: String,
    },

    /// TOML could not be parsed.
    #[error("invalid dimension TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for profile operations.
pub type ProfileResult<T> = Result<T, ProfileError>;

/// Which blocks a generated column is made of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Palette {
    /// Level 0 of every column.
    pub bedrock: BlockKind,
    /// Deep fill.
    pub filler: BlockKind,
    /// Band right below the surface.
    pub subsurface: BlockKind,
    /// Thickness of the subsurface band.
    pub subsurface_depth: u16,
    /// Top block of dry columns.
    pub surface: BlockKind,
    /// Cap on generated surface blocks.
    pub surface_cap: Cap,
    /// Cap given to a never-surfaced block when mining uncovers it.
    pub exposed_cap: Cap,
    /// Liquid used for flooding below `waterLevel`.
    pub liquid: Option<BlockKind>,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            bedrock: BlockKind::Bedrock,
            filler: BlockKind::Stone,
            subsurface: BlockKind::Dirt,
            subsurface_depth: 2,
            surface: BlockKind::Stone,
            surface_cap: Cap::Grass,
            exposed_cap: Cap::Dirt,
            liquid: None,
        }
    }
}

/// Mob spawn entry run by the ready hooks of a dimension.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRule {
    /// Mob kind name, e.g. `"zombie"` or `"golem"`.
    pub kind: String,
    /// How many to spawn.
    pub count: u32,
}

/// Configuration of one world variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionProfile {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Lowest generated column height.
    pub min_height: u16,
    /// Highest generated column height.
    pub max_height: u16,
    /// Noise midline. Defaults to the middle of the height range.
    #[serde(default)]
    pub base_height: Option<u16>,
    /// Noise sampling frequency per grid cell.
    pub noise_frequency: f64,
    /// Height swing around the base.
    pub noise_amplitude: f64,
    /// Noise layers.
    #[serde(default = "default_octaves")]
    pub octaves: u32,
    /// Block palette.
    #[serde(default)]
    pub palette: Palette,
    /// Gravity multiplier.
    #[serde(default = "default_multiplier")]
    pub gravity: f32,
    /// Movement speed multiplier.
    #[serde(default = "default_multiplier")]
    pub speed_multiplier: f32,
    /// Loot tables by reference.
    #[serde(default)]
    pub loot_table_refs: Vec<String>,
    /// Assets that must resolve for this dimension to render properly.
    #[serde(default)]
    pub required_asset_manifest: Vec<String>,
    /// Initial mobs spawned when the dimension becomes ready.
    #[serde(default)]
    pub spawns: Vec<SpawnRule>,
    /// Columns at or below this height get a liquid top.
    #[serde(default)]
    pub water_level: Option<u16>,
}

const fn default_octaves() -> u32 {
    4
}

const fn default_multiplier() -> f32 {
    1.0
}

#[derive(Deserialize)]
struct ProfileFile {
    #[serde(default)]
    dimension: Vec<DimensionProfile>,
}

impl DimensionProfile {
    /// Noise midline.
    #[inline]
    #[must_use]
    pub fn base_height(&self) -> u16 {
        self.base_height
            .unwrap_or_else(|| self.min_height + (self.max_height.saturating_sub(self.min_height)) / 2)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// The first problem found, as a [`ProfileError`].
    pub fn validate(&self) -> ProfileResult<()> {
        if self.id.trim().is_empty() {
            return Err(ProfileError::EmptyId);
        }
        let id = || self.id.clone();

        if self.min_height > self.max_height || self.max_height == 0 || self.max_height > MAX_COLUMN_HEIGHT {
            return Err(ProfileError::InvalidHeightRange {
                id: id(),
                min: self.min_height,
                max: self.max_height,
            });
        }

        let in_range = |field: &'static str, value: u16| {
            if value < self.min_height || value > self.max_height {
                Err(ProfileError::HeightOutOfRange {
                    id: id(),
                    field,
                    value,
                    min: self.min_height,
                    max: self.max_height,
                })
            } else {
                Ok(())
            }
        };
        if let Some(base) = self.base_height {
            in_range("baseHeight", base)?;
        }
        if let Some(water) = self.water_level {
            in_range("waterLevel", water)?;
            if self.palette.liquid.is_none() {
                return Err(ProfileError::MissingLiquid { id: id() });
            }
        }

        let positive = |field: &'static str, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ProfileError::InvalidNumber { id: id(), field, value })
            }
        };
        positive("noiseFrequency", self.noise_frequency)?;
        positive("gravity", f64::from(self.gravity))?;
        positive("speedMultiplier", f64::from(self.speed_multiplier))?;
        if !self.noise_amplitude.is_finite() || self.noise_amplitude < 0.0 {
            return Err(ProfileError::InvalidNumber {
                id: id(),
                field: "noiseAmplitude",
                value: self.noise_amplitude,
            });
        }

        if !(1..=8).contains(&self.octaves) {
            return Err(ProfileError::InvalidOctaves {
                id: id(),
                octaves: self.octaves,
            });
        }
        Ok(())
    }

    /// Parses every `[[dimension]]` table in `source` and validates each.
    ///
    /// # Errors
    ///
    /// A parse error or the first invalid profile.
    pub fn parse_toml(source: &str) -> ProfileResult<Vec<Self>> {
        let file: ProfileFile = toml::from_str(source)?;
        for profile in &file.dimension {
            profile.validate()?;
        }
        Ok(file.dimension)
    }

    /// The starting overworld: grass hills and shallow lakes.
    #[must_use]
    pub fn origin() -> Self {
        Self {
            id: "origin".into(),
            name: "Origin".into(),
            min_height: 1,
            max_height: 24,
            base_height: Some(8),
            noise_frequency: 0.045,
            noise_amplitude: 6.0,
            octaves: 4,
            palette: Palette {
                liquid: Some(BlockKind::Water),
                ..Palette::default()
            },
            gravity: 1.0,
            speed_multiplier: 1.0,
            loot_table_refs: vec!["loot/origin-common".into()],
            required_asset_manifest: vec![
                "textures/grass".into(),
                "textures/stone".into(),
                "models/zombie".into(),
            ],
            spawns: vec![SpawnRule {
                kind: "zombie".into(),
                count: 2,
            }],
            water_level: Some(4),
        }
    }

    /// Snow-capped stone highlands guarded by golems.
    #[must_use]
    pub fn rock() -> Self {
        Self {
            id: "rock".into(),
            name: "Rock Dimension".into(),
            min_height: 2,
            max_height: 40,
            base_height: Some(14),
            noise_frequency: 0.06,
            noise_amplitude: 10.0,
            octaves: 5,
            palette: Palette {
                subsurface: BlockKind::Gravel,
                subsurface_depth: 1,
                surface: BlockKind::Stone,
                surface_cap: Cap::Snow,
                exposed_cap: Cap::None,
                ..Palette::default()
            },
            gravity: 1.0,
            speed_multiplier: 0.9,
            loot_table_refs: vec!["loot/rock-ore".into()],
            required_asset_manifest: vec!["textures/stone".into(), "models/golem".into()],
            spawns: vec![SpawnRule {
                kind: "golem".into(),
                count: 2,
            }],
            water_level: None,
        }
    }

    /// Basalt wastes with lava pools.
    #[must_use]
    pub fn ember() -> Self {
        Self {
            id: "ember".into(),
            name: "Ember Dimension".into(),
            min_height: 1,
            max_height: 32,
            base_height: Some(10),
            noise_frequency: 0.05,
            noise_amplitude: 8.0,
            octaves: 3,
            palette: Palette {
                filler: BlockKind::Basalt,
                subsurface: BlockKind::Obsidian,
                subsurface_depth: 1,
                surface: BlockKind::Basalt,
                surface_cap: Cap::Ash,
                exposed_cap: Cap::Ash,
                liquid: Some(BlockKind::Lava),
                ..Palette::default()
            },
            gravity: 1.2,
            speed_multiplier: 1.1,
            loot_table_refs: vec!["loot/ember-relic".into()],
            required_asset_manifest: vec!["textures/basalt".into(), "textures/lava".into()],
            spawns: vec![SpawnRule {
                kind: "zombie".into(),
                count: 3,
            }],
            water_level: Some(3),
        }
    }
}

/// Profiles that ship with the engine, in portal progression order.
#[must_use]
pub fn builtin_profiles() -> Vec<DimensionProfile> {
    vec![
        DimensionProfile::origin(),
        DimensionProfile::rock(),
        DimensionProfile::ember(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid() {
        for profile in builtin_profiles() {
            profile.validate().unwrap();
        }
    }

    #[test]
    fn test_base_height_defaults_to_midpoint() {
        let mut profile = DimensionProfile::rock();
        profile.base_height = None;
        assert_eq!(profile.base_height(), 2 + (40 - 2) / 2);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let mut profile = DimensionProfile::origin();
        profile.min_height = 30;
        assert!(matches!(
            profile.validate(),
            Err(ProfileError::InvalidHeightRange { .. })
        ));

        let mut profile = DimensionProfile::origin();
        profile.noise_frequency = f64::NAN;
        assert!(matches!(
            profile.validate(),
            Err(ProfileError::InvalidNumber { field: "noiseFrequency", .. })
        ));

        let mut profile = DimensionProfile::origin();
        profile.palette.liquid = None;
        assert!(matches!(profile.validate(), Err(ProfileError::MissingLiquid { .. })));

        let mut profile = DimensionProfile::origin();
        profile.id = "  ".into();
        assert!(matches!(profile.validate(), Err(ProfileError::EmptyId)));
    }

    #[test]
    fn test_parse_toml() {
        let source = r#"
            [[dimension]]
            id = "crystal"
            name = "Crystal Caves"
            minHeight = 3
            maxHeight = 20
            noiseFrequency = 0.08
            noiseAmplitude = 4.0
            requiredAssetManifest = ["textures/crystal"]

            [dimension.palette]
            surface = "obsidian"
            surfaceCap = "none"

            [[dimension.spawns]]
            kind = "golem"
            count = 1
        "#;

        let profiles = DimensionProfile::parse_toml(source).unwrap();
        assert_eq!(profiles.len(), 1);
        let crystal = &profiles[0];
        assert_eq!(crystal.id, "crystal");
        assert_eq!(crystal.octaves, 4);
        assert_eq!(crystal.palette.surface, BlockKind::Obsidian);
        assert_eq!(crystal.palette.filler, BlockKind::Stone);
        assert_eq!(crystal.spawns[0].kind, "golem");
        assert!((crystal.gravity - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_toml_rejects_malformed() {
        let err = DimensionProfile::parse_toml("[[dimension]]\nid = 3").unwrap_err();
        assert!(matches!(err, ProfileError::Parse(_)));

        let invalid = r#"
            [[dimension]]
            id = "bad"
            name = "Bad"
            minHeight = 10
            maxHeight = 5
            noiseFrequency = 0.1
            noiseAmplitude = 1.0
        "#;
        assert!(matches!(
            DimensionProfile::parse_toml(invalid),
            Err(ProfileError::InvalidHeightRange { .. })
        ));
    }
}
