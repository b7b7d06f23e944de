//! # Blocks and Columns
//!
//! A column is the vertical stack of blocks standing on one grid cell,
//! ordered bottom to top. Its length *is* the height of that cell.
//!
//! ## Caps
//!
//! Blocks carry a surface covering ([`Cap`]). Only the top of a column shows
//! its cap, so placing a block on top buries the old cap:
//!
//! ```text
//! before place     after place(Stone)     after mine
//! ┌─────────┐      ┌─────────┐            ┌─────────┐
//! │ Stone   │      │ Stone   │ <- new top │ Stone   │
//! │ +Grass  │      ├─────────┤            │ +Grass  │ <- restored
//! └─────────┘      │ Stone   │            └─────────┘
//!                  │ +Dirt   │ remembers Grass
//!                  └─────────┘
//! ```
//!
//! A block that was never a surface block (deep filler) receives the
//! palette's exposed-default cap when mining uncovers it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Block type tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum BlockKind {
    /// Indestructible floor.
    Bedrock = 1,
    /// Plain stone.
    Stone = 2,
    /// Dirt.
    Dirt = 3,
    /// Sand.
    Sand = 4,
    /// Gravel.
    Gravel = 5,
    /// Volcanic rock.
    Basalt = 6,
    /// Obsidian.
    Obsidian = 7,
    /// Log.
    Wood = 8,
    /// Foliage. Nothing can be placed on it.
    Leaves = 9,
    /// Water. Liquid and a hazard.
    Water = 10,
    /// Lava. Liquid and a hazard.
    Lava = 11,
}

impl BlockKind {
    /// Numeric tag used in mesh vertices.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Liquids flow; you cannot stand or build on them.
    #[inline]
    #[must_use]
    pub const fn is_liquid(self) -> bool {
        matches!(self, Self::Water | Self::Lava)
    }

    /// Hazards make a navigation cell unwalkable.
    #[inline]
    #[must_use]
    pub const fn is_hazard(self) -> bool {
        self.is_liquid()
    }

    /// Whether a new block may be stacked on top of this one.
    #[inline]
    #[must_use]
    pub const fn supports_placement(self) -> bool {
        !self.is_liquid() && !matches!(self, Self::Leaves)
    }

    /// Whether mining can remove this block.
    #[inline]
    #[must_use]
    pub const fn is_breakable(self) -> bool {
        !matches!(self, Self::Bedrock)
    }

    /// Whether a surface cap can grow on this block.
    #[inline]
    #[must_use]
    pub const fn accepts_cap(self) -> bool {
        !self.is_liquid() && !matches!(self, Self::Bedrock | Self::Leaves | Self::Wood)
    }
}

/// Surface covering on top of a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[repr(u8)]
pub enum Cap {
    /// Bare block.
    #[default]
    None = 0,
    /// Grass.
    Grass = 1,
    /// Dirt.
    Dirt = 2,
    /// Snow.
    Snow = 3,
    /// Volcanic ash.
    Ash = 4,
    /// Moss.
    Moss = 5,
}

impl Cap {
    /// Numeric tag used in mesh vertices.
    #[inline]
    #[must_use]
    pub const fn tag(self) -> u32 {
        self as u32
    }

    /// Living caps die when buried.
    #[inline]
    #[must_use]
    pub const fn is_living(self) -> bool {
        matches!(self, Self::Grass | Self::Moss)
    }

    /// The cap a block shows once something is stacked on it.
    #[inline]
    #[must_use]
    pub const fn when_buried(self) -> Self {
        match self {
            Self::Grass | Self::Moss | Self::Dirt => Self::Dirt,
            Self::None | Self::Snow | Self::Ash => Self::None,
        }
    }
}

/// One block inside a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    /// Block type.
    pub kind: BlockKind,
    /// Position in the column, 0 at the bottom.
    pub level: u16,
    /// Current surface covering.
    pub cap: Cap,
    /// Cap this block showed before a placement buried it.
    pub buried_cap: Option<Cap>,
}

impl Block {
    /// Creates an uncapped block.
    #[inline]
    #[must_use]
    pub const fn new(kind: BlockKind, level: u16) -> Self {
        Self {
            kind,
            level,
            cap: Cap::None,
            buried_cap: None,
        }
    }

    /// Creates a block with a surface cap.
    #[inline]
    #[must_use]
    pub const fn capped(kind: BlockKind, level: u16, cap: Cap) -> Self {
        Self {
            kind,
            level,
            cap,
            buried_cap: None,
        }
    }
}

/// A place or mine request against one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "op", content = "kind")]
pub enum ColumnMutation {
    /// Stack a block of this kind on top.
    Place(BlockKind),
    /// Remove the top block.
    Mine,
}

/// Rejected column mutations. A rejected mutation changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColumnError {
    /// The top block cannot support another block.
    #[error("cannot place on top of {0:?}")]
    NotPlaceable(BlockKind),

    /// The column is already at the height limit.
    #[error("column already at max height {max}")]
    HeightLimit {
        /// Maximum column height.
        max: u16,
    },

    /// Nothing left to mine.
    #[error("column is empty")]
    Empty,

    /// The top block is unbreakable.
    #[error("{0:?} cannot be mined")]
    Unbreakable(BlockKind),

    /// Coordinates are outside the world grid.
    #[error("column ({gx}, {gz}) is outside the world grid")]
    OutOfBounds {
        /// Grid X.
        gx: i32,
        /// Grid Z.
        gz: i32,
    },
}

/// Vertical stack of blocks at one grid coordinate, bottom to top.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Column {
    blocks: Vec<Block>,
}

impl Column {
    /// Empty column.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    /// Builds a column from blocks, renumbering levels bottom to top.
    #[must_use]
    pub fn from_blocks(mut blocks: Vec<Block>) -> Self {
        for (level, block) in blocks.iter_mut().enumerate() {
            block.level = level as u16;
        }
        Self { blocks }
    }

    /// Number of blocks, which is the cell height.
    #[inline]
    #[must_use]
    pub fn height(&self) -> u16 {
        self.blocks.len() as u16
    }

    /// True when the column holds no blocks.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Top block, if any.
    #[inline]
    #[must_use]
    pub fn top(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// All blocks, bottom first.
    #[inline]
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Stacks `kind` on top, burying the current top's cap.
    ///
    /// # Errors
    ///
    /// [`ColumnError::HeightLimit`] when the column is full,
    /// [`ColumnError::NotPlaceable`] when the top cannot support a block.
    pub fn place(&mut self, kind: BlockKind, max_height: u16) -> Result<(), ColumnError> {
        if self.height() >= max_height {
            return Err(ColumnError::HeightLimit { max: max_height });
        }
        if let Some(top) = self.blocks.last_mut() {
            if !top.kind.supports_placement() {
                return Err(ColumnError::NotPlaceable(top.kind));
            }
            top.buried_cap = Some(top.cap);
            top.cap = top.cap.when_buried();
        }
        let level = self.height();
        self.blocks.push(Block::new(kind, level));
        Ok(())
    }

    /// Removes the top block and exposes the one below.
    ///
    /// The exposed block gets back the cap it had before it was buried, or
    /// `exposed_default` if it never was a surface block.
    ///
    /// # Errors
    ///
    /// [`ColumnError::Empty`] or [`ColumnError::Unbreakable`].
    pub fn mine(&mut self, exposed_default: Cap) -> Result<Block, ColumnError> {
        let top = self.blocks.last().ok_or(ColumnError::Empty)?;
        if !top.kind.is_breakable() {
            return Err(ColumnError::Unbreakable(top.kind));
        }
        let removed = self.blocks.pop().ok_or(ColumnError::Empty)?;

        if let Some(exposed) = self.blocks.last_mut() {
            match exposed.buried_cap.take() {
                Some(cap) => exposed.cap = cap,
                None if exposed.kind.accepts_cap() && exposed.cap == Cap::None => {
                    exposed.cap = exposed_default;
                }
                None => {}
            }
        }
        Ok(removed)
    }

    /// Replaces the top block's kind, keeping its level. Used for flooding.
    pub(crate) fn replace_top(&mut self, kind: BlockKind) {
        if let Some(top) = self.blocks.last_mut() {
            top.kind = kind;
            top.cap = Cap::None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grass_stone() -> Column {
        Column::from_blocks(vec![Block::capped(BlockKind::Stone, 0, Cap::Grass)])
    }

    #[test]
    fn test_place_buries_living_cap() {
        let mut column = grass_stone();
        column.place(BlockKind::Stone, 16).unwrap();

        assert_eq!(column.height(), 2);
        let below = column.blocks()[0];
        assert_eq!(below.cap, Cap::Dirt);
        assert_eq!(below.buried_cap, Some(Cap::Grass));
        assert_eq!(column.top().unwrap().kind, BlockKind::Stone);
        assert_eq!(column.top().unwrap().level, 1);
    }

    #[test]
    fn test_place_then_mine_restores_exactly() {
        let original = grass_stone();
        let mut column = original.clone();

        column.place(BlockKind::Sand, 16).unwrap();
        let removed = column.mine(Cap::Dirt).unwrap();

        assert_eq!(removed.kind, BlockKind::Sand);
        assert_eq!(column, original);
    }

    #[test]
    fn test_mine_exposes_default_cap_on_filler() {
        let mut column = Column::from_blocks(vec![
            Block::new(BlockKind::Bedrock, 0),
            Block::new(BlockKind::Stone, 0),
            Block::capped(BlockKind::Stone, 0, Cap::Grass),
        ]);

        column.mine(Cap::Dirt).unwrap();
        assert_eq!(column.top().unwrap().cap, Cap::Dirt);

        // Bedrock never takes a cap and cannot be mined.
        column.mine(Cap::Dirt).unwrap();
        assert_eq!(column.top().unwrap().cap, Cap::None);
        assert_eq!(column.mine(Cap::Dirt), Err(ColumnError::Unbreakable(BlockKind::Bedrock)));
        assert_eq!(column.height(), 1);
    }

    #[test]
    fn test_rejections_leave_column_untouched() {
        let mut water = Column::from_blocks(vec![Block::new(BlockKind::Water, 0)]);
        let before = water.clone();
        assert_eq!(
            water.place(BlockKind::Stone, 16),
            Err(ColumnError::NotPlaceable(BlockKind::Water))
        );
        assert_eq!(water, before);

        let mut full = grass_stone();
        assert_eq!(full.place(BlockKind::Stone, 1), Err(ColumnError::HeightLimit { max: 1 }));
        assert_eq!(full, grass_stone());

        let mut empty = Column::new();
        assert_eq!(empty.mine(Cap::Dirt), Err(ColumnError::Empty));
    }

    #[test]
    fn test_mine_last_block_empties_column() {
        let mut column = Column::from_blocks(vec![Block::new(BlockKind::Dirt, 0)]);
        column.mine(Cap::Dirt).unwrap();
        assert!(column.is_empty());
        assert_eq!(column.height(), 0);

        // Empty columns accept placement.
        column.place(BlockKind::Stone, 4).unwrap();
        assert_eq!(column.height(), 1);
    }

    #[test]
    fn test_levels_follow_position() {
        let column = Column::from_blocks(vec![Block::new(BlockKind::Stone, 9); 5]);
        for (i, block) in column.blocks().iter().enumerate() {
            assert_eq!(usize::from(block.level), i);
        }
    }
}
