//! Error types for tile and patch buffers.

use crate::coord::{PatchAddress, TileAddress};
use thiserror::Error;

/// Errors raised when building, splitting or assembling tile buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Buffer length does not match `width²`
    #[error("Tile buffer holds {actual} values, expected {expected} for width {width}")]
    DataLength {
        width: usize,
        expected: usize,
        actual: usize,
    },

    /// Payload byte length is not a whole number of counts
    #[error("Tile payload has odd length {0}")]
    OddPayload(usize),

    /// Patch width not divisible into equal tiles
    #[error("Patch width {width} is not a positive multiple of {tiles}")]
    PatchWidth { width: usize, tiles: usize },

    /// Tile handed to `assemble` belongs to another patch
    #[error("Tile {tile} is not part of {patch}")]
    ForeignTile {
        tile: TileAddress,
        patch: PatchAddress,
    },

    /// `assemble` is missing a tile or received one twice
    #[error("{patch} needs exactly one tile at index {index}")]
    MissingTile { patch: PatchAddress, index: usize },

    /// Tiles of a patch disagree on width
    #[error("Tiles of {patch} have mixed widths ({expected} and {actual})")]
    MixedWidths {
        patch: PatchAddress,
        expected: usize,
        actual: usize,
    },
}
