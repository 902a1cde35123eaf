//! Coordinate type definitions

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Width and height of a rendered tile in pixels.
pub const TILE_WIDTH: usize = 256;

/// Complex-plane extent covered by the whole tile grid on each axis.
///
/// Zoom 0 splits this extent into 2×2 tiles of 512 units each.
pub const TOTAL_UNITS: f64 = 1024.0;

/// Tiles per patch edge. A patch covers `PATCH_TILES × PATCH_TILES` tiles.
pub const PATCH_TILES: usize = 4;

/// Deepest supported zoom level.
///
/// Keeps `tile_count` within `i32` and `units` a normal power of two.
pub const MAX_ZOOM: u8 = 24;

/// Address of a single tile in the quad-tree.
///
/// Tile `(0, 0)` has its lower-left corner on the origin, so the grid of
/// `tile_count(zoom)²` tiles is centered on `0 + 0i` and `x`, `y` span
/// `[-tile_count / 2, tile_count / 2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    /// Zoom level (0-24)
    pub zoom: u8,
    /// Column, real axis
    pub x: i32,
    /// Row, imaginary axis
    pub y: i32,
}

impl TileAddress {
    /// Creates a tile address, validating the zoom level.
    pub fn new(zoom: u8, x: i32, y: i32) -> Result<Self, CoordError> {
        check_zoom(zoom)?;
        Ok(Self { zoom, x, y })
    }

    /// Complex-plane extent of this tile on each axis.
    #[inline]
    pub fn units(&self) -> f64 {
        super::units(self.zoom)
    }

    /// Lower-left corner of the tile.
    #[inline]
    pub fn min(&self) -> Complex64 {
        let units = self.units();
        Complex64::new(f64::from(self.x) * units, f64::from(self.y) * units)
    }

    /// Upper-right corner of the tile.
    #[inline]
    pub fn max(&self) -> Complex64 {
        let units = self.units();
        self.min() + Complex64::new(units, units)
    }

    /// Whether the address lies inside the rendered grid for its zoom.
    pub fn in_bounds(&self) -> bool {
        let half = super::tile_count(self.zoom) / 2;
        (-half..half).contains(&self.x) && (-half..half).contains(&self.y)
    }

    /// The patch containing this tile and the tile's index inside it.
    pub fn patch(&self) -> (PatchAddress, usize) {
        let n = PATCH_TILES as i32;
        let patch = PatchAddress {
            zoom: self.zoom,
            x: self.x.div_euclid(n),
            y: self.y.div_euclid(n),
        };
        let index = self.y.rem_euclid(n) * n + self.x.rem_euclid(n);
        (patch, index as usize)
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Address of a patch: a block of `PATCH_TILES × PATCH_TILES` tiles computed
/// in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchAddress {
    /// Zoom level of the constituent tiles
    pub zoom: u8,
    /// Column on the patch grid
    pub x: i32,
    /// Row on the patch grid
    pub y: i32,
}

impl PatchAddress {
    /// Creates a patch address, validating the zoom level.
    pub fn new(zoom: u8, x: i32, y: i32) -> Result<Self, CoordError> {
        check_zoom(zoom)?;
        Ok(Self { zoom, x, y })
    }

    /// Complex-plane extent of the patch on each axis.
    #[inline]
    pub fn units(&self) -> f64 {
        super::units(self.zoom) * PATCH_TILES as f64
    }

    /// Pixel width of the patch.
    #[inline]
    pub fn width(&self) -> usize {
        TILE_WIDTH * PATCH_TILES
    }

    /// Lower-left corner of the patch.
    #[inline]
    pub fn min(&self) -> Complex64 {
        let units = self.units();
        Complex64::new(f64::from(self.x) * units, f64::from(self.y) * units)
    }

    /// Upper-right corner of the patch.
    #[inline]
    pub fn max(&self) -> Complex64 {
        let units = self.units();
        self.min() + Complex64::new(units, units)
    }

    /// Address of the `index`-th tile, row-major from the lower-left tile.
    #[inline]
    pub fn tile(&self, index: usize) -> TileAddress {
        let n = PATCH_TILES as i32;
        let i = index as i32;
        TileAddress {
            zoom: self.zoom,
            x: self.x * n + i % n,
            y: self.y * n + i / n,
        }
    }

    /// Iterates the `PATCH_TILES²` tiles of this patch in index order.
    pub fn tiles(&self) -> impl Iterator<Item = TileAddress> + '_ {
        (0..PATCH_TILES * PATCH_TILES).map(move |i| self.tile(i))
    }
}

impl fmt::Display for PatchAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "patch {}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordError {
    /// Zoom level is outside valid range (0 to 24)
    #[error("Invalid zoom level: {0} (must be between 0 and {max})", max = MAX_ZOOM)]
    InvalidZoom(u8),
}

pub(super) fn check_zoom(zoom: u8) -> Result<(), CoordError> {
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }
    Ok(())
}
