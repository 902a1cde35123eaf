//! Coordinate model
//!
//! Maps tile and patch addresses to rectangles of the complex plane and back.
//! Every role derives tile boundaries from these functions, so they are pure
//! and exact: `units(zoom)` is always a power of two, which keeps
//! `x * units` and `floor(re / units)` free of rounding.

mod types;

pub use types::{
    CoordError, PatchAddress, TileAddress, MAX_ZOOM, PATCH_TILES, TILE_WIDTH, TOTAL_UNITS,
};

use num_complex::Complex64;

/// Number of tiles per axis at a zoom level: `2^(zoom + 1)`.
#[inline]
pub fn tile_count(zoom: u8) -> i32 {
    1_i32 << (u32::from(zoom.min(MAX_ZOOM)) + 1)
}

/// Complex-plane extent of one tile per axis at a zoom level.
#[inline]
pub fn units(zoom: u8) -> f64 {
    TOTAL_UNITS / f64::from(tile_count(zoom))
}

/// Pixels per complex-plane unit at a zoom level.
#[inline]
pub fn pixels_per_unit(zoom: u8) -> f64 {
    TILE_WIDTH as f64 / units(zoom)
}

/// Returns the address of the tile containing `point` at `zoom`.
///
/// Points on a tile boundary belong to the tile whose `min` they equal.
///
/// # Errors
///
/// Returns [`CoordError::InvalidZoom`] when `zoom` exceeds [`MAX_ZOOM`].
pub fn address_of(point: Complex64, zoom: u8) -> Result<TileAddress, CoordError> {
    types::check_zoom(zoom)?;
    let units = units(zoom);
    Ok(TileAddress {
        zoom,
        x: (point.re / units).floor() as i32,
        y: (point.im / units).floor() as i32,
    })
}

#[cfg(test)]
mod tests;
