//! Sweep planning for the request role.
//!
//! A sweep visits every address of a square region at one zoom level. The
//! full region is the whole grid, `[-n/2, n/2)` on both axes for a grid of
//! `n` cells per axis. The core region is `[-l, l)` with
//! `l = clamp(n / (zoom + 2), 1, n/2)`, which keeps deep zooms focused on
//! the structure around the origin.
//!
//! Patch sweeps walk the coarser patch grid (`n / PATCH_TILES` cells per
//! axis). The patch grid only lines up with the tile grid once it has an
//! even number of cells per axis; below that zoom a patch sweep falls back
//! to single tiles.

use crate::coord::{tile_count, PatchAddress, TileAddress, PATCH_TILES};
use crate::messages::GenerateRequest;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// What one request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SweepUnit {
    #[default]
    Tile,
    /// `PATCH_TILES × PATCH_TILES` tiles per request
    Patch,
}

impl SweepUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepUnit::Tile => "tile",
            SweepUnit::Patch => "patch",
        }
    }
}

impl fmt::Display for SweepUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SweepUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tile" | "tiles" => Ok(SweepUnit::Tile),
            "patch" | "patches" => Ok(SweepUnit::Patch),
            other => Err(format!("unknown unit '{}' (expected tile or patch)", other)),
        }
    }
}

/// Half-open index range covered on each axis of a grid with `cells` cells.
pub fn sweep_range(cells: i32, zoom: u8, core_only: bool) -> Range<i32> {
    let half = cells / 2;
    if !core_only || half == 0 {
        return -half..half;
    }
    let limit = (cells / (i32::from(zoom) + 2)).clamp(1, half);
    -limit..limit
}

/// Whether a patch sweep is possible at `zoom`.
pub fn patch_grid_aligned(zoom: u8) -> bool {
    tile_count(zoom) >= 2 * PATCH_TILES as i32
}

/// Requests of one zoom level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoomPlan {
    pub zoom: u8,
    /// Unit actually used, after any fallback to tiles
    pub unit: SweepUnit,
    pub range: Range<i32>,
}

impl ZoomPlan {
    /// Plans the sweep of one zoom level.
    pub fn new(zoom: u8, unit: SweepUnit, core_only: bool) -> Self {
        let unit = match unit {
            SweepUnit::Patch if patch_grid_aligned(zoom) => SweepUnit::Patch,
            _ => SweepUnit::Tile,
        };
        let cells = match unit {
            SweepUnit::Tile => tile_count(zoom),
            SweepUnit::Patch => tile_count(zoom) / PATCH_TILES as i32,
        };
        Self {
            zoom,
            unit,
            range: sweep_range(cells, zoom, core_only),
        }
    }

    /// Number of requests the plan produces.
    pub fn len(&self) -> usize {
        let side = self.range.len();
        side * side
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    /// Requests row by row, lowest `y` first.
    pub fn requests(&self) -> impl Iterator<Item = GenerateRequest> + '_ {
        let zoom = self.zoom;
        let unit = self.unit;
        self.range.clone().flat_map(move |y| {
            self.range.clone().map(move |x| match unit {
                SweepUnit::Tile => GenerateRequest::tile(TileAddress { zoom, x, y }),
                SweepUnit::Patch => GenerateRequest::patch(PatchAddress { zoom, x, y }),
            })
        })
    }
}
