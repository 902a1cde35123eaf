//! Tile buffers.

use super::TileError;
use crate::compute::Iterations;
use crate::coord::TileAddress;
use serde::{Deserialize, Serialize};

/// Square grid of escape counts, stored row-major.
///
/// Row 0 is the row at the tile's minimum imaginary part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTileData")]
pub struct TileData {
    width: usize,
    counts: Vec<Iterations>,
}

#[derive(Deserialize)]
struct RawTileData {
    width: usize,
    counts: Vec<Iterations>,
}

impl TryFrom<RawTileData> for TileData {
    type Error = TileError;

    fn try_from(raw: RawTileData) -> Result<Self, Self::Error> {
        TileData::new(raw.width, raw.counts)
    }
}

impl TileData {
    /// Wraps a `width × width` buffer.
    pub fn new(width: usize, counts: Vec<Iterations>) -> Result<Self, TileError> {
        let expected = width * width;
        if counts.len() != expected {
            return Err(TileError::DataLength {
                width,
                expected,
                actual: counts.len(),
            });
        }
        Ok(Self { width, counts })
    }

    /// Wraps a buffer whose length the caller already guarantees.
    pub(crate) fn from_parts(width: usize, counts: Vec<Iterations>) -> Self {
        debug_assert_eq!(counts.len(), width * width);
        Self { width, counts }
    }

    /// An all-zero buffer.
    pub fn zeroed(width: usize) -> Self {
        Self {
            width,
            counts: vec![0; width * width],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn counts(&self) -> &[Iterations] {
        &self.counts
    }

    pub fn into_counts(self) -> Vec<Iterations> {
        self.counts
    }

    /// Count at column `x`, row `y`.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> Option<Iterations> {
        if x >= self.width || y >= self.width {
            return None;
        }
        self.counts.get(y * self.width + x).copied()
    }

    /// Row `y` as a slice.
    pub fn row(&self, y: usize) -> &[Iterations] {
        let start = y * self.width;
        &self.counts[start..start + self.width]
    }

    /// Little-endian payload bytes, two per count.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.counts.len() * 2);
        for count in &self.counts {
            bytes.extend_from_slice(&count.to_le_bytes());
        }
        bytes
    }

    /// Parses a payload written by [`to_le_bytes`](Self::to_le_bytes).
    ///
    /// The width is recovered from the payload length.
    pub fn from_le_bytes(bytes: &[u8]) -> Result<Self, TileError> {
        if bytes.len() % 2 != 0 {
            return Err(TileError::OddPayload(bytes.len()));
        }
        let counts: Vec<Iterations> = bytes
            .chunks_exact(2)
            .map(|pair| Iterations::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let width = (counts.len() as f64).sqrt() as usize;
        Self::new(width, counts)
    }
}

/// A computed tile: its address plus its counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub address: TileAddress,
    pub data: TileData,
}

impl Tile {
    pub fn new(address: TileAddress, data: TileData) -> Self {
        Self { address, data }
    }
}
