//! Patches: `PATCH_TILES × PATCH_TILES` tiles computed in one pass.

use super::{Tile, TileData, TileError};
use crate::coord::{PatchAddress, PATCH_TILES};

/// A computed patch.
///
/// `data` spans the full `PATCH_TILES · tile_width` grid, row-major from
/// the patch's minimum corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    address: PatchAddress,
    data: TileData,
}

impl Patch {
    /// Wraps a patch buffer whose width divides into equal tiles.
    pub fn new(address: PatchAddress, data: TileData) -> Result<Self, TileError> {
        let width = data.width();
        if width == 0 || width % PATCH_TILES != 0 {
            return Err(TileError::PatchWidth {
                width,
                tiles: PATCH_TILES,
            });
        }
        Ok(Self { address, data })
    }

    pub fn address(&self) -> PatchAddress {
        self.address
    }

    pub fn data(&self) -> &TileData {
        &self.data
    }

    /// Width of each constituent tile.
    pub fn tile_width(&self) -> usize {
        self.data.width() / PATCH_TILES
    }

    /// Cuts the patch into its tiles, in index order.
    ///
    /// Tile `i` sits at column `i % N`, row `i / N` of the patch. Its rows
    /// are copied in order from the matching row-aligned slices, so each
    /// tile equals what computing it on its own would produce.
    pub fn split(&self) -> Vec<Tile> {
        let tile_width = self.tile_width();
        let patch_width = self.data.width();
        let counts = self.data.counts();

        (0..PATCH_TILES * PATCH_TILES)
            .map(|index| {
                let column = index % PATCH_TILES;
                let row = index / PATCH_TILES;

                let mut tile = Vec::with_capacity(tile_width * tile_width);
                for y in 0..tile_width {
                    let start = (row * tile_width + y) * patch_width + column * tile_width;
                    tile.extend_from_slice(&counts[start..start + tile_width]);
                }

                Tile {
                    address: self.address.tile(index),
                    data: TileData::from_parts(tile_width, tile),
                }
            })
            .collect()
    }

    /// Reverses [`split`](Self::split).
    ///
    /// `tiles` may arrive in any order but must contain every tile of the
    /// patch exactly once, all of the same width.
    pub fn assemble(address: PatchAddress, tiles: Vec<Tile>) -> Result<Self, TileError> {
        let expected = PATCH_TILES * PATCH_TILES;
        let mut slots: Vec<Option<TileData>> = vec![None; expected];
        let mut tile_width = None;

        for tile in tiles {
            let (owner, index) = tile.address.patch();
            if owner != address {
                return Err(TileError::ForeignTile {
                    tile: tile.address,
                    patch: address,
                });
            }

            let width = tile.data.width();
            match tile_width {
                None => tile_width = Some(width),
                Some(w) if w != width => {
                    return Err(TileError::MixedWidths {
                        patch: address,
                        expected: w,
                        actual: width,
                    })
                }
                Some(_) => {}
            }

            if slots[index].replace(tile.data).is_some() {
                return Err(TileError::MissingTile {
                    patch: address,
                    index,
                });
            }
        }

        let tile_width = tile_width.unwrap_or(0);
        let patch_width = tile_width * PATCH_TILES;
        let mut counts = vec![0; patch_width * patch_width];

        for (index, slot) in slots.into_iter().enumerate() {
            let data = slot.ok_or(TileError::MissingTile {
                patch: address,
                index,
            })?;
            let column = index % PATCH_TILES;
            let row = index / PATCH_TILES;
            for y in 0..tile_width {
                let start = (row * tile_width + y) * patch_width + column * tile_width;
                counts[start..start + tile_width].copy_from_slice(data.row(y));
            }
        }

        Patch::new(address, TileData::new(patch_width, counts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ComputeKernel, EscapeConfig, Iterations};
    use crate::coord::TileAddress;
    use tokio_util::sync::CancellationToken;

    /// Patch whose count encodes its own pixel position.
    fn numbered_patch(tile_width: usize) -> Patch {
        let width = tile_width * PATCH_TILES;
        let counts = (0..width * width).map(|i| i as Iterations).collect();
        Patch::new(
            PatchAddress::new(3, -1, 0).unwrap(),
            TileData::new(width, counts).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_indivisible_width() {
        let address = PatchAddress::new(2, 0, 0).unwrap();
        assert!(matches!(
            Patch::new(address, TileData::zeroed(6)),
            Err(TileError::PatchWidth { width: 6, .. })
        ));
        assert!(Patch::new(address, TileData::zeroed(8)).is_ok());
    }

    #[test]
    fn test_split_addresses() {
        let patch = numbered_patch(2);
        let tiles = patch.split();

        assert_eq!(tiles.len(), PATCH_TILES * PATCH_TILES);
        assert_eq!(tiles[0].address, TileAddress::new(3, -4, 0).unwrap());
        assert_eq!(tiles[5].address, TileAddress::new(3, -3, 1).unwrap());
        assert_eq!(tiles[15].address, TileAddress::new(3, -1, 3).unwrap());
    }

    #[test]
    fn test_split_copies_rows_in_order() {
        let patch = numbered_patch(2);
        let tiles = patch.split();

        // Patch width 8: tile 0 takes pixels 0,1 / 8,9
        assert_eq!(tiles[0].data.counts(), &[0, 1, 8, 9]);
        // tile 1 is one tile to the right
        assert_eq!(tiles[1].data.counts(), &[2, 3, 10, 11]);
        // tile 4 starts the second tile row
        assert_eq!(tiles[4].data.counts(), &[16, 17, 24, 25]);
        assert_eq!(tiles[15].data.counts(), &[54, 55, 62, 63]);
    }

    #[test]
    fn test_split_then_assemble_reproduces_patch() {
        let patch = numbered_patch(3);
        let mut tiles = patch.split();
        tiles.reverse();

        let rebuilt = Patch::assemble(patch.address(), tiles).unwrap();
        assert_eq!(rebuilt, patch);
    }

    #[test]
    fn test_assemble_rejects_foreign_and_missing() {
        let patch = numbered_patch(1);
        let mut tiles = patch.split();
        tiles.pop();
        assert!(matches!(
            Patch::assemble(patch.address(), tiles.clone()),
            Err(TileError::MissingTile { index: 15, .. })
        ));

        tiles.push(Tile::new(
            TileAddress::new(3, 40, 40).unwrap(),
            TileData::zeroed(1),
        ));
        assert!(matches!(
            Patch::assemble(patch.address(), tiles),
            Err(TileError::ForeignTile { .. })
        ));
    }

    #[test]
    fn test_assemble_rejects_duplicates() {
        let patch = numbered_patch(1);
        let mut tiles = patch.split();
        tiles[1] = tiles[0].clone();
        assert!(matches!(
            Patch::assemble(patch.address(), tiles),
            Err(TileError::MissingTile { index: 0, .. })
        ));
    }

    #[test]
    fn test_split_matches_independent_tiles() {
        let kernel = ComputeKernel::new(EscapeConfig::default());
        let cancel = CancellationToken::new();
        let tile_width = 2;
        let address = PatchAddress::new(6, -1, -1).unwrap();

        let counts = kernel
            .compute(
                address.min(),
                address.max(),
                tile_width * PATCH_TILES,
                &cancel,
            )
            .unwrap();
        let patch = Patch::new(
            address,
            TileData::new(tile_width * PATCH_TILES, counts).unwrap(),
        )
        .unwrap();

        for tile in patch.split() {
            let own = kernel
                .compute(tile.address.min(), tile.address.max(), tile_width, &cancel)
                .unwrap();
            assert_eq!(tile.data.counts(), own.as_slice(), "tile {}", tile.address);
        }
    }
}
