//! Tests for the coordinate model

use super::*;

#[test]
fn test_tile_count_doubles_per_zoom() {
    assert_eq!(tile_count(0), 2);
    assert_eq!(tile_count(1), 4);
    assert_eq!(tile_count(9), 1024);
}

#[test]
fn test_units_at_zoom_zero() {
    assert_eq!(units(0), 512.0);
    assert_eq!(units(1), 256.0);
    assert_eq!(pixels_per_unit(0), 0.5);
}

#[test]
fn test_origin_tile_starts_at_origin() {
    let tile = TileAddress::new(0, 0, 0).unwrap();
    assert_eq!(tile.min(), Complex64::new(0.0, 0.0));
    assert_eq!(tile.max(), Complex64::new(512.0, 512.0));
}

#[test]
fn test_negative_tile_corners() {
    let tile = TileAddress::new(3, -2, -5).unwrap();
    let units = units(3);
    assert_eq!(tile.min(), Complex64::new(-2.0 * units, -5.0 * units));
    assert_eq!(tile.max(), Complex64::new(-units, -4.0 * units));
}

#[test]
fn test_span_equals_units_on_both_axes() {
    for zoom in [0, 1, 7, 15, MAX_ZOOM] {
        let half = tile_count(zoom) / 2;
        for (x, y) in [(-half, -half), (0, 0), (half - 1, half - 1), (-1, 3)] {
            let tile = TileAddress::new(zoom, x, y).unwrap();
            let span = tile.max() - tile.min();
            assert_eq!(span, Complex64::new(units(zoom), units(zoom)));
        }
    }
}

#[test]
fn test_address_of_min_roundtrips() {
    for zoom in [0, 2, 5, 11, 20, MAX_ZOOM] {
        let half = tile_count(zoom) / 2;
        for (x, y) in [(-half, -half), (-half, half - 1), (0, 0), (-1, -1), (half - 1, 0)] {
            let tile = TileAddress::new(zoom, x, y).unwrap();
            assert_eq!(
                address_of(tile.min(), zoom).unwrap(),
                tile,
                "zoom {} tile {}",
                zoom,
                tile
            );
        }
    }
}

#[test]
fn test_address_of_interior_point() {
    // 700 + -10i at zoom 0 lies in tile (1, -1)
    let tile = address_of(Complex64::new(700.0, -10.0), 0).unwrap();
    assert_eq!((tile.x, tile.y), (1, -1));
}

#[test]
fn test_invalid_zoom() {
    assert!(matches!(
        TileAddress::new(MAX_ZOOM + 1, 0, 0),
        Err(CoordError::InvalidZoom(_))
    ));
    assert!(matches!(
        address_of(Complex64::new(0.0, 0.0), 200),
        Err(CoordError::InvalidZoom(200))
    ));
}

#[test]
fn test_in_bounds() {
    assert!(TileAddress::new(0, -1, -1).unwrap().in_bounds());
    assert!(TileAddress::new(0, 0, 0).unwrap().in_bounds());
    assert!(!TileAddress::new(0, 1, 0).unwrap().in_bounds());
    assert!(!TileAddress::new(0, 0, -2).unwrap().in_bounds());
}

#[test]
fn test_patch_tiles_row_major() {
    let patch = PatchAddress::new(4, -1, 2).unwrap();
    let tiles: Vec<_> = patch.tiles().collect();

    assert_eq!(tiles.len(), PATCH_TILES * PATCH_TILES);
    assert_eq!((tiles[0].x, tiles[0].y), (-4, 8));
    assert_eq!((tiles[1].x, tiles[1].y), (-3, 8));
    assert_eq!((tiles[4].x, tiles[4].y), (-4, 9));
    assert_eq!((tiles[15].x, tiles[15].y), (-1, 11));
}

#[test]
fn test_patch_corners_match_tiles() {
    let patch = PatchAddress::new(6, 3, -2).unwrap();
    assert_eq!(patch.min(), patch.tile(0).min());
    assert_eq!(patch.max(), patch.tile(PATCH_TILES * PATCH_TILES - 1).max());
    assert_eq!(patch.width(), TILE_WIDTH * PATCH_TILES);
}

#[test]
fn test_tile_patch_inverse() {
    let patch = PatchAddress::new(5, -3, 1).unwrap();
    for (i, tile) in patch.tiles().enumerate() {
        assert_eq!(tile.patch(), (patch, i));
    }
}

#[test]
fn test_display() {
    let tile = TileAddress::new(3, -1, 2).unwrap();
    assert_eq!(tile.to_string(), "3/-1/2");
    assert_eq!(PatchAddress::new(3, 0, 1).unwrap().to_string(), "patch 3/0/1");
}

mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// A zoom level and an in-grid tile column and row.
    fn grid_tile() -> impl Strategy<Value = TileAddress> {
        (0..=MAX_ZOOM).prop_flat_map(|zoom| {
            let half = tile_count(zoom) / 2;
            (-half..half, -half..half).prop_map(move |(x, y)| TileAddress { zoom, x, y })
        })
    }

    proptest! {
        /// A tile's lower-left corner maps back to the tile itself.
        #[test]
        fn address_of_min_is_identity(tile in grid_tile()) {
            prop_assert!(tile.in_bounds());
            prop_assert_eq!(address_of(tile.min(), tile.zoom).unwrap(), tile);
        }

        /// Every point strictly inside a tile maps to that tile.
        #[test]
        fn interior_points_map_to_tile(tile in grid_tile(), fx in 0.0f64..0.99, fy in 0.0f64..0.99) {
            let units = tile.units();
            let point = tile.min() + Complex64::new(fx * units, fy * units);
            prop_assert_eq!(address_of(point, tile.zoom).unwrap(), tile);
        }

        /// `patch` and `PatchAddress::tile` are inverse.
        #[test]
        fn patch_index_roundtrips(tile in grid_tile()) {
            let (patch, index) = tile.patch();
            prop_assert!(index < PATCH_TILES * PATCH_TILES);
            prop_assert_eq!(patch.tile(index), tile);
        }
    }
}
