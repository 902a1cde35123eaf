//! PNG preview rendering.

use super::StoreError;
use crate::tile::TileData;
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

/// Number of palette entries. Counts at or above the last index share it.
pub const PALETTE_LEN: usize = 100;

/// Escape-count palette: black for fast convergence, then blue through
/// cyan, green, yellow and orange to red for slow points.
const PALETTE: [[u8; 3]; PALETTE_LEN] = [
    [0, 0, 0],
    [0, 0, 0],
    [0, 0, 255],
    [0, 60, 255],
    [0, 100, 255],
    [0, 125, 255],
    [0, 140, 255],
    [0, 155, 255],
    [0, 170, 255],
    [0, 180, 255],
    [0, 190, 255],
    [0, 200, 255],
    [0, 210, 255],
    [0, 220, 255],
    [0, 225, 255],
    [0, 230, 255],
    [0, 235, 255],
    [0, 238, 255],
    [0, 241, 255],
    [0, 244, 255],
    [0, 247, 255],
    [0, 250, 255],
    [0, 253, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 255],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [0, 255, 0],
    [23, 255, 0],
    [46, 255, 0],
    [70, 255, 0],
    [93, 255, 0],
    [116, 255, 0],
    [139, 255, 0],
    [163, 255, 0],
    [186, 255, 0],
    [209, 255, 0],
    [232, 255, 0],
    [255, 255, 0],
    [255, 237, 0],
    [255, 218, 0],
    [255, 200, 0],
    [255, 181, 0],
    [255, 163, 0],
    [255, 146, 0],
    [255, 128, 0],
    [255, 111, 0],
    [255, 93, 0],
    [255, 76, 0],
    [255, 63, 0],
    [255, 51, 0],
    [255, 42, 0],
    [255, 39, 0],
    [255, 36, 0],
    [255, 33, 0],
    [255, 30, 0],
    [255, 27, 0],
    [255, 24, 0],
    [255, 21, 0],
    [255, 18, 0],
    [255, 15, 0],
    [255, 12, 0],
    [255, 9, 0],
    [255, 6, 0],
    [255, 3, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
    [255, 0, 0],
];

/// Palette colour for an escape count.
#[inline]
pub fn color(count: u16) -> Rgb<u8> {
    Rgb(PALETTE[usize::from(count).min(PALETTE_LEN - 1)])
}

/// Renders counts to an RGB image; buffer row 0 becomes the top row.
pub fn render(data: &TileData) -> RgbImage {
    let width = data.width() as u32;
    let counts = data.counts();
    RgbImage::from_fn(width, width, |x, y| {
        color(counts[(y * width + x) as usize])
    })
}

/// Renders and PNG-encodes a tile.
pub fn encode_png(data: &TileData) -> Result<Vec<u8>, StoreError> {
    let mut bytes = Vec::new();
    render(data)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| StoreError::Preview(e.to_string()))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_endpoints() {
        assert_eq!(color(0), Rgb([0, 0, 0]));
        assert_eq!(color(2), Rgb([0, 0, 255]));
        assert_eq!(color(51), Rgb([255, 255, 0]));
        assert_eq!(color(99), Rgb([255, 0, 0]));
        assert_eq!(color(5000), Rgb([255, 0, 0]));
    }

    #[test]
    fn test_render_layout() {
        let data = TileData::new(2, vec![0, 2, 51, 99]).unwrap();
        let img = render(&data);

        assert_eq!(img.dimensions(), (2, 2));
        assert_eq!(*img.get_pixel(1, 0), Rgb([0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 1), Rgb([255, 255, 0]));
    }

    #[test]
    fn test_encode_png_signature() {
        let data = TileData::new(4, vec![3; 16]).unwrap();
        let png = encode_png(&data).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");

        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .unwrap()
            .to_rgb8();
        assert_eq!(decoded, render(&data));
    }
}
