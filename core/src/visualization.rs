use std::{fs, path::Path};

use anyhow::{Context, Result};
use base64::Engine;
use image::{codecs::png::PngEncoder, ColorType, ImageEncoder};

/// Columns used when tiling a batch into a single image.
pub const GRID_COLUMNS: usize = 8;
/// Background pixels between and around tiles.
pub const GRID_PADDING: usize = 2;

/// A grayscale raster with intensities nominally in [0, 1].
#[derive(Clone, Debug, PartialEq)]
pub struct LumaImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<f32>,
}

impl LumaImage {
    pub fn new(width: u32, height: u32, pixels: Vec<f32>) -> Result<Self> {
        if pixels.len() != (width * height) as usize {
            anyhow::bail!(
                "pixel buffer length {} does not match image size {}x{}",
                pixels.len(),
                width,
                height
            );
        }

        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Tile a row-major stack of `tile_width x tile_height` images into a grid.
    ///
    /// Tiles fill `columns` per row and are separated by `padding` black pixels,
    /// with the same border around the whole grid.
    pub fn grid(
        tiles: &[f32],
        tile_width: usize,
        tile_height: usize,
        columns: usize,
        padding: usize,
    ) -> Result<Self> {
        let tile_len = tile_width * tile_height;
        if tile_len == 0 || columns == 0 {
            anyhow::bail!("grid needs non-empty tiles and at least one column");
        }
        if tiles.is_empty() || tiles.len() % tile_len != 0 {
            anyhow::bail!(
                "pixel buffer length {} is not a positive multiple of {}x{}",
                tiles.len(),
                tile_width,
                tile_height
            );
        }

        let count = tiles.len() / tile_len;
        let cols = columns.min(count);
        let rows = count.div_ceil(cols);
        let cell_width = tile_width + padding;
        let cell_height = tile_height + padding;
        let width = cell_width * cols + padding;
        let height = cell_height * rows + padding;

        let mut pixels = vec![0.0; width * height];
        for (index, tile) in tiles.chunks_exact(tile_len).enumerate() {
            let top = (index / cols) * cell_height + padding;
            let left = (index % cols) * cell_width + padding;
            for (row, values) in tile.chunks_exact(tile_width).enumerate() {
                let start = (top + row) * width + left;
                pixels[start..start + tile_width].copy_from_slice(values);
            }
        }

        Self::new(width as u32, height as u32, pixels)
    }

    /// Encode as an 8-bit grayscale PNG, clamping intensities to [0, 1].
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let encoded: Vec<u8> = self
            .pixels
            .iter()
            .map(|&value| (value.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect();

        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(&encoded, self.width, self.height, ColorType::L8)
            .context("failed to encode PNG data")?;
        Ok(buffer)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        let bytes = self.encode_png()?;
        fs::write(path, bytes).with_context(|| format!("failed to write image to {}", path.display()))
    }

    pub fn png_data_url(&self) -> Result<String> {
        let base64 = base64::engine::general_purpose::STANDARD.encode(self.encode_png()?);
        Ok(format!("data:image/png;base64,{base64}"))
    }
}

/// Encode a grayscale image (values in [0, 1]) as a PNG data URL.
pub fn encode_luma_png_data_url(width: u32, height: u32, pixels: &[f32]) -> Result<String> {
    LumaImage::new(width, height, pixels.to_vec())?.png_data_url()
}
