//! Image to wire blocks in one call.

use image::RgbImage;
use tracing::info;

use crate::device::DeviceProfile;
use crate::dither::{DitherKernel, dither_for_profile};
use crate::encoder::{Block, BlockEncoder};
use crate::error::InkError;
use crate::grid::IndexGrid;
use crate::layout;

/// What to put on the panel.
#[derive(Debug, Clone)]
pub enum ImageSource<'a> {
    /// Full-colour pixels, dithered to the panel palette.
    Rgb(&'a RgbImage),
    /// Already-quantized palette indices in display orientation.
    Indices(IndexGrid),
}

/// Dither (if needed), map to the framebuffer layout, pack and compress.
pub fn encode(
    source: ImageSource<'_>,
    profile: &DeviceProfile,
    kernel: DitherKernel,
) -> Result<Vec<Block>, InkError> {
    let grid = match source {
        ImageSource::Rgb(image) => dither_for_profile(image, profile, kernel)?,
        ImageSource::Indices(grid) => grid,
    };
    let native = layout::to_native(&grid, profile)?;
    let blocks = BlockEncoder::new(profile).encode(&native)?;

    let compressed: usize = blocks.iter().map(|b| b.compressed.len()).sum();
    info!(
        profile = %profile,
        blocks = blocks.len(),
        raw_bytes = profile.framebuffer_bytes,
        compressed_bytes = compressed,
        "image encoded"
    );
    Ok(blocks)
}
