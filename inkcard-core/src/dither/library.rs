//! RGB-space Floyd-Steinberg through the `image` crate's quantizer.
//!
//! Faster and less accurate than the perceptual driver: nearest colors
//! are chosen by RGB distance and errors are diffused in RGB.

use image::imageops::{self, ColorMap};
use image::{Rgb, RgbImage};

use crate::error::InkError;
use crate::grid::IndexGrid;
use crate::palette::Palette;

/// Adapts a [`Palette`] to the quantizer's color-map interface.
pub struct PaletteMap<'a>(pub &'a Palette);

impl ColorMap for PaletteMap<'_> {
    type Color = Rgb<u8>;

    fn index_of(&self, color: &Rgb<u8>) -> usize {
        self.0.nearest_rgb(color.0) as usize
    }

    fn map_color(&self, color: &mut Rgb<u8>) {
        let index = self.index_of(color);
        if let Some(c) = self.0.colors().get(index) {
            *color = Rgb(c.rgb);
        }
    }
}

/// Quantize `image` to `palette` with the library's ditherer.
pub fn quantize(image: &RgbImage, palette: &Palette) -> Result<IndexGrid, InkError> {
    let map = PaletteMap(palette);
    let mut working = image.clone();
    imageops::dither(&mut working, &map);
    let indexed = imageops::index_colors(&working, &map);
    let (width, height) = indexed.dimensions();
    IndexGrid::new(height as usize, width as usize, indexed.into_raw())
}
