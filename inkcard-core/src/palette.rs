//! Displayable colors for each color depth.
//!
//! Index order is the wire-level color code and never changes:
//! 2-color panels use black/white, 4-color panels add yellow and red.

use crate::color::{Lab, srgb_to_lab};
use crate::error::InkError;

/// Black, white, yellow, red.
pub const FOUR_COLOR_RGB: [[u8; 3]; 4] = [[0, 0, 0], [255, 255, 255], [255, 255, 0], [255, 0, 0]];

/// Black, white.
pub const TWO_COLOR_RGB: [[u8; 3]; 2] = [[0, 0, 0], [255, 255, 255]];

/// One palette entry with its precomputed perceptual coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaletteColor {
    pub rgb: [u8; 3],
    pub lab: Lab,
}

/// An ordered 2- or 4-entry palette.
#[derive(Debug, Clone, PartialEq)]
pub struct Palette {
    colors: Vec<PaletteColor>,
}

impl Palette {
    /// The built-in palette for a panel with `colors` colors.
    pub fn for_colors(colors: usize) -> Result<Self, InkError> {
        match colors {
            2 => Self::from_rgb(&TWO_COLOR_RGB),
            4 => Self::from_rgb(&FOUR_COLOR_RGB),
            n => Err(InkError::UnsupportedPalette(n)),
        }
    }

    /// A caller-supplied palette, e.g. colors measured off a real panel.
    ///
    /// Entry `i` is sent on the wire as index `i`.
    pub fn from_rgb(rgb: &[[u8; 3]]) -> Result<Self, InkError> {
        if rgb.len() != 2 && rgb.len() != 4 {
            return Err(InkError::UnsupportedPalette(rgb.len()));
        }
        Ok(Self {
            colors: rgb
                .iter()
                .map(|&rgb| PaletteColor {
                    rgb,
                    lab: srgb_to_lab(rgb),
                })
                .collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[PaletteColor] {
        &self.colors
    }

    pub fn rgb(&self, index: u8) -> Option<[u8; 3]> {
        self.colors.get(index as usize).map(|c| c.rgb)
    }

    /// Index of the entry closest to `lab`. Ties go to the lowest index.
    pub fn nearest(&self, lab: &Lab) -> u8 {
        let mut best = 0usize;
        let mut best_dist = f64::INFINITY;
        for (i, c) in self.colors.iter().enumerate() {
            let d = c.lab.distance_sq(lab);
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        best as u8
    }

    /// Nearest entry by squared distance in encoded RGB.
    pub fn nearest_rgb(&self, rgb: [u8; 3]) -> u8 {
        let mut best = 0usize;
        let mut best_dist = i32::MAX;
        for (i, c) in self.colors.iter().enumerate() {
            let d: i32 = (0..3)
                .map(|k| {
                    let diff = i32::from(rgb[k]) - i32::from(c.rgb[k]);
                    diff * diff
                })
                .sum();
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        best as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_palettes() {
        let p4 = Palette::for_colors(4).unwrap();
        assert_eq!(p4.len(), 4);
        assert_eq!(p4.rgb(0), Some([0, 0, 0]));
        assert_eq!(p4.rgb(1), Some([255, 255, 255]));
        assert_eq!(p4.rgb(2), Some([255, 255, 0]));
        assert_eq!(p4.rgb(3), Some([255, 0, 0]));

        let p2 = Palette::for_colors(2).unwrap();
        assert_eq!(p2.len(), 2);
        assert_eq!(p2.rgb(2), None);
    }

    #[test]
    fn rejects_other_sizes() {
        assert!(matches!(
            Palette::for_colors(3),
            Err(InkError::UnsupportedPalette(3))
        ));
        assert!(Palette::from_rgb(&[[1, 2, 3]]).is_err());
    }

    #[test]
    fn nearest_exact_colors() {
        let p = Palette::for_colors(4).unwrap();
        for (i, rgb) in FOUR_COLOR_RGB.iter().enumerate() {
            assert_eq!(p.nearest(&srgb_to_lab(*rgb)) as usize, i);
            assert_eq!(p.nearest_rgb(*rgb) as usize, i);
        }
    }

    #[test]
    fn ties_prefer_lowest_index() {
        let p = Palette::from_rgb(&[[10, 10, 10], [10, 10, 10]]).unwrap();
        assert_eq!(p.nearest(&srgb_to_lab([10, 10, 10])), 0);
        assert_eq!(p.nearest_rgb([200, 200, 200]), 0);
    }

    #[test]
    fn red_on_two_colors_is_black_or_white() {
        let p = Palette::for_colors(2).unwrap();
        let idx = p.nearest(&srgb_to_lab([255, 0, 0]));
        assert!(idx < 2);
    }
}
