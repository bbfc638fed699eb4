//! Continuous-tone to palette-index reduction.
//!
//! Every perceptual kernel shares one driver: a row-major scan (no
//! serpentine) over an error buffer held in CIELAB. Each pixel takes the
//! palette entry nearest its error-adjusted color, and the remaining
//! error is spread forward through the kernel's weight table. Shares
//! that fall outside the image are dropped.

pub mod kernel;
pub mod library;

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::color::{Lab, srgb_to_lab};
use crate::device::DeviceProfile;
use crate::error::InkError;
use crate::grid::IndexGrid;
use crate::palette::Palette;

use kernel::WeightTable;

// ── DitherKernel ─────────────────────────────────────────────────

/// Selectable dithering strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherKernel {
    /// RGB-space Floyd-Steinberg from the `image` crate.
    #[default]
    Pillow,
    /// Nearest color only.
    None,
    FloydSteinberg,
    Atkinson,
    Jarvis,
    Stucki,
}

impl DitherKernel {
    pub const ALL: [DitherKernel; 6] = [
        Self::Pillow,
        Self::None,
        Self::FloydSteinberg,
        Self::Atkinson,
        Self::Jarvis,
        Self::Stucki,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Pillow => "pillow",
            Self::None => "none",
            Self::FloydSteinberg => "floyd-steinberg",
            Self::Atkinson => "atkinson",
            Self::Jarvis => "jarvis",
            Self::Stucki => "stucki",
        }
    }

    /// Weight table for the perceptual driver; `None` for the library path.
    pub fn weights(self) -> Option<WeightTable> {
        match self {
            Self::Pillow => None,
            Self::None => Some(kernel::NONE),
            Self::FloydSteinberg => Some(kernel::FLOYD_STEINBERG),
            Self::Atkinson => Some(kernel::ATKINSON),
            Self::Jarvis => Some(kernel::JARVIS),
            Self::Stucki => Some(kernel::STUCKI),
        }
    }
}

impl fmt::Display for DitherKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DitherKernel {
    type Err = InkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| InkError::UnknownKernel(s.to_string()))
    }
}

// ── Driver ───────────────────────────────────────────────────────

/// Reduce `image` to indices into `palette`.
///
/// Output is deterministic for a given image, palette and kernel.
pub fn dither(
    image: &RgbImage,
    palette: &Palette,
    kernel: DitherKernel,
) -> Result<IndexGrid, InkError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(InkError::InvalidGrid("image has no pixels"));
    }
    debug!(width, height, colors = palette.len(), %kernel, "dithering");

    match kernel.weights() {
        None => library::quantize(image, palette),
        Some(table) => Ok(diffuse_scan(image, palette, &table)),
    }
}

/// Check `image` against the panel resolution, then dither with its palette.
pub fn dither_for_profile(
    image: &RgbImage,
    profile: &DeviceProfile,
    kernel: DitherKernel,
) -> Result<IndexGrid, InkError> {
    let (width, height) = image.dimensions();
    if width as usize != profile.width || height as usize != profile.height {
        return Err(InkError::DimensionMismatch {
            expected_width: profile.width,
            expected_height: profile.height,
            width: width as usize,
            height: height as usize,
        });
    }
    dither(image, &profile.palette()?, kernel)
}

fn diffuse_scan(image: &RgbImage, palette: &Palette, table: &WeightTable) -> IndexGrid {
    let width = image.width() as usize;
    let height = image.height() as usize;

    let mut buf: Vec<Lab> = image.pixels().map(|p| srgb_to_lab(p.0)).collect();
    let mut cells = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            let current = buf[y * width + x];
            let index = palette.nearest(&current);
            cells.push(index);
            let chosen = palette.colors()[index as usize].lab;
            diffuse(&mut buf, width, height, x, y, current - chosen, table);
        }
    }

    IndexGrid::from_fn(height, width, |r, c| cells[r * width + c])
}

/// Spread `err` from `(x, y)` to its unvisited neighbors.
fn diffuse(
    buf: &mut [Lab],
    width: usize,
    height: usize,
    x: usize,
    y: usize,
    err: Lab,
    table: &WeightTable,
) {
    let divisor = f64::from(table.divisor);
    for tap in table.taps {
        let (Some(nx), Some(ny)) = (x.checked_add_signed(tap.dx), y.checked_add_signed(tap.dy))
        else {
            continue;
        };
        if nx >= width || ny >= height {
            continue;
        }
        buf[ny * width + nx] += err * (f64::from(tap.weight) / divisor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                (x * 255 / width.max(1)) as u8,
                (y * 255 / height.max(1)) as u8,
                ((x + y) * 7 % 256) as u8,
            ])
        })
    }

    #[test]
    fn kernel_names_roundtrip() {
        for k in DitherKernel::ALL {
            assert_eq!(k.name().parse::<DitherKernel>().unwrap(), k);
        }
        assert_eq!(
            "Floyd-Steinberg".parse::<DitherKernel>().unwrap(),
            DitherKernel::FloydSteinberg
        );
        assert!(matches!(
            "bayer".parse::<DitherKernel>(),
            Err(InkError::UnknownKernel(_))
        ));
        assert_eq!(DitherKernel::default(), DitherKernel::Pillow);
    }

    #[test]
    fn uniform_white_is_all_index_one() {
        let img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        let palette = Palette::for_colors(4).unwrap();
        for k in DitherKernel::ALL {
            let grid = dither(&img, &palette, k).unwrap();
            assert_eq!((grid.rows(), grid.cols()), (300, 400));
            assert!(grid.as_slice().iter().all(|&i| i == 1), "kernel {k}");
        }
    }

    #[test]
    fn deterministic_per_kernel() {
        let img = gradient(64, 48);
        let palette = Palette::for_colors(4).unwrap();
        for k in DitherKernel::ALL {
            let a = dither(&img, &palette, k).unwrap();
            let b = dither(&img, &palette, k).unwrap();
            assert_eq!(a, b, "kernel {k}");
            a.validate(4).unwrap();
        }
    }

    #[test]
    fn none_is_plain_nearest_color() {
        let img = gradient(20, 10);
        let palette = Palette::for_colors(2).unwrap();
        let grid = dither(&img, &palette, DitherKernel::None).unwrap();
        for (x, y, p) in img.enumerate_pixels() {
            let expected = palette.nearest(&srgb_to_lab(p.0));
            assert_eq!(grid.get(y as usize, x as usize), expected);
        }
    }

    fn spread_total(table: &WeightTable) -> Lab {
        let (w, h) = (7, 7);
        let mut buf = vec![Lab::ZERO; w * h];
        let err = Lab::new(12.0, -6.0, 3.0);
        diffuse(&mut buf, w, h, 3, 3, err, table);
        buf.iter().fold(Lab::ZERO, |acc, &v| acc + v)
    }

    #[test]
    fn error_conservation() {
        let err = Lab::new(12.0, -6.0, 3.0);
        for table in [kernel::FLOYD_STEINBERG, kernel::JARVIS, kernel::STUCKI] {
            let total = spread_total(&table);
            assert!(total.distance_sq(&err) < 1e-18);
        }
        let atkinson = spread_total(&kernel::ATKINSON);
        assert!(atkinson.distance_sq(&(err * 0.75)) < 1e-18);
        assert_eq!(spread_total(&kernel::NONE), Lab::ZERO);
    }

    #[test]
    fn edge_shares_are_dropped() {
        let mut buf = vec![Lab::ZERO; 4];
        // Bottom-right pixel of a 2x2 image: nothing is left to receive error.
        diffuse(&mut buf, 2, 2, 1, 1, Lab::new(5.0, 5.0, 5.0), &kernel::JARVIS);
        assert!(buf.iter().all(|&v| v == Lab::ZERO));
    }

    fn gray_image(levels: [[u8; 4]; 4]) -> RgbImage {
        RgbImage::from_fn(4, 4, |x, y| {
            let v = levels[y as usize][x as usize];
            Rgb([v, v, v])
        })
    }

    fn rows_of(grid: &IndexGrid) -> Vec<[u8; 4]> {
        (0..grid.rows())
            .map(|r| {
                let mut row = [0u8; 4];
                row.copy_from_slice(grid.row(r));
                row
            })
            .collect()
    }

    #[test]
    fn mid_gray_becomes_even_black_white_mix() {
        let img = gray_image([[119; 4]; 4]);
        let palette = Palette::for_colors(2).unwrap();
        for k in [
            DitherKernel::FloydSteinberg,
            DitherKernel::Atkinson,
            DitherKernel::Jarvis,
            DitherKernel::Stucki,
        ] {
            let grid = dither(&img, &palette, k).unwrap();
            let white = grid.as_slice().iter().filter(|&&i| i == 1).count();
            assert_eq!(white, 8, "kernel {k}");
        }
        let fs = dither(&img, &palette, DitherKernel::FloydSteinberg).unwrap();
        assert_eq!(
            rows_of(&fs),
            vec![[1, 0, 1, 0], [0, 1, 0, 1], [1, 0, 1, 0], [0, 1, 0, 1]]
        );
        let atkinson = dither(&img, &palette, DitherKernel::Atkinson).unwrap();
        assert_eq!(
            rows_of(&atkinson),
            vec![[1, 0, 0, 1], [0, 1, 1, 0], [0, 1, 1, 0], [1, 0, 0, 1]]
        );
    }

    #[test]
    fn golden_scans_on_a_small_ramp() {
        let img = gray_image([
            [0, 85, 170, 255],
            [40, 100, 160, 220],
            [200, 150, 100, 50],
            [119, 119, 119, 119],
        ]);
        let palette = Palette::for_colors(2).unwrap();
        let cases: [(DitherKernel, [[u8; 4]; 4]); 4] = [
            (
                DitherKernel::FloydSteinberg,
                [[0, 0, 1, 1], [0, 1, 0, 1], [1, 1, 0, 0], [0, 1, 0, 1]],
            ),
            (
                DitherKernel::Atkinson,
                [[0, 0, 1, 1], [0, 0, 1, 1], [1, 1, 0, 0], [0, 1, 1, 0]],
            ),
            (
                DitherKernel::Jarvis,
                [[0, 0, 1, 1], [0, 0, 1, 1], [1, 1, 0, 0], [1, 0, 1, 1]],
            ),
            (
                DitherKernel::Stucki,
                [[0, 0, 1, 1], [0, 1, 1, 1], [1, 0, 0, 0], [1, 0, 1, 1]],
            ),
        ];
        for (k, expected) in cases {
            let grid = dither(&img, &palette, k).unwrap();
            assert_eq!(rows_of(&grid), expected.to_vec(), "kernel {k}");
        }
    }

    #[test]
    fn profile_dimension_check() {
        let profile = DeviceProfile::builtin(400, 300, 2).unwrap();
        let img = RgbImage::new(296, 128);
        assert!(matches!(
            dither_for_profile(&img, &profile, DitherKernel::None),
            Err(InkError::DimensionMismatch { .. })
        ));
    }
}
