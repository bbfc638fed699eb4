//! Display-orientation to framebuffer-order remapping.
//!
//! A [`LayoutKind`] is resolved once from the device-info TLV and then
//! applied as a single permutation. Each kind is a fixed sequence of
//! primitive steps (transpose, clockwise rotation, horizontal flip),
//! applied in that order; the inverse walks the inverse steps backwards.

use serde::Serialize;

use crate::device::DeviceProfile;
use crate::error::InkError;
use crate::grid::{IndexGrid, NativeGrid};

// ── LayoutKind ───────────────────────────────────────────────────

/// How a panel's scan order relates to its display orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum LayoutKind {
    /// Scan order already matches the display.
    Identity,
    /// Axes swapped on a panel that also needs rotation; the two
    /// cancel into a plain transpose.
    Swap,
    /// Panel scans columns, starting from the bottom-left corner.
    RotateCW90,
    /// Axes swapped, then mirrored to restore left-to-right order.
    SwapThenFlip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Transpose,
    RotateCw,
    RotateCcw,
    FlipH,
}

impl LayoutKind {
    /// Resolve from the decoded swap/rotate decisions.
    pub fn from_flags(swapped: bool, rotated: bool) -> Self {
        match (swapped, rotated) {
            (false, false) => Self::Identity,
            (false, true) => Self::RotateCW90,
            (true, false) => Self::SwapThenFlip,
            // A rotated known panel reports landscape, so this pair only arises for
            // a portrait report, where the rotation is the swap itself.
            (true, true) => Self::Swap,
        }
    }

    fn steps(self) -> &'static [Step] {
        match self {
            Self::Identity => &[],
            Self::Swap => &[Step::Transpose],
            Self::RotateCW90 => &[Step::RotateCw],
            Self::SwapThenFlip => &[Step::Transpose, Step::FlipH],
        }
    }

    /// Whether framebuffer rows run along display columns.
    pub fn transposes(self) -> bool {
        !matches!(self, Self::Identity)
    }

    /// Framebuffer `(rows, cols)` for a `width × height` display.
    pub fn native_dims(self, width: usize, height: usize) -> (usize, usize) {
        if self.transposes() {
            (width, height)
        } else {
            (height, width)
        }
    }

    /// Permute a display grid into framebuffer order.
    pub fn apply(self, grid: &IndexGrid) -> IndexGrid {
        self.steps()
            .iter()
            .fold(grid.clone(), |g, step| step.apply(&g))
    }

    /// Undo [`apply`](Self::apply).
    pub fn invert(self, grid: &IndexGrid) -> IndexGrid {
        self.steps()
            .iter()
            .rev()
            .fold(grid.clone(), |g, step| step.inverse().apply(&g))
    }
}

impl std::fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Swap => write!(f, "swap"),
            Self::RotateCW90 => write!(f, "rotate-cw90"),
            Self::SwapThenFlip => write!(f, "swap+flip"),
        }
    }
}

impl Step {
    fn inverse(self) -> Self {
        match self {
            Self::Transpose => Self::Transpose,
            Self::RotateCw => Self::RotateCcw,
            Self::RotateCcw => Self::RotateCw,
            Self::FlipH => Self::FlipH,
        }
    }

    fn apply(self, g: &IndexGrid) -> IndexGrid {
        let (rows, cols) = (g.rows(), g.cols());
        match self {
            Self::Transpose => IndexGrid::from_fn(cols, rows, |r, c| g.get(c, r)),
            Self::RotateCw => IndexGrid::from_fn(cols, rows, |r, c| g.get(rows - 1 - c, r)),
            Self::RotateCcw => IndexGrid::from_fn(cols, rows, |r, c| g.get(c, cols - 1 - r)),
            Self::FlipH => IndexGrid::from_fn(rows, cols, |r, c| g.get(r, cols - 1 - c)),
        }
    }
}

// ── Profile-driven entry points ──────────────────────────────────

/// Validate a display grid against `profile` and permute it.
pub fn to_native(grid: &IndexGrid, profile: &DeviceProfile) -> Result<NativeGrid, InkError> {
    if grid.width() != profile.width || grid.height() != profile.height {
        return Err(InkError::DimensionMismatch {
            expected_width: profile.width,
            expected_height: profile.height,
            width: grid.width(),
            height: grid.height(),
        });
    }
    grid.validate(profile.num_colors())?;
    Ok(NativeGrid::from_grid(profile.layout.apply(grid)))
}

/// Recover the display grid from framebuffer order.
pub fn from_native(native: &NativeGrid, profile: &DeviceProfile) -> IndexGrid {
    profile.layout.invert(native.as_grid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> IndexGrid {
        // 2 rows × 3 cols
        IndexGrid::from_rows(vec![vec![0, 1, 2], vec![3, 0, 1]]).unwrap()
    }

    #[test]
    fn identity_is_noop() {
        let g = sample();
        assert_eq!(LayoutKind::Identity.apply(&g), g);
    }

    #[test]
    fn rotate_cw_moves_bottom_left_to_top_left() {
        let r = LayoutKind::RotateCW90.apply(&sample());
        assert_eq!((r.rows(), r.cols()), (3, 2));
        assert_eq!(r.row(0), &[3, 0]);
        assert_eq!(r.row(1), &[0, 1]);
        assert_eq!(r.row(2), &[1, 2]);
    }

    #[test]
    fn swap_is_transpose() {
        let r = LayoutKind::Swap.apply(&sample());
        assert_eq!(r.row(0), &[0, 3]);
        assert_eq!(r.row(2), &[2, 1]);
    }

    #[test]
    fn swap_then_flip_matches_rotation() {
        let g = sample();
        assert_eq!(
            LayoutKind::SwapThenFlip.apply(&g),
            LayoutKind::RotateCW90.apply(&g)
        );
    }

    #[test]
    fn flag_mapping() {
        assert_eq!(LayoutKind::from_flags(false, false), LayoutKind::Identity);
        assert_eq!(LayoutKind::from_flags(false, true), LayoutKind::RotateCW90);
        assert_eq!(LayoutKind::from_flags(true, false), LayoutKind::SwapThenFlip);
        assert_eq!(LayoutKind::from_flags(true, true), LayoutKind::Swap);
        assert_eq!(LayoutKind::RotateCW90.native_dims(296, 128), (296, 128));
        assert_eq!(LayoutKind::Identity.native_dims(400, 300), (300, 400));
    }

    #[test]
    fn to_native_rejects_wrong_size() {
        let profile = DeviceProfile::builtin(400, 300, 2).unwrap();
        let g = IndexGrid::filled(10, 10, 1);
        assert!(matches!(
            to_native(&g, &profile),
            Err(InkError::DimensionMismatch { .. })
        ));
    }

    fn grid_strategy() -> impl Strategy<Value = IndexGrid> {
        (1usize..12, 1usize..12).prop_flat_map(|(rows, cols)| {
            proptest::collection::vec(0u8..4, rows * cols)
                .prop_map(move |cells| IndexGrid::new(rows, cols, cells).unwrap())
        })
    }

    proptest! {
        #[test]
        fn every_layout_inverts(grid in grid_strategy()) {
            for kind in [
                LayoutKind::Identity,
                LayoutKind::Swap,
                LayoutKind::RotateCW90,
                LayoutKind::SwapThenFlip,
            ] {
                let native = kind.apply(&grid);
                prop_assert_eq!(kind.invert(&native), grid.clone());
            }
        }
    }
}
