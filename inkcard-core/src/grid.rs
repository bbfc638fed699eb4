//! Palette-index grids in display and device order.

use crate::error::InkError;

// ── IndexGrid ────────────────────────────────────────────────────

/// A `rows × cols` grid of palette indices in display orientation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexGrid {
    rows: usize,
    cols: usize,
    cells: Vec<u8>,
}

impl IndexGrid {
    /// Wrap row-major `cells`; the length must equal `rows * cols`.
    pub fn new(rows: usize, cols: usize, cells: Vec<u8>) -> Result<Self, InkError> {
        if rows == 0 || cols == 0 {
            return Err(InkError::InvalidGrid("grid must have at least one cell"));
        }
        if cells.len() != rows * cols {
            return Err(InkError::InvalidGrid("cell count does not match rows * cols"));
        }
        Ok(Self { rows, cols, cells })
    }

    /// A grid with every cell set to `index`.
    pub fn filled(rows: usize, cols: usize, index: u8) -> Self {
        Self {
            rows,
            cols,
            cells: vec![index; rows * cols],
        }
    }

    /// Build from nested rows, all of equal length.
    pub fn from_rows(rows: Vec<Vec<u8>>) -> Result<Self, InkError> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(InkError::InvalidGrid("rows have unequal lengths"));
        }
        let n = rows.len();
        Self::new(n, cols, rows.into_iter().flatten().collect())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Width in pixels (columns).
    pub fn width(&self) -> usize {
        self.cols
    }

    /// Height in pixels (rows).
    pub fn height(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[row * self.cols + col]
    }

    pub fn row(&self, row: usize) -> &[u8] {
        &self.cells[row * self.cols..(row + 1) * self.cols]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    /// Check every index is below `colors`.
    pub fn validate(&self, colors: usize) -> Result<(), InkError> {
        match self.cells.iter().position(|&c| c as usize >= colors) {
            None => Ok(()),
            Some(pos) => Err(InkError::IndexOutOfRange {
                index: self.cells[pos],
                row: pos / self.cols,
                col: pos % self.cols,
                colors,
            }),
        }
    }

    /// Build a grid of `rows × cols` by evaluating `f(row, col)`.
    pub(crate) fn from_fn(rows: usize, cols: usize, f: impl Fn(usize, usize) -> u8) -> Self {
        let mut cells = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                cells.push(f(r, c));
            }
        }
        Self { rows, cols, cells }
    }
}

// ── NativeGrid ───────────────────────────────────────────────────

/// An [`IndexGrid`] already permuted into the framebuffer scan order.
///
/// Only [`layout`](crate::layout) produces these, and only the
/// encoder consumes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeGrid(IndexGrid);

impl NativeGrid {
    pub(crate) fn from_grid(grid: IndexGrid) -> Self {
        Self(grid)
    }

    /// Number of framebuffer rows.
    pub fn rows(&self) -> usize {
        self.0.rows
    }

    /// Pixels per framebuffer row.
    pub fn cols(&self) -> usize {
        self.0.cols
    }

    pub fn row(&self, row: usize) -> &[u8] {
        self.0.row(row)
    }

    pub fn as_grid(&self) -> &IndexGrid {
        &self.0
    }

    pub fn into_grid(self) -> IndexGrid {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_checks_length() {
        assert!(IndexGrid::new(2, 3, vec![0; 6]).is_ok());
        assert!(IndexGrid::new(2, 3, vec![0; 5]).is_err());
        assert!(IndexGrid::new(0, 3, vec![]).is_err());
    }

    #[test]
    fn from_rows_and_access() {
        let g = IndexGrid::from_rows(vec![vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        assert_eq!(g.rows(), 2);
        assert_eq!(g.cols(), 3);
        assert_eq!(g.get(1, 0), 4);
        assert_eq!(g.row(0), &[1, 2, 3]);
        assert!(IndexGrid::from_rows(vec![vec![1], vec![1, 2]]).is_err());
    }

    #[test]
    fn validate_reports_position() {
        let g = IndexGrid::from_rows(vec![vec![0, 1], vec![3, 0]]).unwrap();
        assert!(g.validate(4).is_ok());
        match g.validate(2) {
            Err(InkError::IndexOutOfRange { index, row, col, colors }) => {
                assert_eq!((index, row, col, colors), (3, 1, 0, 2));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
