//! Framebuffer packing, block split, compression and fragmentation.
//!
//! ```text
//! NativeGrid ──pack──► rows of bytes ──split──► Block[rows_per_block]
//!                                                 │ LZO1X-1 (per block)
//!                                                 ▼
//!                                         Fragment[≤250 bytes]
//! ```

pub mod block;
pub mod lzo;
pub mod pack;

pub use block::{Block, BlockAssembler, Fragment, decode_block};
pub use pack::fill_byte;

use bytes::Bytes;
use tracing::debug;

use crate::device::DeviceProfile;
use crate::error::InkError;
use crate::grid::{IndexGrid, NativeGrid};

/// Highest block count addressable by the one-byte block number.
pub const MAX_BLOCKS: usize = 256;

// ── BlockEncoder ─────────────────────────────────────────────────

/// Turns a [`NativeGrid`] into wire-ready blocks for one panel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEncoder {
    bpp: u8,
    rows_per_block: usize,
}

impl BlockEncoder {
    pub fn new(profile: &DeviceProfile) -> Self {
        Self {
            bpp: profile.bpp,
            rows_per_block: profile.rows_per_block,
        }
    }

    pub fn bpp(&self) -> u8 {
        self.bpp
    }

    pub fn rows_per_block(&self) -> usize {
        self.rows_per_block
    }

    /// Pack every native row back to back.
    pub fn pack(&self, native: &NativeGrid) -> Vec<u8> {
        let row_bytes = pack::packed_len(native.cols(), self.bpp);
        let mut out = Vec::with_capacity(row_bytes * native.rows());
        for r in 0..native.rows() {
            pack::pack_row(native.row(r), self.bpp, &mut out);
        }
        out
    }

    /// Pack, split and compress.
    pub fn encode(&self, native: &NativeGrid) -> Result<Vec<Block>, InkError> {
        let packed = Bytes::from(self.pack(native));
        let chunk = self.rows_per_block * pack::packed_len(native.cols(), self.bpp);
        let raw_blocks = packed
            .chunks(chunk)
            .map(|c| packed.slice_ref(c))
            .collect::<Vec<_>>();
        Self::compress_blocks(raw_blocks)
    }

    /// Compress pre-packed block payloads, numbering them in order.
    pub fn compress_blocks(raw_blocks: Vec<Bytes>) -> Result<Vec<Block>, InkError> {
        if raw_blocks.len() > MAX_BLOCKS {
            return Err(InkError::TooLarge(format!(
                "{} blocks (max {MAX_BLOCKS})",
                raw_blocks.len()
            )));
        }
        let blocks: Vec<Block> = raw_blocks
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let block = Block::compress(i as u8, raw);
                debug!(
                    block_no = block.block_no,
                    raw = block.raw_len(),
                    compressed = block.compressed.len(),
                    "block compressed"
                );
                block
            })
            .collect();
        // Fragment counts are checked up front so a transfer never starts
        // with a block it cannot address.
        for block in &blocks {
            block.fragments()?;
        }
        Ok(blocks)
    }

    /// Decompress and unpack a full set of compressed blocks into a
    /// `rows × cols` framebuffer grid.
    pub fn decode(
        &self,
        compressed: &[Bytes],
        rows: usize,
        cols: usize,
    ) -> Result<NativeGrid, InkError> {
        let row_bytes = pack::packed_len(cols, self.bpp);
        let expected_blocks = rows.div_ceil(self.rows_per_block);
        if compressed.len() != expected_blocks {
            return Err(InkError::InvalidGrid("block count does not cover the framebuffer"));
        }

        let mut cells = Vec::with_capacity(rows * cols);
        for (i, data) in compressed.iter().enumerate() {
            let block_rows = (rows - i * self.rows_per_block).min(self.rows_per_block);
            let raw = decode_block(i as u8, data, block_rows * row_bytes)?;
            for row in raw.chunks(row_bytes) {
                pack::unpack_row(row, cols, self.bpp, &mut cells);
            }
        }
        Ok(NativeGrid::from_grid(IndexGrid::new(rows, cols, cells)?))
    }
}

// ── Diagnostics ──────────────────────────────────────────────────

/// Synthetic framebuffer contents for hardware checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPattern {
    /// Every pixel set to one palette index.
    Solid(u8),
    /// Blocks alternate black and white, starting with black.
    Stripe,
}

/// Build blocks straight from fill bytes, bypassing dithering and layout.
pub fn diagnostic_blocks(
    profile: &DeviceProfile,
    pattern: FillPattern,
) -> Result<Vec<Block>, InkError> {
    let byte_for = |index: u8| -> Result<u8, InkError> {
        if index as usize >= profile.num_colors() {
            return Err(InkError::IndexOutOfRange {
                index,
                row: 0,
                col: 0,
                colors: profile.num_colors(),
            });
        }
        Ok(fill_byte(index, profile.bpp))
    };

    let raw = profile
        .block_sizes()
        .into_iter()
        .enumerate()
        .map(|(i, size)| {
            let fill = match pattern {
                FillPattern::Solid(index) => byte_for(index)?,
                FillPattern::Stripe => byte_for(if i % 2 == 0 { 0 } else { 1 })?,
            };
            Ok(Bytes::from(vec![fill; size]))
        })
        .collect::<Result<Vec<_>, InkError>>()?;
    BlockEncoder::compress_blocks(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;

    #[test]
    fn white_400x300_is_fifteen_0x55_blocks() {
        let profile = DeviceProfile::builtin(400, 300, 2).unwrap();
        let grid = IndexGrid::filled(300, 400, 1);
        let native = layout::to_native(&grid, &profile).unwrap();
        let blocks = BlockEncoder::new(&profile).encode(&native).unwrap();
        assert_eq!(blocks.len(), 15);
        for (i, b) in blocks.iter().enumerate() {
            assert_eq!(b.block_no as usize, i);
            assert_eq!(b.raw_len(), 2000);
            assert!(b.raw.iter().all(|&x| x == 0x55));
        }
    }

    #[test]
    fn rotated_panel_has_short_tail_block() {
        let profile = DeviceProfile::builtin(296, 128, 1).unwrap();
        let grid = IndexGrid::filled(128, 296, 0);
        let native = layout::to_native(&grid, &profile).unwrap();
        let blocks = BlockEncoder::new(&profile).encode(&native).unwrap();
        let sizes: Vec<usize> = blocks.iter().map(Block::raw_len).collect();
        assert_eq!(sizes, profile.block_sizes());
    }

    #[test]
    fn encode_decode_roundtrip() {
        let profile = DeviceProfile::builtin(296, 128, 2).unwrap();
        let grid = IndexGrid::from_fn(128, 296, |r, c| ((r * 7 + c * 3) % 4) as u8);
        let native = layout::to_native(&grid, &profile).unwrap();
        let enc = BlockEncoder::new(&profile);
        let blocks = enc.encode(&native).unwrap();
        let compressed: Vec<Bytes> = blocks.iter().map(|b| b.compressed.clone()).collect();
        let back = enc.decode(&compressed, native.rows(), native.cols()).unwrap();
        assert_eq!(back, native);
    }

    #[test]
    fn stripe_alternates() {
        let profile = DeviceProfile::builtin(400, 300, 1).unwrap();
        let blocks = diagnostic_blocks(&profile, FillPattern::Stripe).unwrap();
        assert_eq!(blocks[0].raw[0], 0x00);
        assert_eq!(blocks[1].raw[0], 0xFF);
    }

    #[test]
    fn solid_checks_palette() {
        let mono = DeviceProfile::builtin(400, 300, 1).unwrap();
        assert!(diagnostic_blocks(&mono, FillPattern::Solid(3)).is_err());
        let color = DeviceProfile::builtin(400, 300, 2).unwrap();
        let blocks = diagnostic_blocks(&color, FillPattern::Solid(3)).unwrap();
        assert!(blocks.iter().all(|b| b.raw.iter().all(|&x| x == 0xFF)));
    }
}
