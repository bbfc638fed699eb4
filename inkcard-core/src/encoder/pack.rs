//! Bit-packing of palette indices.
//!
//! Bytes within a row run right to left: byte 0 holds the rightmost
//! group of `8 / bpp` pixels. Inside a byte the group's leftmost pixel
//! sits in the least-significant bits:
//!
//! ```text
//! byte = p0 | p1 << bpp | p2 << 2·bpp | …
//! ```
//!
//! A row whose width is not a multiple of the group size is padded with
//! index 0 on the right.

/// Packed length of a row of `cols` pixels.
pub fn packed_len(cols: usize, bpp: u8) -> usize {
    cols.div_ceil(8 / bpp as usize)
}

/// Pack one row, appending to `out`.
pub fn pack_row(row: &[u8], bpp: u8, out: &mut Vec<u8>) {
    let ppb = 8 / bpp as usize;
    let mask = (1u8 << bpp) - 1;
    let n = packed_len(row.len(), bpp);
    for byte_idx in 0..n {
        let offset = (n - 1 - byte_idx) * ppb;
        let mut byte = 0u8;
        for i in 0..ppb {
            let px = row.get(offset + i).copied().unwrap_or(0) & mask;
            byte |= px << (i * bpp as usize);
        }
        out.push(byte);
    }
}

/// Unpack one row of `cols` pixels from its packed bytes.
pub fn unpack_row(packed: &[u8], cols: usize, bpp: u8, out: &mut Vec<u8>) {
    let ppb = 8 / bpp as usize;
    let mask = (1u8 << bpp) - 1;
    let n = packed.len();
    let start = out.len();
    out.resize(start + n * ppb, 0);
    for (byte_idx, &byte) in packed.iter().enumerate() {
        let offset = (n - 1 - byte_idx) * ppb;
        for i in 0..ppb {
            out[start + offset + i] = (byte >> (i * bpp as usize)) & mask;
        }
    }
    out.truncate(start + cols);
}

/// The byte that fills every pixel of a group with `color_index`.
pub fn fill_byte(color_index: u8, bpp: u8) -> u8 {
    let ppb = 8 / bpp as usize;
    (0..ppb).fold(0u8, |acc, i| acc | (color_index << (i * bpp as usize)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_row_is_0x55() {
        let mut out = Vec::new();
        pack_row(&[1u8; 400], 2, &mut out);
        assert_eq!(out.len(), 100);
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn bytes_run_right_to_left() {
        // Leftmost group 3,0,0,0 ends up in the last byte.
        let row = [3, 0, 0, 0, 0, 0, 0, 2];
        let mut out = Vec::new();
        pack_row(&row, 2, &mut out);
        assert_eq!(out, vec![0b1000_0000, 0b0000_0011]);
    }

    #[test]
    fn one_bit_packing_with_padding() {
        // 10 pixels -> 2 bytes; byte 0 covers pixels 8..16 (two real, six pad).
        let row = [1, 0, 0, 0, 0, 0, 0, 0, 1, 1];
        let mut out = Vec::new();
        pack_row(&row, 1, &mut out);
        assert_eq!(out, vec![0b0000_0011, 0b0000_0001]);

        let mut back = Vec::new();
        unpack_row(&out, 10, 1, &mut back);
        assert_eq!(back, row);
    }

    #[test]
    fn fill_bytes() {
        assert_eq!(fill_byte(0, 2), 0x00);
        assert_eq!(fill_byte(1, 2), 0x55);
        assert_eq!(fill_byte(2, 2), 0xAA);
        assert_eq!(fill_byte(3, 2), 0xFF);
        assert_eq!(fill_byte(1, 1), 0xFF);
    }
}
