//! LZO1X-1 block codec.
//!
//! The compressor is the classic single-pass `lzo1x_1` scheme: a 14-bit
//! hash of the next four bytes indexes a table of earlier positions, input
//! is processed in 48 KiB chunks and literals are skipped at an
//! accelerating rate when nothing matches. Output is bit-compatible with
//! any conforming LZO1X decoder.
//!
//! The decompressor accepts every LZO1X stream (not only `-1` output) and
//! is bounds-checked: corrupt input yields an [`LzoError`], never a panic.
//!
//! ## Instruction set
//!
//! ```text
//! 0000LLLL               literal run (after a match: 2-byte M1 match)
//! 0001HLLL  D0 D1        M4: distance 16K..48K, EOF when distance is 0
//! 001LLLLL  D0 D1        M3: distance up to 16K
//! LLLDDDSS  HH           M2: length 3..8, distance up to 2K
//! ```
//!
//! The low two bits of the byte before a match's final byte count the
//! literals (0..3) that follow it.

use crate::error::LzoError;

const D_BITS: u32 = 14;
const D_MASK: usize = (1 << D_BITS) - 1;
const CHUNK: usize = 49_152;

const M2_MAX_LEN: usize = 8;
const M2_MAX_OFFSET: usize = 0x0800;
const M3_MAX_OFFSET: usize = 0x4000;
const M3_MAX_LEN: usize = 33;
const M4_MAX_LEN: usize = 9;
const M3_MARKER: u8 = 32;
const M4_MARKER: u8 = 16;

/// End-of-stream marker (an M4 match with distance 0).
pub const EOF_MARKER: [u8; 3] = [M4_MARKER | 1, 0, 0];

// ── Compression ──────────────────────────────────────────────────

/// Compress `input` into a self-contained LZO1X stream.
pub fn compress(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() + input.len() / 16 + 64 + 3);
    let mut dict = vec![0u16; 1 << D_BITS];

    let mut pos = 0;
    let mut remaining = input.len();
    let mut pending = 0;

    while remaining > 20 {
        let len = remaining.min(CHUNK);
        dict.fill(0);
        pending = compress_chunk(input, pos, len, &mut out, pending, &mut dict);
        pos += len;
        remaining -= len;
    }
    pending += remaining;

    if pending > 0 {
        let tail = &input[input.len() - pending..];
        if out.is_empty() && pending <= 238 {
            out.push(17 + pending as u8);
            out.extend_from_slice(tail);
        } else {
            emit_literals(&mut out, tail);
        }
    }

    out.extend_from_slice(&EOF_MARKER);
    out
}

#[inline]
fn read_le32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[inline]
fn dict_index(dv: u32) -> usize {
    (dv.wrapping_mul(0x1824_429d) >> (32 - D_BITS)) as usize & D_MASK
}

/// Append a literal run. Runs of 1..3 bytes ride in the previous match.
fn emit_literals(out: &mut Vec<u8>, lit: &[u8]) {
    let t = lit.len();
    if t == 0 {
        return;
    }
    if t <= 3 {
        let n = out.len();
        out[n - 2] |= t as u8;
    } else if t <= 18 {
        out.push((t - 3) as u8);
    } else {
        let mut tt = t - 18;
        out.push(0);
        while tt > 255 {
            tt -= 255;
            out.push(0);
        }
        out.push(tt as u8);
    }
    out.extend_from_slice(lit);
}

/// Append a length that overflows its instruction's bit field.
fn emit_long_len(out: &mut Vec<u8>, mut len: usize) {
    while len > 255 {
        len -= 255;
        out.push(0);
    }
    out.push(len as u8);
}

/// Compress `input[base..base + len]`, where the `ti` bytes just before
/// `base` are literals not yet written. Returns the literals left over.
fn compress_chunk(
    input: &[u8],
    base: usize,
    len: usize,
    out: &mut Vec<u8>,
    mut ti: usize,
    dict: &mut [u16],
) -> usize {
    let ip_end = base + len - 20;
    let mut ii = base;
    let mut ip = base + if ti < 4 { 4 - ti } else { 0 };

    'literal: loop {
        ip += 1 + ((ip - ii) >> 5);

        loop {
            if ip >= ip_end {
                break 'literal;
            }
            let dv = read_le32(input, ip);
            let slot = dict_index(dv);
            let m_pos = base + dict[slot] as usize;
            dict[slot] = (ip - base) as u16;
            if dv != read_le32(input, m_pos) {
                continue 'literal;
            }

            ii -= ti;
            ti = 0;
            emit_literals(out, &input[ii..ip]);

            let mut m_len = 4;
            if input[ip + m_len] == input[m_pos + m_len] {
                loop {
                    m_len += 1;
                    if ip + m_len >= ip_end || input[ip + m_len] != input[m_pos + m_len] {
                        break;
                    }
                }
            }

            let mut m_off = ip - m_pos;
            ip += m_len;
            ii = ip;

            if m_len <= M2_MAX_LEN && m_off <= M2_MAX_OFFSET {
                m_off -= 1;
                out.push((((m_len - 1) << 5) | ((m_off & 7) << 2)) as u8);
                out.push((m_off >> 3) as u8);
            } else if m_off <= M3_MAX_OFFSET {
                m_off -= 1;
                if m_len <= M3_MAX_LEN {
                    out.push(M3_MARKER | (m_len - 2) as u8);
                } else {
                    out.push(M3_MARKER);
                    emit_long_len(out, m_len - M3_MAX_LEN);
                }
                out.push((m_off << 2) as u8);
                out.push((m_off >> 6) as u8);
            } else {
                m_off -= 0x4000;
                let high = ((m_off >> 11) & 8) as u8;
                if m_len <= M4_MAX_LEN {
                    out.push(M4_MARKER | high | (m_len - 2) as u8);
                } else {
                    out.push(M4_MARKER | high);
                    emit_long_len(out, m_len - M4_MAX_LEN);
                }
                out.push((m_off << 2) as u8);
                out.push((m_off >> 6) as u8);
            }
        }
    }

    base + len - (ii - ti)
}

// ── Decompression ────────────────────────────────────────────────

struct Reader<'a> {
    src: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    #[inline]
    fn byte(&mut self) -> Result<usize, LzoError> {
        let b = *self.src.get(self.pos).ok_or(LzoError::InputOverrun(self.pos))?;
        self.pos += 1;
        Ok(b as usize)
    }

    /// `base` plus 255 per zero byte plus the first non-zero byte.
    fn run_length(&mut self, base: usize) -> Result<usize, LzoError> {
        let mut len = base;
        loop {
            match self.byte()? {
                0 => len += 255,
                b => return Ok(len + b),
            }
        }
    }

    /// Literal count stashed in the byte two positions back.
    fn trailing_state(&self) -> usize {
        self.src
            .get(self.pos.wrapping_sub(2))
            .map_or(0, |b| (b & 3) as usize)
    }
}

fn copy_literals(
    r: &mut Reader<'_>,
    out: &mut Vec<u8>,
    len: usize,
    limit: usize,
) -> Result<(), LzoError> {
    let end = r.pos + len;
    if end > r.src.len() {
        return Err(LzoError::InputOverrun(r.pos));
    }
    if out.len() + len > limit {
        return Err(LzoError::OutputOverrun(limit));
    }
    out.extend_from_slice(&r.src[r.pos..end]);
    r.pos = end;
    Ok(())
}

fn copy_match(
    out: &mut Vec<u8>,
    dist: usize,
    len: usize,
    limit: usize,
    at: usize,
) -> Result<(), LzoError> {
    if dist == 0 || dist > out.len() {
        return Err(LzoError::LookbehindOverrun(at));
    }
    if out.len() + len > limit {
        return Err(LzoError::OutputOverrun(limit));
    }
    let start = out.len() - dist;
    // Byte-wise: source and destination may overlap.
    for i in 0..len {
        let b = out[start + i];
        out.push(b);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Step {
    /// Expecting a literal run or a match.
    Instruction,
    /// A literal run of 4+ bytes just ended.
    AfterLiteralRun,
    /// Decode a match from this instruction byte.
    Match(usize),
    /// Inspect the trailing-literal bits of the last match.
    MatchDone,
    /// Copy 1..3 literals, then the next byte is a match.
    TrailingLiterals(usize),
}

/// Decompress an LZO1X stream that must not produce more than `limit` bytes.
pub fn decompress(src: &[u8], limit: usize) -> Result<Vec<u8>, LzoError> {
    let mut r = Reader { src, pos: 0 };
    let mut out = Vec::with_capacity(limit);

    let mut step = match src.first() {
        Some(&first) if first > 17 => {
            r.pos = 1;
            let t = (first - 17) as usize;
            if t < 4 {
                Step::TrailingLiterals(t)
            } else {
                copy_literals(&mut r, &mut out, t, limit)?;
                Step::AfterLiteralRun
            }
        }
        Some(_) => Step::Instruction,
        None => return Err(LzoError::InputOverrun(0)),
    };

    loop {
        step = match step {
            Step::Instruction => {
                let t = r.byte()?;
                if t >= 16 {
                    Step::Match(t)
                } else {
                    let len = if t == 0 { r.run_length(15)? } else { t };
                    copy_literals(&mut r, &mut out, len + 3, limit)?;
                    Step::AfterLiteralRun
                }
            }
            Step::AfterLiteralRun => {
                let t = r.byte()?;
                if t >= 16 {
                    Step::Match(t)
                } else {
                    let at = r.pos;
                    let dist = 1 + M2_MAX_OFFSET + (t >> 2) + (r.byte()? << 2);
                    copy_match(&mut out, dist, 3, limit, at)?;
                    Step::MatchDone
                }
            }
            Step::Match(t) => {
                let at = r.pos;
                if t >= 64 {
                    let dist = 1 + ((t >> 2) & 7) + (r.byte()? << 3);
                    copy_match(&mut out, dist, (t >> 5) + 1, limit, at)?;
                } else if t >= 32 {
                    let len = match t & 31 {
                        0 => r.run_length(31)?,
                        n => n,
                    };
                    let dist = 1 + (r.byte()? >> 2) + (r.byte()? << 6);
                    copy_match(&mut out, dist, len + 2, limit, at)?;
                } else if t >= 16 {
                    let high = (t & 8) << 11;
                    let len = match t & 7 {
                        0 => r.run_length(7)?,
                        n => n,
                    };
                    let dist = high + (r.byte()? >> 2) + (r.byte()? << 6);
                    if dist == 0 {
                        break;
                    }
                    copy_match(&mut out, dist + 0x4000, len + 2, limit, at)?;
                } else {
                    let dist = 1 + (t >> 2) + (r.byte()? << 2);
                    copy_match(&mut out, dist, 2, limit, at)?;
                }
                Step::MatchDone
            }
            Step::MatchDone => match r.trailing_state() {
                0 => Step::Instruction,
                n => Step::TrailingLiterals(n),
            },
            Step::TrailingLiterals(n) => {
                copy_literals(&mut r, &mut out, n, limit)?;
                Step::Match(r.byte()?)
            }
        };
    }

    if r.pos != src.len() {
        return Err(LzoError::TrailingInput(src.len() - r.pos));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(data: &[u8]) {
        let packed = compress(data);
        let unpacked = decompress(&packed, data.len()).unwrap();
        assert_eq!(unpacked, data);
    }

    #[test]
    fn empty_and_tiny_inputs() {
        assert_eq!(compress(&[]), EOF_MARKER.to_vec());
        assert_eq!(decompress(&EOF_MARKER, 0).unwrap(), Vec::<u8>::new());
        roundtrip(&[7]);
        roundtrip(&[1, 2, 3]);
        roundtrip(b"hello world, short");
    }

    #[test]
    fn short_input_is_one_literal_run() {
        let packed = compress(&[0xAA; 10]);
        assert_eq!(packed[0], 17 + 10);
        assert_eq!(&packed[1..11], &[0xAA; 10]);
        assert_eq!(&packed[11..], &EOF_MARKER);
    }

    #[test]
    fn uniform_block_compresses_well() {
        let data = [0x55u8; 2000];
        let packed = compress(&data);
        assert!(packed.len() < 64, "got {} bytes", packed.len());
        roundtrip(&data);
    }

    #[test]
    fn decodes_reference_stream() {
        // 5 literals, then an M3 match of 1995 bytes at distance 1.
        let stream = [
            0x02, 0x55, 0x55, 0x55, 0x55, 0x55, 0x20, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0xB1, 0x00, 0x00, 0x11, 0x00, 0x00,
        ];
        let out = decompress(&stream, 2000).unwrap();
        assert_eq!(out.len(), 2000);
        assert!(out.iter().all(|&b| b == 0x55));
    }

    #[test]
    fn mixed_content_roundtrips() {
        let mut data = Vec::new();
        for i in 0..6000u32 {
            data.push((i % 7) as u8);
            if i % 97 == 0 {
                data.extend_from_slice(&i.to_le_bytes());
            }
        }
        roundtrip(&data);

        // Pseudo-random, mostly incompressible.
        let mut x = 0x1234_5678u32;
        let noise: Vec<u8> = (0..3000)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect();
        roundtrip(&noise);
    }

    #[test]
    fn spans_multiple_chunks_and_far_matches() {
        let mut data = Vec::with_capacity(120_000);
        let pattern: Vec<u8> = (0..=255u8).collect();
        while data.len() < 120_000 {
            data.extend_from_slice(&pattern);
            data.extend((0..300).map(|i| (i * 31 % 251) as u8));
        }
        roundtrip(&data);
    }

    #[test]
    fn rejects_corrupt_streams() {
        assert_eq!(decompress(&[], 10), Err(LzoError::InputOverrun(0)));
        // Literal run cut short.
        assert!(matches!(
            decompress(&[0x05, 0x01, 0x02], 100),
            Err(LzoError::InputOverrun(_))
        ));
        // Match before any output.
        assert!(matches!(
            decompress(&[0x11, 0x04, 0x00, 0x11, 0x00, 0x00], 100),
            Err(LzoError::LookbehindOverrun(_))
        ));
        // Too much output.
        let packed = compress(&[0u8; 500]);
        assert_eq!(
            decompress(&packed, 100),
            Err(LzoError::OutputOverrun(100))
        );
        // Junk after the end marker.
        let mut packed = compress(&[1, 2, 3, 4]);
        packed.push(0xFF);
        assert_eq!(decompress(&packed, 4), Err(LzoError::TrailingInput(1)));
    }

    proptest! {
        #[test]
        fn arbitrary_bytes_roundtrip(data in prop::collection::vec(any::<u8>(), 0..3000)) {
            let packed = compress(&data);
            prop_assert_eq!(decompress(&packed, data.len()).unwrap(), data);
        }

        #[test]
        fn low_entropy_roundtrip(data in prop::collection::vec(0u8..4, 0..6000)) {
            let packed = compress(&data);
            prop_assert_eq!(decompress(&packed, data.len()).unwrap(), data);
        }
    }
}
