//! Compressed blocks, their wire fragments, and receiver-side reassembly.

use bytes::{Bytes, BytesMut};

use crate::apdu::{Apdu, FragmentCommand, MAX_FRAGMENT_PAYLOAD};
use crate::encoder::lzo;
use crate::error::InkError;

// ── Block ────────────────────────────────────────────────────────

/// One independently compressed run of framebuffer rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub block_no: u8,
    /// Packed pixel bytes before compression.
    pub raw: Bytes,
    /// LZO1X-1 stream for `raw`.
    pub compressed: Bytes,
}

impl Block {
    /// Compress `raw` into a block.
    pub fn compress(block_no: u8, raw: impl Into<Bytes>) -> Self {
        let raw = raw.into();
        let compressed = Bytes::from(lzo::compress(&raw));
        Self {
            block_no,
            raw,
            compressed,
        }
    }

    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    /// Number of fragments the compressed stream splits into.
    pub fn fragment_count(&self) -> usize {
        self.compressed.len().div_ceil(MAX_FRAGMENT_PAYLOAD).max(1)
    }

    /// Slice the compressed stream into wire-sized fragments.
    ///
    /// Fails if the count does not fit the one-byte fragment number.
    pub fn fragments(&self) -> Result<Vec<Fragment>, InkError> {
        let count = self.fragment_count();
        if count > 256 {
            return Err(InkError::TooLarge(format!(
                "block {} needs {count} fragments (max 256)",
                self.block_no
            )));
        }
        Ok((0..count)
            .map(|i| {
                let start = i * MAX_FRAGMENT_PAYLOAD;
                let end = (start + MAX_FRAGMENT_PAYLOAD).min(self.compressed.len());
                Fragment {
                    block_no: self.block_no,
                    frag_no: i as u8,
                    is_final: i + 1 == count,
                    payload: self.compressed.slice(start..end),
                }
            })
            .collect())
    }
}

// ── Fragment ─────────────────────────────────────────────────────

/// A slice of a block's compressed bytes, at most 250 long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub block_no: u8,
    pub frag_no: u8,
    pub is_final: bool,
    pub payload: Bytes,
}

impl Fragment {
    pub fn to_apdu(&self) -> Apdu {
        Apdu::image_fragment(self.block_no, self.frag_no, &self.payload, self.is_final)
    }
}

impl From<FragmentCommand> for Fragment {
    fn from(cmd: FragmentCommand) -> Self {
        Self {
            block_no: cmd.block_no,
            frag_no: cmd.frag_no,
            is_final: cmd.is_final,
            payload: cmd.payload,
        }
    }
}

// ── Reassembly ───────────────────────────────────────────────────

struct Partial {
    block_no: u8,
    next_frag: u8,
    data: BytesMut,
}

/// Receiver-side fragment reassembly.
///
/// Fragment 0 always opens a block, discarding anything partial; this is
/// what makes resending a block from the start safe. Any other fragment
/// must continue the open block in sequence.
#[derive(Default)]
pub struct BlockAssembler {
    partial: Option<Partial>,
}

impl BlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns the completed compressed block on the
    /// final fragment.
    pub fn push(&mut self, frag: &Fragment) -> Result<Option<(u8, Bytes)>, InkError> {
        if frag.frag_no == 0 {
            self.partial = Some(Partial {
                block_no: frag.block_no,
                next_frag: 0,
                data: BytesMut::new(),
            });
        }

        let partial = match self.partial.as_mut() {
            Some(p) if p.block_no == frag.block_no && p.next_frag == frag.frag_no => p,
            other => {
                let expected = other
                    .map(|p| if p.block_no == frag.block_no { p.next_frag } else { 0 })
                    .unwrap_or(0);
                return Err(InkError::FragmentOutOfSequence {
                    block_no: frag.block_no,
                    frag_no: frag.frag_no,
                    expected,
                });
            }
        };

        partial.data.extend_from_slice(&frag.payload);
        partial.next_frag = partial.next_frag.wrapping_add(1);

        if frag.is_final {
            let done = self.partial.take().map(|p| (p.block_no, p.data.freeze()));
            return Ok(done);
        }
        Ok(None)
    }

    /// Forget a partially received block.
    pub fn reset(&mut self) {
        self.partial = None;
    }

    pub fn in_progress(&self) -> Option<u8> {
        self.partial.as_ref().map(|p| p.block_no)
    }
}

/// Decompress a reassembled block and verify its size.
pub fn decode_block(block_no: u8, compressed: &[u8], expected: usize) -> Result<Vec<u8>, InkError> {
    let raw = lzo::decompress(compressed, expected)
        .map_err(|source| InkError::Decompress { block_no, source })?;
    if raw.len() != expected {
        return Err(InkError::BlockSizeMismatch {
            block_no,
            expected,
            actual: raw.len(),
        });
    }
    Ok(raw)
}
