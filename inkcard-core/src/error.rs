//! Domain-specific error types for the card pipeline.
//!
//! All fallible operations return `Result<T, InkError>`.
//! Every variant carries enough context (command bytes, block and
//! fragment numbers, raw status word, raw TLV) to reproduce the failure.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::apdu::{CommandKind, StatusWord};

// ── ErrorCategory ────────────────────────────────────────────────

/// Coarse classification used by callers to decide how to recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad caller input, raised before any wire traffic.
    Input,
    /// The card rejected a command with a non-success status word.
    Protocol,
    /// Timeout or disconnect at the transceiver.
    Transport,
    /// Reassembled or decompressed data does not match its expected size.
    Corruption,
    /// The device-info response could not be turned into a profile.
    Detection,
    /// The session was driven out of order, or gave up waiting.
    Session,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Protocol => write!(f, "protocol"),
            Self::Transport => write!(f, "transport"),
            Self::Corruption => write!(f, "corruption"),
            Self::Detection => write!(f, "detection"),
            Self::Session => write!(f, "session"),
        }
    }
}

// ── InkError ─────────────────────────────────────────────────────

/// The canonical error type for the card pipeline.
#[derive(Debug, Error)]
pub enum InkError {
    // ── Input Errors ─────────────────────────────────────────────
    /// The image or grid does not match the device resolution.
    #[error("dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    /// A grid cell holds an index outside the palette.
    #[error("palette index {index} at row {row}, col {col} out of range for {colors} colors")]
    IndexOutOfRange {
        index: u8,
        row: usize,
        col: usize,
        colors: usize,
    },

    /// Only 2- and 4-color palettes exist on these panels.
    #[error("unsupported palette size: {0} (expected 2 or 4)")]
    UnsupportedPalette(usize),

    /// A dither kernel name did not match any known kernel.
    #[error("unknown dither kernel: {0}")]
    UnknownKernel(String),

    /// Grid construction received inconsistent dimensions.
    #[error("invalid grid: {0}")]
    InvalidGrid(&'static str),

    /// The encoded image needs more blocks or fragments than the
    /// one-byte wire counters can address.
    #[error("image too large for the wire: {0}")]
    TooLarge(String),

    /// Raw bytes could not be parsed as a command APDU.
    #[error("malformed apdu: {0}")]
    MalformedApdu(&'static str),

    // ── Protocol Errors ──────────────────────────────────────────
    /// The card answered with a non-success status word.
    #[error("{command} rejected with status {status} (command {apdu})")]
    Protocol {
        command: CommandKind,
        status: StatusWord,
        apdu: HexBytes,
    },

    /// The card answered with success but an unusable body.
    #[error("unexpected response to {command}: {reason} (response {response})")]
    UnexpectedResponse {
        command: CommandKind,
        reason: &'static str,
        response: HexBytes,
    },

    // ── Transport Errors ─────────────────────────────────────────
    /// The transceiver failed outside of a retryable block transfer.
    #[error("{command} failed: {source}")]
    Transport {
        command: CommandKind,
        #[source]
        source: TransportError,
    },

    /// A block failed again after its single retry.
    #[error("block {block_no} fragment {frag_no} failed after retry: {source}")]
    TransferFailed {
        block_no: u8,
        frag_no: u8,
        #[source]
        source: TransportError,
    },

    // ── Corruption Errors ────────────────────────────────────────
    /// A reassembled block decompressed to the wrong number of bytes.
    #[error("block {block_no} corrupt: expected {expected} bytes, got {actual}")]
    BlockSizeMismatch {
        block_no: u8,
        expected: usize,
        actual: usize,
    },

    /// Fragments arrived out of order or after the block was closed.
    #[error("block {block_no} fragment {frag_no} out of sequence (expected {expected})")]
    FragmentOutOfSequence { block_no: u8, frag_no: u8, expected: u8 },

    /// The LZO stream itself is malformed.
    #[error("block {block_no} failed to decompress: {source}")]
    Decompress {
        block_no: u8,
        #[source]
        source: LzoError,
    },

    // ── Detection Errors ─────────────────────────────────────────
    /// The device-info response does not describe a usable panel.
    #[error("device detection failed: {reason} (raw {raw})")]
    Detection { reason: String, raw: HexBytes },

    // ── Session Errors ───────────────────────────────────────────
    /// A session operation was called from the wrong state.
    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),

    /// Refresh polling hit the configured ceiling.
    #[error("refresh still running after {attempts} polls ({elapsed:?})")]
    RefreshTimeout { attempts: u32, elapsed: Duration },
}

impl InkError {
    /// Coarse category used to pick a recovery strategy.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DimensionMismatch { .. }
            | Self::IndexOutOfRange { .. }
            | Self::UnsupportedPalette(_)
            | Self::UnknownKernel(_)
            | Self::InvalidGrid(_)
            | Self::TooLarge(_)
            | Self::MalformedApdu(_) => ErrorCategory::Input,
            Self::Protocol { .. } | Self::UnexpectedResponse { .. } => ErrorCategory::Protocol,
            Self::Transport { .. } | Self::TransferFailed { .. } => ErrorCategory::Transport,
            Self::BlockSizeMismatch { .. }
            | Self::FragmentOutOfSequence { .. }
            | Self::Decompress { .. } => ErrorCategory::Corruption,
            Self::Detection { .. } => ErrorCategory::Detection,
            Self::InvalidTransition(_) | Self::RefreshTimeout { .. } => ErrorCategory::Session,
        }
    }

    /// Build a detection error that keeps the raw response for diagnosis.
    pub fn detection(reason: impl Into<String>, raw: &[u8]) -> Self {
        Self::Detection {
            reason: reason.into(),
            raw: HexBytes::from(raw),
        }
    }
}

// ── TransportError ───────────────────────────────────────────────

/// Failures reported by a [`Transceiver`](crate::session::Transceiver).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No response arrived within the deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// The card left the field or the reader dropped the link.
    #[error("card disconnected")]
    Disconnected,

    /// Any other reader-level failure.
    #[error("reader I/O error: {0}")]
    Io(String),
}

// ── LzoError ─────────────────────────────────────────────────────

/// Malformed LZO1X stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LzoError {
    /// The stream ended in the middle of an instruction.
    #[error("input overrun at offset {0}")]
    InputOverrun(usize),

    /// A match points before the start of the output.
    #[error("lookbehind overrun at offset {0}")]
    LookbehindOverrun(usize),

    /// The output would exceed the expected block size.
    #[error("output overrun (limit {0} bytes)")]
    OutputOverrun(usize),

    /// Bytes remain after the end-of-stream marker.
    #[error("{0} trailing bytes after end marker")]
    TrailingInput(usize),
}

// ── HexBytes ─────────────────────────────────────────────────────

/// Raw bytes that render as uppercase hex in error messages.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct HexBytes(pub Vec<u8>);

impl From<&[u8]> for HexBytes {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HexBytes({self})")
    }
}
