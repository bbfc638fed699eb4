//! # inkcard-core
//!
//! Image-to-wire pipeline for battery-less NFC e-ink cards.
//!
//! This crate contains:
//! - **Colour**: sRGB to CIELAB conversion and the fixed panel palettes
//! - **Dither**: error-diffusion kernels reducing an RGB image to palette indices
//! - **Device**: decoding the card's device-info TLV into a `DeviceProfile`
//! - **Layout**: permuting display-order pixels into framebuffer scan order
//! - **Encoder**: bit packing, block splitting, LZO1X-1 and 250-byte fragments
//! - **APDU**: byte-exact command builders and response parsing
//! - **Session**: `ProtocolSession`, the card protocol state machine
//! - **Sim**: `SimulatedCard`, a receiver-side model for tests and dry runs
//! - **Error**: `InkError`, typed, `thiserror`-based error hierarchy

pub mod apdu;
pub mod color;
pub mod device;
pub mod dither;
pub mod encoder;
pub mod error;
pub mod grid;
pub mod layout;
pub mod palette;
pub mod pipeline;
pub mod session;
pub mod sim;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use apdu::{Apdu, CommandKind, Response, StatusWord};
pub use device::{ColorMode, DeviceInfo, DeviceProfile};
pub use dither::{DitherKernel, dither, dither_for_profile};
pub use encoder::{Block, BlockEncoder, Fragment};
pub use error::{ErrorCategory, InkError, TransportError};
pub use grid::{IndexGrid, NativeGrid};
pub use layout::LayoutKind;
pub use palette::Palette;
pub use pipeline::{ImageSource, encode};
pub use session::{
    PollPolicy, ProtocolSession, SessionConfig, SessionState, Transceiver, TransferReport,
    run_transfer,
};
pub use sim::SimulatedCard;
