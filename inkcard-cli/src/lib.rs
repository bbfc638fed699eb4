//! # inkcard-cli
//!
//! Command-line front end over `inkcard-core`. No NFC reader is driven
//! from here; every tool works offline or against the simulated card.
//!
//! ## Tools
//!
//! - **info**: decode a device-info response into a panel profile.
//! - **encode**: emit the APDU script for a synthetic image.
//! - **inspect**: decode and decompress one image-fragment APDU.
//! - **simulate**: run a full transfer against `SimulatedCard`.

pub mod commands;
pub mod config;
