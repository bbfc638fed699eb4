//! Device-info decoding and the panel capability profile.
//!
//! The card answers `00D1` with a flat TLV list. Tag `A0` carries the
//! geometry record:
//!
//! ```text
//! [flags, colorMode, rowsPerBlock, heightRawHi, heightRawLo, widthHi, widthLo]
//! ```
//!
//! `heightRaw` counts bit-planes, so the pixel height is `heightRaw / bpp`.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::InkError;
use crate::layout::LayoutKind;
use crate::palette::Palette;

pub const TAG_GEOMETRY: u8 = 0xA0;
pub const TAG_SERIAL: u8 = 0xC0;
pub const TAG_C1: u8 = 0xC1;

// ── ColorMode ────────────────────────────────────────────────────

/// The `colorMode` byte of the A0 record. Only observed values decode.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ColorMode {
    /// Black/white panel.
    Mono = 0x01,
    /// Four-color panel (black, white, yellow, red).
    FourColor = 0x07,
    /// Black/white panel, alternate revision.
    MonoRev = 0x47,
}

impl ColorMode {
    pub fn bits_per_pixel(self) -> u8 {
        match self {
            Self::FourColor => 2,
            Self::Mono | Self::MonoRev => 1,
        }
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ColorMode {
    type Error = InkError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Mono),
            0x07 => Ok(Self::FourColor),
            0x47 => Ok(Self::MonoRev),
            _ => Err(InkError::detection(
                format!("unknown color mode 0x{value:02X}"),
                &[value],
            )),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mono => write!(f, "mono"),
            Self::FourColor => write!(f, "4-color"),
            Self::MonoRev => write!(f, "mono (rev)"),
        }
    }
}

// ── Known panels ─────────────────────────────────────────────────

/// A panel geometry whose scan order has been observed on hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownPanel {
    pub width: usize,
    pub height: usize,
    pub color_mode: ColorMode,
    pub rows_per_block: u8,
    /// Framebuffer is scanned in columns and needs a 90° turn.
    pub rotated: bool,
}

/// Static variant table, keyed by post-swap geometry and depth.
pub const KNOWN_PANELS: [KnownPanel; 4] = [
    KnownPanel {
        width: 400,
        height: 300,
        color_mode: ColorMode::FourColor,
        rows_per_block: 20,
        rotated: false,
    },
    KnownPanel {
        width: 400,
        height: 300,
        color_mode: ColorMode::Mono,
        rows_per_block: 40,
        rotated: false,
    },
    KnownPanel {
        width: 296,
        height: 128,
        color_mode: ColorMode::FourColor,
        rows_per_block: 16,
        rotated: true,
    },
    KnownPanel {
        width: 296,
        height: 128,
        color_mode: ColorMode::Mono,
        rows_per_block: 32,
        rotated: true,
    },
];

fn lookup_panel(width: usize, height: usize, bpp: u8) -> Option<&'static KnownPanel> {
    KNOWN_PANELS.iter().find(|p| {
        p.width == width && p.height == height && p.color_mode.bits_per_pixel() == bpp
    })
}

// ── DeviceProfile ────────────────────────────────────────────────

/// Everything the encoder needs to know about a connected panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceProfile {
    /// Display width in pixels (landscape).
    pub width: usize,
    /// Display height in pixels.
    pub height: usize,
    pub bpp: u8,
    pub rows_per_block: usize,
    pub color_mode: ColorMode,
    /// The raw geometry was portrait and got swapped to landscape.
    pub swapped: bool,
    pub rotated: bool,
    pub flipped: bool,
    pub layout: LayoutKind,
    /// `width * height * bpp / 8`.
    pub framebuffer_bytes: usize,
    /// The A0 record this profile was decoded from.
    #[serde(skip)]
    pub a0: [u8; 7],
}

impl DeviceProfile {
    /// Decode an A0 geometry record.
    pub fn from_a0(a0: &[u8]) -> Result<Self, InkError> {
        if a0.len() < 7 {
            return Err(InkError::detection("A0 record shorter than 7 bytes", a0));
        }
        let record: [u8; 7] = [a0[0], a0[1], a0[2], a0[3], a0[4], a0[5], a0[6]];

        let color_mode = ColorMode::try_from(record[1]).map_err(|_| {
            InkError::detection(format!("unknown color mode 0x{:02X}", record[1]), a0)
        })?;
        let bpp = color_mode.bits_per_pixel();
        let rows_per_block = record[2] as usize;
        let height_raw = u16::from_be_bytes([record[3], record[4]]) as usize;
        let width_raw = u16::from_be_bytes([record[5], record[6]]) as usize;

        if rows_per_block == 0 {
            return Err(InkError::detection("zero rows per block", a0));
        }
        if width_raw == 0 || height_raw == 0 {
            return Err(InkError::detection("zero panel dimension", a0));
        }
        if height_raw % bpp as usize != 0 {
            return Err(InkError::detection(
                format!("height field {height_raw} not divisible by {bpp} bit-planes"),
                a0,
            ));
        }

        // Framebuffer size as the card reports it: heightRaw bit-planes of width bits.
        if (height_raw * width_raw) % 8 != 0 {
            return Err(InkError::detection("framebuffer is not a whole number of bytes", a0));
        }
        let reported_bytes = height_raw * width_raw / 8;

        let mut width = width_raw;
        let mut height = height_raw / bpp as usize;
        let swapped = width < height;
        if swapped {
            std::mem::swap(&mut width, &mut height);
        }

        let rotated = match lookup_panel(width, height, bpp) {
            Some(panel) => panel.rotated,
            None => {
                warn!(width, height, bpp, "unrecognized panel geometry, assuming no rotation");
                false
            }
        };
        let flipped = swapped && !rotated;
        let layout = LayoutKind::from_flags(swapped, rotated);

        // What the encoder will send: framebuffer rows, each padded to a whole byte.
        let (native_rows, native_cols) = layout.native_dims(width, height);
        let packed_bytes = native_rows * (native_cols * bpp as usize).div_ceil(8);
        if packed_bytes != reported_bytes {
            return Err(InkError::detection(
                format!(
                    "framebuffer mismatch: {native_rows} rows of {native_cols} pixels pack to \
                     {packed_bytes} bytes, card reports {reported_bytes}"
                ),
                a0,
            ));
        }

        debug!(width, height, bpp, rows_per_block, %layout, "decoded device profile");

        Ok(Self {
            width,
            height,
            bpp,
            rows_per_block,
            color_mode,
            swapped,
            rotated,
            flipped,
            layout,
            framebuffer_bytes: reported_bytes,
            a0: record,
        })
    }

    /// Profile of a known panel, for offline encoding without a card.
    pub fn builtin(width: usize, height: usize, bpp: u8) -> Result<Self, InkError> {
        let panel = lookup_panel(width, height, bpp).ok_or_else(|| {
            InkError::detection(format!("no built-in panel {width}x{height} at {bpp} bpp"), &[])
        })?;
        Self::from_a0(&panel.a0_record(0x00))
    }

    pub fn num_colors(&self) -> usize {
        1 << self.bpp
    }

    pub fn pixels_per_byte(&self) -> usize {
        8 / self.bpp as usize
    }

    /// Packed bytes per display row.
    pub fn bytes_per_row(&self) -> usize {
        self.width.div_ceil(self.pixels_per_byte())
    }

    /// Framebuffer `(rows, cols)` in scan order.
    pub fn native_dims(&self) -> (usize, usize) {
        self.layout.native_dims(self.width, self.height)
    }

    pub fn native_rows(&self) -> usize {
        self.native_dims().0
    }

    /// Packed bytes per framebuffer row.
    pub fn native_bytes_per_row(&self) -> usize {
        self.native_dims().1.div_ceil(self.pixels_per_byte())
    }

    pub fn block_count(&self) -> usize {
        self.native_rows().div_ceil(self.rows_per_block)
    }

    /// Uncompressed size of every block; only the last may be shorter.
    pub fn block_sizes(&self) -> Vec<usize> {
        let rows = self.native_rows();
        let row_bytes = self.native_bytes_per_row();
        (0..self.block_count())
            .map(|i| {
                let start = i * self.rows_per_block;
                (rows - start).min(self.rows_per_block) * row_bytes
            })
            .collect()
    }

    pub fn palette(&self) -> Result<Palette, InkError> {
        Palette::for_colors(self.num_colors())
    }
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} {} ({} bpp, {} rows/block, {})",
            self.width, self.height, self.color_mode, self.bpp, self.rows_per_block, self.layout
        )
    }
}

impl KnownPanel {
    /// Synthesize the A0 record a card of this type reports.
    pub fn a0_record(&self, flags: u8) -> [u8; 7] {
        let bpp = self.color_mode.bits_per_pixel() as usize;
        let [h_hi, h_lo] = ((self.height * bpp) as u16).to_be_bytes();
        let [w_hi, w_lo] = (self.width as u16).to_be_bytes();
        [
            flags,
            self.color_mode.as_byte(),
            self.rows_per_block,
            h_hi,
            h_lo,
            w_hi,
            w_lo,
        ]
    }
}

// ── TLV ──────────────────────────────────────────────────────────

/// Split a device-info response into tag → value.
///
/// A record whose length runs past the end stops parsing; everything
/// decoded up to that point is kept.
pub fn parse_tlv(data: &[u8]) -> BTreeMap<u8, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut offset = 0;
    while offset + 2 <= data.len() {
        let tag = data[offset];
        let len = data[offset + 1] as usize;
        offset += 2;
        if offset + len > data.len() {
            break;
        }
        out.insert(tag, data[offset..offset + len].to_vec());
        offset += len;
    }
    out
}

// ── DeviceInfo ───────────────────────────────────────────────────

/// A decoded `00D1` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub profile: DeviceProfile,
    pub serial: String,
    pub c1: Option<Vec<u8>>,
    #[serde(skip)]
    pub tlv: BTreeMap<u8, Vec<u8>>,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl DeviceInfo {
    pub fn parse(raw: &[u8]) -> Result<Self, InkError> {
        let tlv = parse_tlv(raw);
        let a0 = match tlv.get(&TAG_GEOMETRY) {
            Some(a0) if a0.len() >= 7 => a0,
            _ => return Err(InkError::detection("missing or short A0 tag", raw)),
        };
        let profile = DeviceProfile::from_a0(a0).map_err(|e| match e {
            // Report the whole response, not just the record.
            InkError::Detection { reason, .. } => InkError::detection(reason, raw),
            other => other,
        })?;
        let serial = tlv
            .get(&TAG_SERIAL)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default();
        let c1 = tlv.get(&TAG_C1).cloned();

        Ok(Self {
            profile,
            serial,
            c1,
            tlv,
            raw: raw.to_vec(),
        })
    }

    /// Build the response body a card with `profile` and `serial` sends.
    pub fn encode_response(profile: &DeviceProfile, serial: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(11 + serial.len());
        out.push(TAG_GEOMETRY);
        out.push(7);
        out.extend_from_slice(&profile.a0);
        if !serial.is_empty() {
            out.push(TAG_SERIAL);
            out.push(serial.len().min(255) as u8);
            out.extend_from_slice(&serial.as_bytes()[..serial.len().min(255)]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apdu::parse_hex;

    const SAMPLE: &str = "a007f0012000800128a10700120030ffffffb1012eb20114b30100\
                          c00a53454141303030323832c10422ab5052d10701200000000000";

    #[test]
    fn parses_real_mono_card() {
        let raw = parse_hex(SAMPLE).unwrap();
        let info = DeviceInfo::parse(&raw).unwrap();
        let p = &info.profile;
        assert_eq!((p.width, p.height), (296, 128));
        assert_eq!(p.bpp, 1);
        assert_eq!(p.rows_per_block, 32);
        assert_eq!(p.color_mode, ColorMode::Mono);
        assert!(p.rotated);
        assert!(!p.swapped);
        assert_eq!(p.layout, LayoutKind::RotateCW90);
        assert_eq!(p.framebuffer_bytes, 296 * 128 / 8);
        assert_eq!(info.serial, "SEAA000282");
        assert_eq!(info.c1.as_deref(), Some(&[0x22, 0xAB, 0x50, 0x52][..]));
        assert_eq!(info.tlv.len(), 8);
    }

    #[test]
    fn four_color_400x300() {
        let p = DeviceProfile::from_a0(&[0x00, 0x07, 0x14, 0x02, 0x58, 0x01, 0x90]).unwrap();
        assert_eq!((p.width, p.height, p.bpp), (400, 300, 2));
        assert!(!p.swapped && !p.rotated && !p.flipped);
        assert_eq!(p.layout, LayoutKind::Identity);
        assert_eq!(p.framebuffer_bytes, 30_000);
        assert_eq!(p.block_count(), 15);
        assert!(p.block_sizes().iter().all(|&s| s == 2000));
    }

    #[test]
    fn portrait_geometry_is_swapped_and_flipped() {
        // 300 wide, 400 tall (heightRaw 800 at 2 bpp), not a rotated panel.
        let p = DeviceProfile::from_a0(&[0x00, 0x07, 0x14, 0x03, 0x20, 0x01, 0x2C]).unwrap();
        assert_eq!((p.width, p.height), (400, 300));
        assert!(p.swapped);
        assert!(!p.rotated);
        assert!(p.flipped);
        assert_eq!(p.layout, LayoutKind::SwapThenFlip);
    }

    #[test]
    fn unknown_color_mode_is_detection_error() {
        let err = DeviceProfile::from_a0(&[0x00, 0x03, 0x14, 0x01, 0x2C, 0x01, 0x90]).unwrap_err();
        assert!(matches!(err, InkError::Detection { .. }));
        assert!(err.to_string().contains("0x03"));
    }

    #[test]
    fn padded_rows_fail_framebuffer_check() {
        // 13 x 8 mono: the card holds 13 bytes, padded rows would need 16.
        let err = DeviceProfile::from_a0(&[0x00, 0x01, 0x08, 0x00, 0x08, 0x00, 0x0D]).unwrap_err();
        assert!(err.to_string().contains("framebuffer mismatch"));
        assert!(err.to_string().contains("16 bytes"));

        // Portrait 4 x 16 mono swaps to 16 rows of 4 pixels, one padded byte each.
        let err = DeviceProfile::from_a0(&[0x00, 0x01, 0x08, 0x00, 0x10, 0x00, 0x04]).unwrap_err();
        assert!(err.to_string().contains("framebuffer mismatch"));
    }

    #[test]
    fn known_panels_pass_framebuffer_check() {
        for panel in KNOWN_PANELS {
            let p = DeviceProfile::from_a0(&panel.a0_record(0x00)).unwrap();
            assert_eq!(p.block_sizes().iter().sum::<usize>(), p.framebuffer_bytes);
        }
    }

    #[test]
    fn odd_height_field_is_detection_error() {
        let err = DeviceProfile::from_a0(&[0x00, 0x07, 0x14, 0x02, 0x59, 0x01, 0x90]).unwrap_err();
        assert!(matches!(err, InkError::Detection { .. }));
    }

    #[test]
    fn missing_a0_is_detection_error() {
        let raw = parse_hex("c00a53454141303030323832").unwrap();
        let err = DeviceInfo::parse(&raw).unwrap_err();
        assert!(err.to_string().contains("C00A"));
    }

    #[test]
    fn truncated_tlv_keeps_prefix() {
        let tlv = parse_tlv(&[0xB1, 0x01, 0x2E, 0xC0, 0x05, 0x41]);
        assert_eq!(tlv.len(), 1);
        assert_eq!(tlv[&0xB1], vec![0x2E]);
    }

    #[test]
    fn rotated_block_sizes() {
        let p = DeviceProfile::builtin(296, 128, 1).unwrap();
        assert_eq!(p.native_dims(), (296, 128));
        assert_eq!(p.native_bytes_per_row(), 16);
        let sizes = p.block_sizes();
        assert_eq!(sizes.len(), 10);
        assert!(sizes[..9].iter().all(|&s| s == 512));
        assert_eq!(sizes[9], 128);
        assert_eq!(sizes.iter().sum::<usize>(), p.framebuffer_bytes);
    }

    #[test]
    fn response_roundtrip() {
        for panel in KNOWN_PANELS {
            let profile = DeviceProfile::from_a0(&panel.a0_record(0xF0)).unwrap();
            assert_eq!(profile.rotated, panel.rotated);
            let raw = DeviceInfo::encode_response(&profile, "SIM0001");
            let info = DeviceInfo::parse(&raw).unwrap();
            assert_eq!(info.profile, profile);
            assert_eq!(info.serial, "SIM0001");
        }
    }
}
