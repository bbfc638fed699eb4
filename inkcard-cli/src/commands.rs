//! The work behind each subcommand, kept free of printing so it can be
//! tested.

use std::fmt::Write as _;

use clap::ValueEnum;
use image::{Rgb, RgbImage};
use inkcard_core::apdu::{FragmentCommand, parse_hex};
use inkcard_core::encoder::{FillPattern, diagnostic_blocks, lzo, pack};
use inkcard_core::{
    Apdu, Block, BlockEncoder, CommandKind, DeviceInfo, DeviceProfile, DitherKernel,
    ImageSource, IndexGrid, InkError, ProtocolSession, SessionConfig, SimulatedCard,
    TransferReport, encode,
};
use tracing::info;

/// Largest buffer `inspect` will decompress into.
const INSPECT_LIMIT: usize = 64 * 1024;

// ── Panels and patterns ──────────────────────────────────────────

/// Parse `WIDTHxHEIGHTxBPP` into a built-in panel profile.
pub fn parse_panel(panel: &str) -> Result<DeviceProfile, InkError> {
    let parts: Vec<&str> = panel.trim().split(['x', 'X']).collect();
    let [w, h, bpp] = parts[..] else {
        return Err(InkError::InvalidGrid("panel must be WIDTHxHEIGHTxBPP"));
    };
    let parse = |s: &str| {
        s.parse::<usize>()
            .map_err(|_| InkError::InvalidGrid("panel must be WIDTHxHEIGHTxBPP"))
    };
    let bpp = u8::try_from(parse(bpp)?)
        .map_err(|_| InkError::InvalidGrid("bits per pixel out of range"))?;
    DeviceProfile::builtin(parse(w)?, parse(h)?, bpp)
}

/// Synthetic content to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Pattern {
    /// Every pixel one palette index.
    Solid,
    /// Alternate black and white blocks.
    Stripe,
    /// A grey ramp over a red-to-yellow band, dithered with the chosen kernel.
    Gradient,
}

/// Test card image: a horizontal grey ramp with a colour band along the bottom.
pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    let band = height - height / 4;
    RgbImage::from_fn(width, height, |x, y| {
        let t = (x * 255 / width.saturating_sub(1).max(1)) as u8;
        if y >= band {
            Rgb([255, t, 0])
        } else {
            Rgb([t, t, t])
        }
    })
}

pub fn pattern_blocks(
    profile: &DeviceProfile,
    pattern: Pattern,
    index: u8,
    kernel: DitherKernel,
) -> Result<Vec<Block>, InkError> {
    match pattern {
        Pattern::Solid => encode(
            ImageSource::Indices(IndexGrid::filled(profile.height, profile.width, index)),
            profile,
            kernel,
        ),
        Pattern::Stripe => diagnostic_blocks(profile, FillPattern::Stripe),
        Pattern::Gradient => {
            let image = gradient_image(profile.width as u32, profile.height as u32);
            encode(ImageSource::Rgb(&image), profile, kernel)
        }
    }
}

// ── info ─────────────────────────────────────────────────────────

pub fn describe_info(hex: &str, json: bool) -> Result<String, Box<dyn std::error::Error>> {
    let info = DeviceInfo::parse(&parse_hex(hex)?)?;
    if json {
        return Ok(serde_json::to_string_pretty(&info)?);
    }

    let p = &info.profile;
    let mut out = String::new();
    writeln!(out, "serial:        {}", info.serial)?;
    writeln!(out, "panel:         {}x{} {}", p.width, p.height, p.color_mode)?;
    writeln!(out, "bits/pixel:    {}", p.bpp)?;
    writeln!(out, "rows/block:    {}", p.rows_per_block)?;
    writeln!(out, "layout:        {}", p.layout)?;
    writeln!(out, "framebuffer:   {} bytes", p.framebuffer_bytes)?;
    writeln!(out, "blocks:        {} {:?}", p.block_count(), p.block_sizes())?;
    for (tag, value) in &info.tlv {
        let hex: String = value.iter().map(|b| format!("{b:02X}")).collect();
        writeln!(out, "tag {tag:02X}:        {hex}")?;
    }
    Ok(out)
}

// ── encode ───────────────────────────────────────────────────────

/// The APDU sequence a reader would send for `blocks`, one hex line each.
///
/// The reconnect between the last fragment and the refresh trigger is
/// marked with a comment line.
pub fn apdu_script(blocks: &[Block]) -> Result<Vec<String>, InkError> {
    let mut lines = vec![Apdu::authenticate().to_string()];
    for block in blocks {
        for frag in block.fragments()? {
            lines.push(frag.to_apdu().to_string());
        }
    }
    lines.push("# reconnect".to_string());
    lines.push(Apdu::authenticate().to_string());
    lines.push(Apdu::start_refresh().to_string());
    lines.push(Apdu::poll_refresh().to_string());
    Ok(lines)
}

// ── inspect ──────────────────────────────────────────────────────

pub fn inspect_apdu(hex: &str, bpp: u8, cols: usize) -> Result<String, InkError> {
    let apdu = Apdu::parse(&parse_hex(hex)?)?;
    let mut out = String::new();
    let kind = apdu
        .kind()
        .map_or_else(|| "unknown".to_string(), |k| k.to_string());
    push_line(&mut out, format!("command:       {kind}"));

    if apdu.kind() != Some(CommandKind::ImageFragment) {
        push_line(&mut out, format!("data:          {} bytes", apdu.data.len()));
        return Ok(out);
    }

    let frag = FragmentCommand::decode(&apdu)?;
    push_line(&mut out, format!("block:         {}", frag.block_no));
    push_line(&mut out, format!("fragment:      {}", frag.frag_no));
    push_line(&mut out, format!("final:         {}", frag.is_final));
    push_line(&mut out, format!("payload:       {} bytes", frag.payload.len()));

    if frag.frag_no != 0 || !frag.is_final {
        push_line(&mut out, "block spans several fragments; not decompressed".into());
        return Ok(out);
    }

    let raw = lzo::decompress(&frag.payload, INSPECT_LIMIT).map_err(|source| {
        InkError::Decompress {
            block_no: frag.block_no,
            source,
        }
    })?;
    push_line(&mut out, format!("decompressed:  {} bytes", raw.len()));

    let row_bytes = pack::packed_len(cols, bpp);
    if row_bytes > 0 && raw.len() >= row_bytes {
        let mut row = Vec::with_capacity(cols);
        pack::unpack_row(&raw[..row_bytes], cols, bpp, &mut row);
        let mut counts = vec![0usize; 1 << bpp];
        for &i in &row {
            counts[i as usize] += 1;
        }
        push_line(&mut out, format!("rows:          {}", raw.len() / row_bytes));
        push_line(&mut out, format!("first row:     {counts:?} pixels per index"));
    }
    Ok(out)
}

fn push_line(out: &mut String, line: String) {
    out.push_str(&line);
    out.push('\n');
}

// ── simulate ─────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub profile: DeviceProfile,
    pub pattern: Pattern,
    pub index: u8,
    pub kernel: DitherKernel,
    pub busy_polls: u32,
    /// Drop the link when this `(block, fragment)` arrives.
    pub drop_at: Option<(u8, u8)>,
    /// Commands per link before the simulated radio session expires.
    pub command_budget: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub report: TransferReport,
    pub reconnects: u32,
    /// The card's framebuffer matches what was encoded.
    pub verified: bool,
}

/// Run a complete transfer against a simulated card.
pub async fn simulate(
    opts: SimulateOptions,
    config: SessionConfig,
) -> Result<SimulationOutcome, InkError> {
    let mut card = SimulatedCard::new(opts.profile).with_busy_polls(opts.busy_polls);
    if let Some(budget) = opts.command_budget {
        card = card.with_command_budget(budget);
    }
    if let Some((block_no, frag_no)) = opts.drop_at {
        card.inject_disconnect(block_no, frag_no);
    }

    let mut session = ProtocolSession::new(card, config);
    let profile = session.connect().await?.profile.clone();
    let blocks = pattern_blocks(&profile, opts.pattern, opts.index, opts.kernel)?;
    let report = session.run_transfer(&blocks).await?;

    let card = session.into_transport();
    let received = BlockEncoder::new(&profile).pack(&card.native_grid()?);
    let verified = received == concat_raw(&blocks);
    info!(verified, reconnects = card.reconnects(), "simulation finished");

    Ok(SimulationOutcome {
        report,
        reconnects: card.reconnects(),
        verified,
    })
}

/// All uncompressed block bytes, in order.
fn concat_raw(blocks: &[Block]) -> Vec<u8> {
    blocks.iter().flat_map(|b| b.raw.iter().copied()).collect()
}
