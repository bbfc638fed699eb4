//! `inkcard` entry point.
//!
//! ```text
//! inkcard info <HEX> [--json]        Decode a device-info response
//! inkcard encode [--pattern ...]     Print the APDU script for a test image
//! inkcard inspect <HEX>              Decode one image-fragment APDU
//! inkcard simulate [--drop B:F]      Full transfer against a simulated card
//! inkcard --config <path>            Load a custom config TOML
//! inkcard --gen-config               Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use inkcard_core::DitherKernel;
use tracing::info;
use tracing_subscriber::EnvFilter;

use inkcard_cli::commands::{self, Pattern, SimulateOptions};
use inkcard_cli::config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "inkcard", about = "Encoder and protocol tools for NFC e-ink cards")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "inkcard.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a device-info (00D1) response body.
    Info {
        hex: String,
        /// Print the decoded profile as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Encode a synthetic image and print the APDU script.
    Encode {
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Decode one command APDU, decompressing single-fragment blocks.
    Inspect {
        hex: String,
        #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
        bpp: u8,
        /// Framebuffer row width in pixels.
        #[arg(long, default_value_t = 400)]
        cols: usize,
    },
    /// Run a full transfer against a simulated card.
    Simulate {
        #[command(flatten)]
        image: ImageArgs,
        /// "In progress" answers before the refresh completes.
        #[arg(long, default_value_t = 2)]
        busy_polls: u32,
        /// Drop the link when fragment `BLOCK:FRAG` arrives.
        #[arg(long, value_parser = parse_drop)]
        drop: Option<(u8, u8)>,
        /// Commands per link before the radio session expires.
        #[arg(long)]
        budget: Option<u32>,
    },
}

#[derive(clap::Args, Debug)]
struct ImageArgs {
    /// Panel as WIDTHxHEIGHTxBPP; defaults to `encode.panel`.
    #[arg(long)]
    panel: Option<String>,
    #[arg(long, value_enum, default_value_t = Pattern::Gradient)]
    pattern: Pattern,
    /// Palette index for the solid pattern.
    #[arg(long, default_value_t = 1)]
    index: u8,
    /// Dither kernel; defaults to `encode.kernel`.
    #[arg(long)]
    kernel: Option<DitherKernel>,
}

fn parse_drop(s: &str) -> Result<(u8, u8), String> {
    let (block, frag) = s
        .split_once(':')
        .ok_or_else(|| "expected BLOCK:FRAG".to_string())?;
    let block = block.parse().map_err(|e| format!("block: {e}"))?;
    let frag = frag.parse().map_err(|e| format!("fragment: {e}"))?;
    Ok((block, frag))
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let config = CliConfig::load(&cli.config);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("inkcard v{}", env!("CARGO_PKG_VERSION"));

    let Some(command) = cli.command else {
        eprintln!("no command given; see --help");
        std::process::exit(2);
    };

    match command {
        Command::Info { hex, json } => {
            print!("{}", commands::describe_info(&hex, json)?);
            if json {
                println!();
            }
        }
        Command::Encode { image } => {
            let panel = image.panel.as_deref().unwrap_or(&config.encode.panel);
            let profile = commands::parse_panel(panel)?;
            let kernel = image.kernel.unwrap_or(config.encode.kernel);
            let blocks = commands::pattern_blocks(&profile, image.pattern, image.index, kernel)?;
            info!(%profile, %kernel, blocks = blocks.len(), "encoded");
            for line in commands::apdu_script(&blocks)? {
                println!("{line}");
            }
        }
        Command::Inspect { hex, bpp, cols } => {
            print!("{}", commands::inspect_apdu(&hex, bpp, cols)?);
        }
        Command::Simulate {
            image,
            busy_polls,
            drop,
            budget,
        } => {
            let opts = SimulateOptions {
                profile: commands::parse_panel(
                    image.panel.as_deref().unwrap_or(&config.encode.panel),
                )?,
                pattern: image.pattern,
                index: image.index,
                kernel: image.kernel.unwrap_or(config.encode.kernel),
                busy_polls,
                drop_at: drop,
                command_budget: budget,
            };
            let outcome = commands::simulate(opts, config.to_session_config()).await?;
            let r = &outcome.report;
            println!("blocks:        {}", r.blocks);
            println!("fragments:     {}", r.fragments_sent);
            println!("retried:       {:?}", r.retried_blocks);
            println!("reconnects:    {}", outcome.reconnects);
            println!("polls:         {}", r.polls);
            println!("elapsed:       {:?}", r.elapsed);
            println!("verified:      {}", outcome.verified);
            if !outcome.verified {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
