//! xtrx CLI: build, load and flash the LiteX SoC on Fairwaves/LimeSDR XTRX cards.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::EnvFilter;
use xtrx_build::{CommandFramer, CommandProgrammer, PhaseCheck};
use xtrx_targets::BoardName;

use commands::build::BuildOptions;
use config::XtrxConfig;

#[derive(Parser)]
#[command(
    name = "xtrx",
    version,
    about = "LiteX SoC on Fairwaves/LimeSDR XTRX"
)]
struct Cli {
    /// Select XTRX board (fairwaves_cs, fairwaves_pro, limesdr)
    #[arg(long)]
    board: Option<BoardName>,
    /// Board definition file (.board.toml) instead of a built-in board
    #[arg(long, conflicts_with = "board")]
    board_file: Option<PathBuf>,
    /// Enable CPU debug over JTAG
    #[arg(long)]
    with_bscan: bool,
    /// Build bitstream
    #[arg(long)]
    build: bool,
    /// Load bitstream
    #[arg(long)]
    load: bool,
    /// Flash bitstream
    #[arg(long)]
    flash: bool,
    /// JTAG cable (default: digilent_hs2)
    #[arg(long)]
    cable: Option<String>,
    /// Generate the PCIe driver header (override local version)
    #[arg(long)]
    driver: bool,
    /// Write firmware in flash instead of RAM
    #[arg(long)]
    flash_boot: bool,
    /// Firmware SPI flash offset (default: 0x220000)
    #[arg(long, value_parser = parse_offset)]
    firmware_flash_offset: Option<u64>,
    /// Output directory (default: build)
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Tolerate firmware compiled against a different composition
    #[arg(long)]
    lenient_phase_check: bool,
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

/// Parse a decimal or `0x`-prefixed hexadecimal offset.
fn parse_offset(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}

fn setup_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let (config, project_dir) = match XtrxConfig::find_and_load(&cwd)? {
        Some((config, dir)) => (config, dir),
        None => (XtrxConfig::default(), cwd),
    };
    info!(project = %project_dir.display(), "resolved project directory");

    let opts = BuildOptions {
        board: cli.board,
        board_file: cli.board_file,
        with_bscan: cli.with_bscan,
        flash_boot: cli.flash_boot,
        firmware_flash_offset: cli.firmware_flash_offset,
        output_dir: cli.output_dir,
        build_image: cli.build,
        phase_check: if cli.lenient_phase_check {
            PhaseCheck::Lenient
        } else {
            PhaseCheck::Strict
        },
    };

    let built = commands::build::run(&project_dir, &config, &opts)?;

    commands::driver::run(
        &built.output.finalized.soc,
        &project_dir.join(&config.driver.output),
        cli.driver,
    )?;

    if !(cli.load || cli.flash) {
        return Ok(());
    }
    let programmer = CommandProgrammer::new(
        config.programmer.command.clone(),
        cli.cable.unwrap_or_else(|| config.programmer.cable.clone()),
    );

    if cli.load {
        commands::program::load(&programmer, &built.bitstream)?;
    }

    if cli.flash {
        commands::program::flash_bitstream(&programmer, &built.bitstream)?;
        if let Some(schedule) = &built.output.finalized.flash_programming {
            let framer = CommandFramer {
                program: config.flash.framer_command.clone(),
                args: config.flash.framer_args.clone(),
            };
            commands::program::flash_firmware(&programmer, &framer, schedule, &built.output_dir)?;
        }
    }

    Ok(())
}
