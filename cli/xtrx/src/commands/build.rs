//! Two-phase SoC build: compose, compile the firmware, finalize.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use xtrx_build::{
    Bitstream, BuildConfig, BuildOrchestrator, BuildOutput, CommandCompiler, CommandImageBackend,
    DebugBridge, ImageBackend, PhaseCheck, SocParams, XtrxSoc,
};
use xtrx_core::boot::BootMode;
use xtrx_targets::{Board, BoardName};

use crate::config::XtrxConfig;

/// Options resolved from the command line and `xtrx.toml`.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub board: Option<BoardName>,
    pub board_file: Option<PathBuf>,
    pub with_bscan: bool,
    pub flash_boot: bool,
    pub firmware_flash_offset: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub build_image: bool,
    pub phase_check: PhaseCheck,
}

/// A finished build and where its outputs live.
#[derive(Debug)]
pub struct Built {
    pub output: BuildOutput,
    /// Directory holding the exports and the gateware.
    pub output_dir: PathBuf,
    /// Image paths, whether or not this run produced them.
    pub bitstream: Bitstream,
}

/// Resolve the board. Flags win over the config; within the config a board
/// file wins over a board name. A configured name that is not built in is
/// looked up among the project's `boards/*.board.toml` files.
pub fn resolve_board(
    project_dir: &Path,
    config: &XtrxConfig,
    opts: &BuildOptions,
) -> Result<Board> {
    let board_file = opts
        .board_file
        .clone()
        .or_else(|| config.project.board_file.as_ref().map(|p| project_dir.join(p)));
    if opts.board.is_none() {
        if let Some(path) = board_file {
            return load_board_file(&path);
        }
    }

    let name = match (opts.board, config.project.board.as_deref()) {
        (Some(name), _) => name,
        (None, Some(configured)) => match configured.parse::<BoardName>() {
            Ok(name) => name,
            Err(unknown) => {
                let boards = xtrx_targets::parse::discover_boards(project_dir)
                    .context("scanning project boards")?;
                return match boards.into_iter().find(|(name, _)| name == configured) {
                    Some((_, path)) => load_board_file(&path),
                    None => Err(anyhow::Error::new(unknown)
                        .context(format!("board in {}", crate::config::CONFIG_FILE))),
                };
            }
        },
        (None, None) => BoardName::default(),
    };
    Ok(Board::builtin(name))
}

fn load_board_file(path: &Path) -> Result<Board> {
    xtrx_targets::parse::load_validated(path)
        .with_context(|| format!("loading board file {}", path.display()))
}

/// Composition parameters for `board`.
pub fn soc_params(board: Board, config: &XtrxConfig, opts: &BuildOptions) -> SocParams {
    SocParams::new(board)
        .with_sys_clk_freq(config.soc.sys_clk_freq)
        .with_dma_buffering_depth(config.soc.dma_buffering_depth)
        .with_debug(DebugBridge::from_with_bscan(
            opts.with_bscan || config.soc.with_bscan,
        ))
        .with_boot_mode(BootMode::from_flash_boot(opts.flash_boot))
        .with_firmware_flash_offset(
            opts.firmware_flash_offset
                .unwrap_or(config.flash.firmware_offset),
        )
}

/// Run both phases, printing the build report.
pub fn run(project_dir: &Path, config: &XtrxConfig, opts: &BuildOptions) -> Result<Built> {
    let board = resolve_board(project_dir, config, opts)?;
    println!("Board: {} ({})", board.name, board.fpga_device);

    let soc = XtrxSoc::new(soc_params(board, config, opts));
    let output_dir = match &opts.output_dir {
        Some(dir) => dir.clone(),
        None => project_dir.join(&config.project.output_dir),
    };
    let build_config = BuildConfig::new(output_dir.clone())
        .with_image(opts.build_image)
        .with_phase_check(opts.phase_check);
    let orchestrator = BuildOrchestrator::new(&soc, build_config);

    let firmware_dir = project_dir.join(&config.firmware.dir);
    if !firmware_dir.is_dir() {
        bail!(
            "firmware directory not found: {}. Set [firmware] dir in {}.",
            firmware_dir.display(),
            crate::config::CONFIG_FILE
        );
    }
    let compiler = CommandCompiler::new(
        config.firmware.build_command.clone(),
        firmware_dir,
        config.firmware.binary.clone(),
    );
    let image_backend = CommandImageBackend {
        program: config.toolchain.command.clone(),
        args: config.toolchain.args.clone(),
    };
    let backend: Option<&dyn ImageBackend> = if opts.build_image {
        Some(&image_backend)
    } else {
        None
    };

    let output = orchestrator.run(&compiler, backend).context("SoC build failed")?;
    println!("{}", output.report);

    let bitstream = match &output.finalized.output.bitstream {
        Some(b) => b.clone(),
        None => {
            let stem = orchestrator.gateware_dir().join(orchestrator.build_name());
            Bitstream {
                bit: stem.with_extension("bit"),
                bin: stem.with_extension("bin"),
            }
        }
    };
    Ok(Built {
        output,
        output_dir,
        bitstream,
    })
}
