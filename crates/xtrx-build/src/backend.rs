//! External collaborators of the build.
//!
//! The firmware compiler, the place-and-route backend, the JTAG programmer
//! and the CRC framing tool are never reimplemented; the build talks to them
//! through these traits. Command-backed implementations spawn the tools and
//! report their diagnostics verbatim.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::{debug, info};
use xtrx_core::ComposedSoc;

use crate::artifact::{Bitstream, FirmwarePayload, MapExport};
use crate::error::{BuildError, Result};

/// Compiles firmware against an exported memory map.
pub trait FirmwareCompiler {
    /// `build_dir` holds the exports of the prepare phase.
    fn compile(&self, map: &MapExport, build_dir: &Path) -> Result<FirmwarePayload>;
}

/// What the image backend is asked to build.
#[derive(Debug, Clone)]
pub struct ImageRequest<'a> {
    pub soc: &'a ComposedSoc,
    pub fpga_device: &'a str,
    pub build_name: &'a str,
    /// Exported maps, headers and constraints.
    pub exports: &'a [PathBuf],
    pub gateware_dir: &'a Path,
}

/// Turns a composed SoC into a hardware image.
pub trait ImageBackend {
    fn build_image(&self, request: &ImageRequest<'_>) -> Result<Bitstream>;
}

/// Loads and flashes hardware images.
pub trait Programmer {
    fn load_bitstream(&self, bitstream: &Path) -> Result<()>;

    /// Write `image` into the configuration flash at `offset`.
    fn flash(&self, offset: u64, image: &Path) -> Result<()>;
}

/// Wraps a firmware image into a CRC-framed boot image.
pub trait FirmwareFramer {
    fn frame(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Run a tool to completion, mapping failures to [`BuildError`].
pub fn run_tool(tool: &str, cmd: &mut Command) -> Result<Output> {
    debug!(tool, command = ?cmd, "running external tool");
    let output = cmd.output().map_err(|source| BuildError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(BuildError::ExternalTool {
            tool: tool.to_string(),
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    Ok(output)
}

fn require_output(tool: &str, path: PathBuf) -> Result<PathBuf> {
    if path.exists() {
        Ok(path)
    } else {
        Err(BuildError::MissingOutput {
            tool: tool.to_string(),
            path,
        })
    }
}

/// Runs the firmware's build system inside its source directory.
///
/// Invoked as `<program> BUILD_DIR=<build_dir> clean all`; the binary is then
/// read from `<dir>/<binary>`.
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    pub program: String,
    pub dir: PathBuf,
    pub binary: PathBuf,
}

impl CommandCompiler {
    pub fn new(program: impl Into<String>, dir: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dir: dir.into(),
            binary: binary.into(),
        }
    }
}

impl FirmwareCompiler for CommandCompiler {
    fn compile(&self, map: &MapExport, build_dir: &Path) -> Result<FirmwarePayload> {
        let build_dir = std::path::absolute(build_dir)?;
        info!(dir = %self.dir.display(), "compiling firmware");
        run_tool(
            &self.program,
            Command::new(&self.program)
                .current_dir(&self.dir)
                .arg(format!("BUILD_DIR={}", build_dir.display()))
                .args(["clean", "all"]),
        )?;
        let binary = require_output(&self.program, self.dir.join(&self.binary))?;
        let image = std::fs::read(binary)?;
        Ok(FirmwarePayload::for_map(image, map))
    }
}

/// Runs a place-and-route wrapper script.
///
/// Invoked as `<program> [args] --device <part> --top <build_name> --output
/// <gateware_dir> <exports...>`; it must leave `<build_name>.bit` and
/// `<build_name>.bin` in the gateware directory.
#[derive(Debug, Clone)]
pub struct CommandImageBackend {
    pub program: String,
    pub args: Vec<String>,
}

impl ImageBackend for CommandImageBackend {
    fn build_image(&self, request: &ImageRequest<'_>) -> Result<Bitstream> {
        std::fs::create_dir_all(request.gateware_dir)?;
        info!(device = request.fpga_device, "building hardware image");
        run_tool(
            &self.program,
            Command::new(&self.program)
                .args(&self.args)
                .arg("--device")
                .arg(request.fpga_device)
                .arg("--top")
                .arg(request.build_name)
                .arg("--output")
                .arg(request.gateware_dir)
                .args(request.exports),
        )?;
        let stem = request.gateware_dir.join(request.build_name);
        Ok(Bitstream {
            bit: require_output(&self.program, stem.with_extension("bit"))?,
            bin: require_output(&self.program, stem.with_extension("bin"))?,
        })
    }
}

/// JTAG programmer driven through `openFPGALoader`-style arguments.
#[derive(Debug, Clone)]
pub struct CommandProgrammer {
    pub program: String,
    pub cable: String,
}

impl CommandProgrammer {
    pub fn new(program: impl Into<String>, cable: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cable: cable.into(),
        }
    }
}

impl Programmer for CommandProgrammer {
    fn load_bitstream(&self, bitstream: &Path) -> Result<()> {
        info!(cable = %self.cable, path = %bitstream.display(), "loading bitstream");
        run_tool(
            &self.program,
            Command::new(&self.program)
                .args(["--cable", self.cable.as_str()])
                .arg(bitstream),
        )?;
        Ok(())
    }

    fn flash(&self, offset: u64, image: &Path) -> Result<()> {
        info!(
            cable = %self.cable,
            offset = %format!("0x{offset:x}"),
            path = %image.display(),
            "writing flash"
        );
        run_tool(
            &self.program,
            Command::new(&self.program)
                .args(["--cable", self.cable.as_str(), "--write-flash"])
                .arg("--offset")
                .arg(offset.to_string())
                .arg(image),
        )?;
        Ok(())
    }
}

/// CRC framing tool invoked as `<program> [args] -o <output> <input>`.
#[derive(Debug, Clone)]
pub struct CommandFramer {
    pub program: String,
    pub args: Vec<String>,
}

impl FirmwareFramer for CommandFramer {
    fn frame(&self, input: &Path, output: &Path) -> Result<()> {
        run_tool(
            &self.program,
            Command::new(&self.program)
                .args(&self.args)
                .arg("-o")
                .arg(output)
                .arg(input),
        )?;
        require_output(&self.program, output.to_path_buf())?;
        Ok(())
    }
}
