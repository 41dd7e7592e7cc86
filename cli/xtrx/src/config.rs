//! `xtrx.toml` project configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use xtrx_build::params::{DEFAULT_DMA_BUFFERING_DEPTH, DEFAULT_SYS_CLK_FREQ};
use xtrx_core::boot::DEFAULT_FIRMWARE_FLASH_OFFSET;

pub const CONFIG_FILE: &str = "xtrx.toml";

/// The top-level project configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct XtrxConfig {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub soc: SocConfig,
    #[serde(default)]
    pub firmware: FirmwareConfig,
    #[serde(default)]
    pub toolchain: ToolchainConfig,
    #[serde(default)]
    pub programmer: ProgrammerConfig,
    #[serde(default)]
    pub flash: FlashConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Project metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Default board name (`fairwaves_cs`, `fairwaves_pro`, `limesdr`).
    #[serde(default)]
    pub board: Option<String>,
    /// Board definition file, relative to the project directory.
    #[serde(default)]
    pub board_file: Option<PathBuf>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: None,
            board: None,
            board_file: None,
            output_dir: default_output_dir(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

/// SoC composition parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocConfig {
    #[serde(default = "default_sys_clk_freq")]
    pub sys_clk_freq: f64,
    #[serde(default = "default_dma_buffering_depth")]
    pub dma_buffering_depth: u32,
    #[serde(default)]
    pub with_bscan: bool,
}

impl Default for SocConfig {
    fn default() -> Self {
        Self {
            sys_clk_freq: default_sys_clk_freq(),
            dma_buffering_depth: default_dma_buffering_depth(),
            with_bscan: false,
        }
    }
}

fn default_sys_clk_freq() -> f64 {
    DEFAULT_SYS_CLK_FREQ
}

fn default_dma_buffering_depth() -> u32 {
    DEFAULT_DMA_BUFFERING_DEPTH
}

/// Firmware build section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareConfig {
    #[serde(default = "default_firmware_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_build_command")]
    pub build_command: String,
    /// Binary left by the build, relative to `dir`.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            dir: default_firmware_dir(),
            build_command: default_build_command(),
            binary: default_binary(),
        }
    }
}

fn default_firmware_dir() -> PathBuf {
    PathBuf::from("firmware")
}

fn default_build_command() -> String {
    "make".to_string()
}

fn default_binary() -> PathBuf {
    PathBuf::from("firmware.bin")
}

/// Place-and-route backend section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainConfig {
    #[serde(default = "default_toolchain_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            command: default_toolchain_command(),
            args: Vec::new(),
        }
    }
}

fn default_toolchain_command() -> String {
    "xtrx-vivado".to_string()
}

/// JTAG programmer section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgrammerConfig {
    #[serde(default = "default_programmer_command")]
    pub command: String,
    #[serde(default = "default_cable")]
    pub cable: String,
}

impl Default for ProgrammerConfig {
    fn default() -> Self {
        Self {
            command: default_programmer_command(),
            cable: default_cable(),
        }
    }
}

fn default_programmer_command() -> String {
    "openFPGALoader".to_string()
}

fn default_cable() -> String {
    "digilent_hs2".to_string()
}

/// Firmware-in-flash section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// CRC framing tool, invoked as `<command> [args] -o <out> <in>`.
    #[serde(default = "default_framer_command")]
    pub framer_command: String,
    #[serde(default = "default_framer_args")]
    pub framer_args: Vec<String>,
    #[serde(default = "default_firmware_offset")]
    pub firmware_offset: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        Self {
            framer_command: default_framer_command(),
            framer_args: default_framer_args(),
            firmware_offset: default_firmware_offset(),
        }
    }
}

fn default_framer_command() -> String {
    "crcfbigen".to_string()
}

fn default_framer_args() -> Vec<String> {
    vec!["--fbi".to_string(), "--little".to_string()]
}

fn default_firmware_offset() -> u64 {
    DEFAULT_FIRMWARE_FLASH_OFFSET
}

/// Host driver section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Generated register header, relative to the project directory.
    #[serde(default = "default_driver_output")]
    pub output: PathBuf,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            output: default_driver_output(),
        }
    }
}

fn default_driver_output() -> PathBuf {
    PathBuf::from("software/kernel/csr.h")
}

impl XtrxConfig {
    /// Search upward from `start_dir` for an `xtrx.toml` file, parse and return
    /// it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let config: XtrxConfig = toml::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((config, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Parse a configuration from a TOML string.
    #[cfg(test)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing xtrx.toml")
    }
}
