//! Composition parameters and their fingerprint.
//!
//! Both build phases must compose from identical [`SocParams`]. The
//! fingerprint travels with the exported map into the firmware payload so
//! `finalize` can tell whether the payload was compiled for this system.

use std::fmt;

use serde::{Deserialize, Serialize};
use xtrx_core::boot::{BootMode, DEFAULT_FIRMWARE_FLASH_OFFSET};
use xtrx_core::hash::{content_hash, hash_hex};
use xtrx_targets::{Board, BoardName};

use crate::error::Result;

/// Default system clock, generated by the PLL from the PCIe user clock.
pub const DEFAULT_SYS_CLK_FREQ: f64 = 125e6;
/// Default DMA buffering depth in bytes.
pub const DEFAULT_DMA_BUFFERING_DEPTH: u32 = 8192;

/// Which JTAG debug path the SoC carries. The two are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugBridge {
    /// Wishbone bridge over JTAG for host-side register access.
    #[default]
    JtagBone,
    /// CPU debug module on the boundary-scan chain.
    CpuDebug,
}

impl DebugBridge {
    pub fn from_with_bscan(with_bscan: bool) -> Self {
        if with_bscan {
            DebugBridge::CpuDebug
        } else {
            DebugBridge::JtagBone
        }
    }
}

/// Everything a composition run depends on, except the firmware payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocParams {
    pub board: Board,
    pub sys_clk_freq: f64,
    pub boot_mode: BootMode,
    pub firmware_flash_offset: u64,
    pub debug: DebugBridge,
    pub dma_buffering_depth: u32,
}

impl SocParams {
    /// Default parameters for a board.
    pub fn new(board: Board) -> Self {
        Self {
            board,
            sys_clk_freq: DEFAULT_SYS_CLK_FREQ,
            boot_mode: BootMode::InFabric,
            firmware_flash_offset: DEFAULT_FIRMWARE_FLASH_OFFSET,
            debug: DebugBridge::default(),
            dma_buffering_depth: DEFAULT_DMA_BUFFERING_DEPTH,
        }
    }

    /// Default parameters for a built-in board.
    pub fn for_board(name: BoardName) -> Self {
        Self::new(Board::builtin(name))
    }

    pub fn with_boot_mode(mut self, mode: BootMode) -> Self {
        self.boot_mode = mode;
        self
    }

    pub fn with_firmware_flash_offset(mut self, offset: u64) -> Self {
        self.firmware_flash_offset = offset;
        self
    }

    pub fn with_debug(mut self, debug: DebugBridge) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_sys_clk_freq(mut self, hz: f64) -> Self {
        self.sys_clk_freq = hz;
        self
    }

    pub fn with_dma_buffering_depth(mut self, depth: u32) -> Self {
        self.dma_buffering_depth = depth;
        self
    }

    /// Content hash of these parameters.
    pub fn fingerprint(&self) -> Result<CompositionFingerprint> {
        Ok(CompositionFingerprint(hash_hex(&content_hash(self)?)))
    }
}

/// SHA-256 of the composition parameters, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionFingerprint(String);

impl CompositionFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs and reports.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for CompositionFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let a = SocParams::for_board(BoardName::Limesdr).fingerprint().unwrap();
        let b = SocParams::for_board(BoardName::Limesdr).fingerprint().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(a.short().len(), 12);
    }

    #[test]
    fn fingerprint_covers_every_parameter() {
        let base = SocParams::for_board(BoardName::Limesdr);
        let fp = base.fingerprint().unwrap();
        let variants = [
            SocParams::for_board(BoardName::FairwavesPro),
            base.clone().with_boot_mode(BootMode::ExternalFlash),
            base.clone().with_firmware_flash_offset(0x30_0000),
            base.clone().with_debug(DebugBridge::CpuDebug),
            base.clone().with_sys_clk_freq(100e6),
            base.clone().with_dma_buffering_depth(4096),
        ];
        for v in variants {
            assert_ne!(v.fingerprint().unwrap(), fp);
        }
    }

    #[test]
    fn fingerprint_sees_board_memory_map() {
        let base = SocParams::for_board(BoardName::Limesdr);
        let mut moved = base.clone();
        for r in &mut moved.board.memory_regions {
            if r.name == "main_ram" {
                r.origin = 0x5000_0000;
            }
        }
        assert_ne!(moved.fingerprint().unwrap(), base.fingerprint().unwrap());
    }

    #[test]
    fn debug_bridge_from_flag() {
        assert_eq!(DebugBridge::from_with_bscan(false), DebugBridge::JtagBone);
        assert_eq!(DebugBridge::from_with_bscan(true), DebugBridge::CpuDebug);
    }
}
