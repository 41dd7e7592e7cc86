//! Build report aggregating both phases.

use std::fmt;
use std::path::PathBuf;

use xtrx_core::boot::BootMode;

use crate::artifact::Bitstream;

/// Where the firmware payload ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadPlacement {
    /// Packed into `main_ram` initial contents.
    MainRam { words: usize },
    /// Scheduled for writing into SPI flash.
    Flash { offset: u64 },
}

/// Summary report of a two-phase build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Board name.
    pub board: String,
    /// SoC identification string.
    pub ident: String,
    /// Abbreviated composition fingerprint.
    pub fingerprint: String,
    pub boot_mode: BootMode,
    pub boot_address: u64,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
    pub regions: usize,
    pub peripherals: usize,
    pub clock_domains: usize,
    pub timing_exceptions: usize,
    pub stream_links: usize,
    /// Firmware size in bytes.
    pub payload_bytes: usize,
    pub placement: PayloadPlacement,
    /// Tolerated phase mismatches (lenient phase check only).
    pub phase_mismatches: Vec<String>,
    pub exports: Vec<PathBuf>,
    /// Hardware image, if one was requested.
    pub bitstream: Option<Bitstream>,
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Build Report ===")?;
        writeln!(f, "Board: {} ({})", self.board, self.ident)?;
        writeln!(f, "Fingerprint: {}", self.fingerprint)?;
        writeln!(f, "Duration: {} ms", self.duration_ms)?;
        writeln!(f)?;

        writeln!(f, "--- Composition ---")?;
        writeln!(
            f,
            "  {} regions, {} peripherals, {} stream links",
            self.regions, self.peripherals, self.stream_links
        )?;
        writeln!(
            f,
            "  {} clock domains, {} timing exceptions",
            self.clock_domains, self.timing_exceptions
        )?;

        writeln!(f)?;
        writeln!(f, "--- Boot ---")?;
        writeln!(f, "  Mode: {}", self.boot_mode)?;
        writeln!(f, "  Address: 0x{:08x}", self.boot_address)?;
        match self.placement {
            PayloadPlacement::MainRam { words } => writeln!(
                f,
                "  Firmware: {} bytes in main_ram ({} words)",
                self.payload_bytes, words
            )?,
            PayloadPlacement::Flash { offset } => writeln!(
                f,
                "  Firmware: {} bytes scheduled for flash at 0x{:x}",
                self.payload_bytes, offset
            )?,
        }

        if !self.phase_mismatches.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "--- Phase mismatches ({}, tolerated) ---",
                self.phase_mismatches.len()
            )?;
            for m in &self.phase_mismatches {
                writeln!(f, "  {m}")?;
            }
        }

        writeln!(f)?;
        writeln!(f, "--- Outputs ---")?;
        for path in &self.exports {
            writeln!(f, "  {}", path.display())?;
        }
        match &self.bitstream {
            Some(b) => {
                writeln!(f, "  {}", b.bit.display())?;
                writeln!(f, "  {}", b.bin.display())?;
            }
            None => writeln!(f, "  (no hardware image requested)")?,
        }

        Ok(())
    }
}
