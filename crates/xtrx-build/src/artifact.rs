//! Typed artifacts passed between the two build phases.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use xtrx_core::boot::BootMode;
use xtrx_core::{ComposedSoc, PeripheralEntry, Region};

use crate::params::CompositionFingerprint;

/// Build phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Full composition without a payload; exports the memory map.
    Prepare,
    /// Identical composition with the payload; requests the hardware image.
    Finalize,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The memory map a firmware build compiles against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapExport {
    pub ident: String,
    pub fingerprint: CompositionFingerprint,
    pub boot_mode: BootMode,
    pub boot_address: u64,
    pub csr_base: Option<u64>,
    pub regions: Vec<Region>,
    pub peripherals: Vec<PeripheralEntry>,
    pub constants: BTreeMap<String, u64>,
}

impl MapExport {
    pub fn new(soc: &ComposedSoc, fingerprint: CompositionFingerprint) -> Self {
        Self {
            ident: soc.ident.clone(),
            fingerprint,
            boot_mode: soc.boot.mode,
            boot_address: soc.boot.boot_address,
            csr_base: soc.csr_base,
            regions: soc.regions.clone(),
            peripherals: soc.peripherals.clone(),
            constants: soc.constants.clone(),
        }
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }
}

/// A compiled firmware image and the map it was compiled against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwarePayload {
    pub image: Vec<u8>,
    /// Address the firmware was linked to start from.
    pub entry: u64,
    pub fingerprint: CompositionFingerprint,
}

impl FirmwarePayload {
    /// A payload compiled against `map`.
    pub fn for_map(image: Vec<u8>, map: &MapExport) -> Self {
        Self {
            image,
            entry: map.boot_address,
            fingerprint: map.fingerprint.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }
}

/// Out-of-band flash write scheduled for external-flash boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashProgramming {
    /// Byte offset inside the SPI flash.
    pub offset: u64,
    pub image: Vec<u8>,
}

/// Hardware image files produced by the image backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitstream {
    /// Volatile configuration image, loaded over JTAG.
    pub bit: PathBuf,
    /// Raw image for writing to the configuration flash.
    pub bin: PathBuf,
}

/// Where a phase put its files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputDescriptor {
    pub output_dir: PathBuf,
    /// Exported maps, headers and constraints.
    pub exports: Vec<PathBuf>,
    /// Present only after a finalize run that requested an image.
    pub bitstream: Option<Bitstream>,
}

/// Result of one build phase.
#[derive(Debug, Clone)]
pub struct BuildArtifact {
    pub phase: Phase,
    pub soc: ComposedSoc,
    pub map: MapExport,
    /// Always absent for `prepare`.
    pub firmware_payload: Option<FirmwarePayload>,
    /// Present for `finalize` in external-flash mode.
    pub flash_programming: Option<FlashProgramming>,
    /// Phase mismatches tolerated by a lenient check.
    pub phase_mismatches: Vec<String>,
    pub output: OutputDescriptor,
}
