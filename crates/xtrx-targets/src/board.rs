//! Board model: FPGA device, SPI flash chip and CPU memory map.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TargetError;

/// The supported built-in boards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardName {
    FairwavesCs,
    #[default]
    FairwavesPro,
    Limesdr,
}

impl BoardName {
    pub const ALL: [BoardName; 3] = [
        BoardName::FairwavesCs,
        BoardName::FairwavesPro,
        BoardName::Limesdr,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoardName::FairwavesCs => "fairwaves_cs",
            BoardName::FairwavesPro => "fairwaves_pro",
            BoardName::Limesdr => "limesdr",
        }
    }
}

impl fmt::Display for BoardName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BoardName {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BoardName::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| TargetError::UnknownBoard(s.to_string()))
    }
}

/// SPI configuration flash fitted to a board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FlashChip {
    /// Chip model (e.g., "N25Q256A").
    pub model: String,
    /// Capacity in bytes.
    pub size_bytes: u64,
}

/// One region of the CPU memory map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MemoryRegion {
    pub name: String,
    pub origin: u64,
    pub size_bytes: u64,
}

impl MemoryRegion {
    pub fn new(name: impl Into<String>, origin: u64, size_bytes: u64) -> Self {
        Self {
            name: name.into(),
            origin,
            size_bytes,
        }
    }
}

/// A complete board description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Board {
    /// Board name as selected on the command line (e.g., "limesdr").
    pub name: String,
    /// FPGA part number.
    pub fpga_device: String,
    /// PCIe lane count of the edge connector.
    pub pcie_lanes: u8,
    /// SoC bus address width in bits.
    pub address_width: u32,
    pub flash: FlashChip,
    /// CPU memory map.
    pub memory_regions: Vec<MemoryRegion>,
}

const N25Q256A_SIZE: u64 = 32 * 1024 * 1024;

impl Board {
    /// The built-in description of a supported board.
    pub fn builtin(name: BoardName) -> Self {
        match name {
            BoardName::FairwavesCs => Self::xtrx(name, "xc7a35tcpg236-2"),
            BoardName::FairwavesPro => Self::xtrx(name, "xc7a50tcpg236-2"),
            BoardName::Limesdr => Self::xtrx(name, "xc7a50tcpg236-2"),
        }
    }

    fn xtrx(name: BoardName, fpga_device: &str) -> Self {
        Self {
            name: name.as_str().into(),
            fpga_device: fpga_device.into(),
            pcie_lanes: 2,
            address_width: 32,
            flash: FlashChip {
                model: "N25Q256A".into(),
                size_bytes: N25Q256A_SIZE,
            },
            memory_regions: vec![
                MemoryRegion::new("rom", 0x0000_0000, 0x8000),
                MemoryRegion::new("lime_top_mmap", 0x0300_0000, 0x1000),
                MemoryRegion::new("sram", 0x1000_0000, 0x1000),
                MemoryRegion::new("spiflash", 0x2000_0000, N25Q256A_SIZE),
                MemoryRegion::new("main_ram", 0x4000_0000, 0x4000),
                MemoryRegion::new("csr", 0xf000_0000, 0x1_0000),
            ],
        }
    }

    pub fn region(&self, name: &str) -> Option<&MemoryRegion> {
        self.memory_regions.iter().find(|r| r.name == name)
    }

    /// SoC identification string, e.g. "LiteX SoC on Limesdr XTRX".
    pub fn ident(&self) -> String {
        let mut chars = self.name.chars();
        let capitalized: String = match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect(),
            None => String::new(),
        };
        format!("LiteX SoC on {capitalized} XTRX")
    }
}
