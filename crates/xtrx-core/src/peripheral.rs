//! Peripheral index table.
//!
//! Register blocks are addressed by a small stable index: block `i` lives at
//! `csr_base + i * CSR_PAGING`. Firmware and host drivers hardcode these
//! indices, so they come from the fixed [`Peripheral`] enumeration and are
//! never auto-assigned.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Bytes reserved for each register block in the CSR window.
pub const CSR_PAGING: u64 = 0x800;

/// Register blocks with a hand-curated, hardcodable index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Peripheral {
    // SoC.
    Uart,
    Icap,
    Flash,
    Xadc,
    Dna,
    // PCIe.
    PciePhy,
    PcieMsi,
    PcieDma0,
    // XTRX.
    I2c0,
    I2c1,
    // Analyzer.
    Analyzer,
}

impl Peripheral {
    /// Every curated peripheral, in index order.
    pub const ALL: [Peripheral; 11] = [
        Peripheral::Uart,
        Peripheral::Icap,
        Peripheral::Flash,
        Peripheral::Xadc,
        Peripheral::Dna,
        Peripheral::PciePhy,
        Peripheral::PcieMsi,
        Peripheral::PcieDma0,
        Peripheral::I2c0,
        Peripheral::I2c1,
        Peripheral::Analyzer,
    ];

    /// The fixed index of this register block.
    pub const fn index(self) -> u16 {
        match self {
            Peripheral::Uart => 0,
            Peripheral::Icap => 1,
            Peripheral::Flash => 2,
            Peripheral::Xadc => 3,
            Peripheral::Dna => 4,
            Peripheral::PciePhy => 10,
            Peripheral::PcieMsi => 11,
            Peripheral::PcieDma0 => 12,
            Peripheral::I2c0 => 20,
            Peripheral::I2c1 => 21,
            Peripheral::Analyzer => 30,
        }
    }

    /// The register-block name used in exports.
    pub const fn name(self) -> &'static str {
        match self {
            Peripheral::Uart => "uart",
            Peripheral::Icap => "icap",
            Peripheral::Flash => "flash",
            Peripheral::Xadc => "xadc",
            Peripheral::Dna => "dna",
            Peripheral::PciePhy => "pcie_phy",
            Peripheral::PcieMsi => "pcie_msi",
            Peripheral::PcieDma0 => "pcie_dma0",
            Peripheral::I2c0 => "i2c0",
            Peripheral::I2c1 => "i2c1",
            Peripheral::Analyzer => "analyzer",
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const fn indices_unique(list: &[Peripheral]) -> bool {
    let mut i = 0;
    while i < list.len() {
        let mut j = i + 1;
        while j < list.len() {
            if list[i].index() == list[j].index() {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const _: () = assert!(
    indices_unique(&Peripheral::ALL),
    "curated peripheral indices must be unique"
);

/// A registered register block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeripheralEntry {
    pub name: String,
    pub index: u16,
}

impl PeripheralEntry {
    /// Absolute address of the register block for a CSR window at `csr_base`.
    pub fn address(&self, csr_base: u64) -> u64 {
        csr_base + u64::from(self.index) * CSR_PAGING
    }
}

/// Errors raised while populating the index table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeripheralError {
    #[error("peripheral '{name}' requests index {index}, already held by '{existing}'")]
    DuplicateIndex {
        name: String,
        index: u16,
        existing: String,
    },

    #[error("peripheral '{0}' is already registered")]
    DuplicateName(String),

    #[error("peripheral '{name}' index {index} does not fit the CSR window ({capacity} slots)")]
    IndexOutOfRange {
        name: String,
        index: u16,
        capacity: u16,
    },

    #[error("peripheral '{0}' not found")]
    UnknownPeripheral(String),
}

/// Name <-> index table for register blocks.
#[derive(Debug, Clone, Default)]
pub struct PeripheralIndexTable {
    capacity: u16,
    by_index: BTreeMap<u16, String>,
    by_name: BTreeMap<String, u16>,
}

impl PeripheralIndexTable {
    /// Create an empty table with `capacity` slots (indices `0..capacity`).
    pub fn new(capacity: u16) -> Self {
        Self {
            capacity,
            by_index: BTreeMap::new(),
            by_name: BTreeMap::new(),
        }
    }

    /// Number of slots available for a CSR window of `window_size` bytes.
    pub fn capacity_for_window(window_size: u64) -> u16 {
        u16::try_from(window_size / CSR_PAGING).unwrap_or(u16::MAX)
    }

    /// Populate a table from a fixed list of curated peripherals.
    pub fn from_enumeration(
        peripherals: &[Peripheral],
        capacity: u16,
    ) -> Result<Self, PeripheralError> {
        let mut table = Self::new(capacity);
        for p in peripherals {
            table.register(p.name(), p.index())?;
        }
        Ok(table)
    }

    /// Populate a table with every curated peripheral.
    pub fn standard(capacity: u16) -> Result<Self, PeripheralError> {
        Self::from_enumeration(&Peripheral::ALL, capacity)
    }

    /// Register a peripheral at a fixed index.
    pub fn register(&mut self, name: impl Into<String>, index: u16) -> Result<(), PeripheralError> {
        let name = name.into();
        if index >= self.capacity {
            return Err(PeripheralError::IndexOutOfRange {
                name,
                index,
                capacity: self.capacity,
            });
        }
        if self.by_name.contains_key(&name) {
            return Err(PeripheralError::DuplicateName(name));
        }
        if let Some(existing) = self.by_index.get(&index) {
            return Err(PeripheralError::DuplicateIndex {
                name,
                index,
                existing: existing.clone(),
            });
        }
        debug!(peripheral = %name, index, "registered peripheral");
        self.by_index.insert(index, name.clone());
        self.by_name.insert(name, index);
        Ok(())
    }

    /// Index of a registered peripheral.
    pub fn index_of(&self, name: &str) -> Result<u16, PeripheralError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PeripheralError::UnknownPeripheral(name.to_string()))
    }

    /// Name registered at `index`, if any.
    pub fn name_at(&self, index: u16) -> Option<&str> {
        self.by_index.get(&index).map(String::as_str)
    }

    pub fn capacity(&self) -> u16 {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Entries ordered by index.
    pub fn entries(&self) -> Vec<PeripheralEntry> {
        self.by_index
            .iter()
            .map(|(index, name)| PeripheralEntry {
                name: name.clone(),
                index: *index,
            })
            .collect()
    }
}
