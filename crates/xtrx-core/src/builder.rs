//! Explicit composition builder.
//!
//! Every composition step goes through a [`SocBuilder`] passed by mutable
//! reference; [`SocBuilder::build`] consumes it and yields an immutable
//! [`ComposedSoc`].
//!
//! # Example
//!
//! ```rust
//! use xtrx_core::boot::{BootMode, BootModeResolver};
//! use xtrx_core::builder::SocBuilder;
//! use xtrx_core::peripheral::Peripheral;
//!
//! let mut b = SocBuilder::new("demo", 32);
//! b.add_region("main_ram", 0x4000_0000, 0x4000).unwrap();
//! b.add_region("csr", 0xf000_0000, 0x1_0000).unwrap();
//! b.register_peripherals("csr", &[Peripheral::Uart]).unwrap();
//! b.resolve_boot(&BootModeResolver::new(BootMode::InFabric, 0)).unwrap();
//!
//! let soc = b.build().unwrap();
//! assert_eq!(soc.boot.boot_address, 0x4000_0000);
//! assert_eq!(soc.peripheral_address("uart"), Some(0xf000_0000));
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address::{AddressSpaceRegistry, Region};
use crate::boot::{BootModeResolver, BootPlan};
use crate::error::{Result, SocError};
use crate::peripheral::{Peripheral, PeripheralEntry, PeripheralIndexTable};
use crate::stream::{StreamInterconnect, StreamLink};
use crate::timing::{TimingDomainManager, TimingModel};

/// An opaque building block attached to the SoC, recorded with its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: String,
    pub params: BTreeMap<String, String>,
}

impl Component {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }
}

/// Pack bytes into little-endian 32-bit words, zero-padding the tail.
pub fn pack_words_le(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|chunk| {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Builder threaded through one composition run.
#[derive(Debug)]
pub struct SocBuilder {
    ident: String,
    regions: AddressSpaceRegistry,
    peripherals: PeripheralIndexTable,
    csr_region: Option<String>,
    timing: TimingDomainManager,
    streams: StreamInterconnect,
    constants: BTreeMap<String, u64>,
    components: Vec<Component>,
    memory_init: BTreeMap<String, Vec<u32>>,
    boot: Option<BootPlan>,
}

impl SocBuilder {
    /// Start a composition for a bus of `address_width` bits.
    pub fn new(ident: impl Into<String>, address_width: u32) -> Self {
        Self {
            ident: ident.into(),
            regions: AddressSpaceRegistry::new(address_width),
            peripherals: PeripheralIndexTable::new(0),
            csr_region: None,
            timing: TimingDomainManager::new(),
            streams: StreamInterconnect::new(),
            constants: BTreeMap::new(),
            components: Vec::new(),
            memory_init: BTreeMap::new(),
            boot: None,
        }
    }

    // === Address space ===

    pub fn add_region(&mut self, name: &str, origin: u64, size: u64) -> Result<&Region> {
        Ok(self.regions.add_region(name, origin, size)?)
    }

    pub fn add_linker_region(&mut self, name: &str, origin: u64, size: u64) -> Result<&Region> {
        Ok(self.regions.add_linker_region(name, origin, size)?)
    }

    pub fn add_linked_region(
        &mut self,
        name: &str,
        base: &str,
        offset: u64,
        size: u64,
    ) -> Result<&Region> {
        Ok(self.regions.add_linked_region(name, base, offset, size)?)
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    pub fn regions(&self) -> &AddressSpaceRegistry {
        &self.regions
    }

    // === Peripherals ===

    /// Populate the index table for the CSR window `csr_region`.
    ///
    /// The window must already be committed; its size bounds the indices.
    pub fn register_peripherals(&mut self, csr_region: &str, list: &[Peripheral]) -> Result<()> {
        if self.csr_region.is_some() {
            return Err(SocError::Configuration(
                "peripheral table already populated".into(),
            ));
        }
        let window = self.regions.lookup(csr_region)?;
        let capacity = PeripheralIndexTable::capacity_for_window(window.size);
        self.peripherals = PeripheralIndexTable::from_enumeration(list, capacity)?;
        self.csr_region = Some(csr_region.to_string());
        Ok(())
    }

    /// Register an additional peripheral at a fixed index.
    pub fn register_peripheral(&mut self, name: &str, index: u16) -> Result<()> {
        if self.csr_region.is_none() {
            return Err(SocError::Configuration(format!(
                "peripheral '{name}' registered before the CSR window"
            )));
        }
        Ok(self.peripherals.register(name, index)?)
    }

    pub fn peripherals(&self) -> &PeripheralIndexTable {
        &self.peripherals
    }

    // === Timing ===

    pub fn timing_mut(&mut self) -> &mut TimingDomainManager {
        &mut self.timing
    }

    pub fn timing(&self) -> &TimingDomainManager {
        &self.timing
    }

    // === Streams ===

    pub fn streams_mut(&mut self) -> &mut StreamInterconnect {
        &mut self.streams
    }

    // === Constants, components and memory contents ===

    pub fn add_constant(&mut self, name: &str, value: u64) -> Result<()> {
        if self.constants.contains_key(name) {
            return Err(SocError::DuplicateConstant(name.to_string()));
        }
        debug!(constant = name, value, "added constant");
        self.constants.insert(name.to_string(), value);
        Ok(())
    }

    pub fn attach(&mut self, component: Component) {
        debug!(component = %component.name, kind = %component.kind, "attached component");
        self.components.push(component);
    }

    /// Preload a committed region with `bytes`, packed as little-endian words.
    pub fn init_memory(&mut self, region: &str, bytes: &[u8]) -> Result<()> {
        let target = self.regions.lookup(region)?;
        let len = bytes.len() as u64;
        if len > target.size {
            return Err(SocError::InitTooLarge {
                region: region.to_string(),
                bytes: len,
                size: target.size,
            });
        }
        debug!(region, bytes = len, "initialized memory contents");
        self.memory_init
            .insert(region.to_string(), pack_words_le(bytes));
        Ok(())
    }

    // === Boot ===

    /// Resolve the boot plan and export its boot constant.
    pub fn resolve_boot(&mut self, resolver: &BootModeResolver) -> Result<&BootPlan> {
        if self.boot.is_some() {
            return Err(SocError::BootAlreadyResolved);
        }
        let constant = resolver.mode.constant_name();
        if self.constants.contains_key(constant) {
            return Err(SocError::DuplicateConstant(constant.to_string()));
        }
        let plan = resolver.resolve(&mut self.regions)?;
        self.add_constant(&plan.constant.name, plan.constant.value)?;
        Ok(self.boot.insert(plan))
    }

    pub fn boot(&self) -> Option<&BootPlan> {
        self.boot.as_ref()
    }

    /// Freeze the composition.
    ///
    /// Timing exceptions are frozen as declared; completeness is checked by
    /// the caller when the constraints are about to be consumed.
    pub fn build(self) -> Result<ComposedSoc> {
        let boot = self.boot.ok_or(SocError::BootUnresolved)?;
        self.regions.check_invariants()?;
        let csr_base = match &self.csr_region {
            Some(name) => Some(self.regions.lookup(name)?.origin),
            None => None,
        };
        Ok(ComposedSoc {
            ident: self.ident,
            address_width: self.regions.address_width(),
            regions: self.regions.into_regions(),
            csr_base,
            peripherals: self.peripherals.entries(),
            timing: self.timing.freeze(),
            streams: self.streams.into_links(),
            constants: self.constants,
            components: self.components,
            memory_init: self.memory_init,
            boot,
        })
    }
}

/// An immutable composed system description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedSoc {
    pub ident: String,
    pub address_width: u32,
    /// Regions ordered by origin, bases before their aliases.
    pub regions: Vec<Region>,
    /// Origin of the CSR window, if peripherals were registered.
    pub csr_base: Option<u64>,
    /// Peripherals ordered by index.
    pub peripherals: Vec<PeripheralEntry>,
    pub timing: TimingModel,
    pub streams: Vec<StreamLink>,
    pub constants: BTreeMap<String, u64>,
    pub components: Vec<Component>,
    /// Region name -> initial contents as little-endian words.
    pub memory_init: BTreeMap<String, Vec<u32>>,
    pub boot: BootPlan,
}

impl ComposedSoc {
    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.name == name)
    }

    pub fn peripheral(&self, name: &str) -> Option<&PeripheralEntry> {
        self.peripherals.iter().find(|p| p.name == name)
    }

    /// Absolute register-block address of a peripheral.
    pub fn peripheral_address(&self, name: &str) -> Option<u64> {
        let base = self.csr_base?;
        self.peripheral(name).map(|p| p.address(base))
    }

    pub fn constant(&self, name: &str) -> Option<u64> {
        self.constants.get(name).copied()
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Initial contents of a region, empty when none were set.
    pub fn memory_init(&self, region: &str) -> &[u32] {
        self.memory_init
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}
