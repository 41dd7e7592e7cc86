//! Address-space allocation for the SoC bus.
//!
//! Regions are committed one at a time and never modified afterwards. A
//! primary region may not intersect any other primary region. A linked region
//! aliases a sub-range of exactly one primary region (its base) and may only
//! intersect that base.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// A named, address-bounded slice of the bus address space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    /// Region name (e.g., "main_ram", "spiflash").
    pub name: String,
    /// First address of the region.
    pub origin: u64,
    /// Size in bytes.
    pub size: u64,
    /// Whether the region is emitted into the firmware linker script.
    pub linked: bool,
    /// Name of the primary region this one aliases, if any.
    pub alias_of: Option<String>,
}

impl Region {
    /// Create a primary, non-linker region.
    pub fn new(name: impl Into<String>, origin: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            origin,
            size,
            linked: false,
            alias_of: None,
        }
    }

    /// Mark the region as linker-visible.
    pub fn linked(mut self) -> Self {
        self.linked = true;
        self
    }

    /// One past the last address of the region.
    ///
    /// Saturates instead of wrapping; committed regions never saturate because
    /// the registry rejects regions that leave the address space.
    pub fn end(&self) -> u64 {
        self.origin.saturating_add(self.size)
    }

    /// Whether `addr` falls inside the region.
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.origin && addr < self.end()
    }

    /// Whether the half-open intervals of the two regions intersect.
    pub fn overlaps(&self, other: &Region) -> bool {
        self.origin < other.end() && other.origin < self.end()
    }

    /// Whether this region aliases another region.
    pub fn is_alias(&self) -> bool {
        self.alias_of.is_some()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 0x{:08x}..0x{:08x} ({} bytes)",
            self.name,
            self.origin,
            self.end(),
            self.size
        )?;
        if let Some(base) = &self.alias_of {
            write!(f, " alias of {base}")?;
        }
        Ok(())
    }
}

/// Errors raised while committing regions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("region '{0}' already exists")]
    DuplicateRegion(String),

    #[error("region '{0}' has zero size")]
    EmptyRegion(String),

    #[error("region '{name}' (0x{origin:x} + 0x{size:x}) leaves the {width}-bit address space")]
    OutsideAddressSpace {
        name: String,
        origin: u64,
        size: u64,
        width: u32,
    },

    #[error(
        "region '{name}' (0x{origin:x}..0x{end:x}) overlaps '{other}' (0x{other_origin:x}..0x{other_end:x})"
    )]
    Overlap {
        name: String,
        origin: u64,
        end: u64,
        other: String,
        other_origin: u64,
        other_end: u64,
    },

    #[error(
        "linked region '{name}' (offset 0x{offset:x}, size 0x{size:x}) does not fit in '{base}' (size 0x{base_size:x})"
    )]
    OutOfBounds {
        name: String,
        base: String,
        offset: u64,
        size: u64,
        base_size: u64,
    },

    #[error("linked region '{name}' cannot alias '{base}', which is itself linked to another region")]
    AliasOfAlias { name: String, base: String },

    #[error("region '{0}' not found")]
    UnknownRegion(String),
}

fn overlap_error(new: &Region, existing: &Region) -> AddressError {
    AddressError::Overlap {
        name: new.name.clone(),
        origin: new.origin,
        end: new.end(),
        other: existing.name.clone(),
        other_origin: existing.origin,
        other_end: existing.end(),
    }
}

/// Registry of committed regions for one bus.
///
/// Primary regions are indexed by origin so each insertion only checks its
/// two neighbours.
#[derive(Debug, Clone)]
pub struct AddressSpaceRegistry {
    address_width: u32,
    regions: BTreeMap<String, Region>,
    /// Origin -> name, primary regions only.
    primary: BTreeMap<u64, String>,
}

impl AddressSpaceRegistry {
    /// Create an empty registry for a bus of `address_width` bits (clamped to 64).
    pub fn new(address_width: u32) -> Self {
        Self {
            address_width: address_width.min(64),
            regions: BTreeMap::new(),
            primary: BTreeMap::new(),
        }
    }

    /// Bus address width in bits.
    pub fn address_width(&self) -> u32 {
        self.address_width
    }

    /// Number of committed regions, aliases included.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    /// Whether no region has been committed.
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Commit a primary region.
    pub fn add_region(
        &mut self,
        name: impl Into<String>,
        origin: u64,
        size: u64,
    ) -> Result<&Region, AddressError> {
        self.add(Region::new(name, origin, size))
    }

    /// Commit a primary, linker-visible region.
    pub fn add_linker_region(
        &mut self,
        name: impl Into<String>,
        origin: u64,
        size: u64,
    ) -> Result<&Region, AddressError> {
        self.add(Region::new(name, origin, size).linked())
    }

    /// Commit a prepared primary region.
    pub fn add(&mut self, region: Region) -> Result<&Region, AddressError> {
        let mut region = region;
        region.alias_of = None;
        self.check_shape(&region)?;

        if let Some((_, name)) = self.primary.range(..=region.origin).next_back() {
            let before = &self.regions[name];
            if before.overlaps(&region) {
                return Err(overlap_error(&region, before));
            }
        }
        if let Some((_, name)) = self.primary.range(region.origin..).next() {
            let after = &self.regions[name];
            if after.overlaps(&region) {
                return Err(overlap_error(&region, after));
            }
        }

        debug!(region = %region, "committed region");
        self.primary.insert(region.origin, region.name.clone());
        Ok(self.commit(region))
    }

    /// Commit a linker-visible alias of `size` bytes at `offset` inside `base`.
    pub fn add_linked_region(
        &mut self,
        name: impl Into<String>,
        base: &str,
        offset: u64,
        size: u64,
    ) -> Result<&Region, AddressError> {
        let name = name.into();
        let base_region = self
            .regions
            .get(base)
            .ok_or_else(|| AddressError::UnknownRegion(base.to_string()))?;
        if base_region.is_alias() {
            return Err(AddressError::AliasOfAlias {
                name,
                base: base.to_string(),
            });
        }
        if size == 0 {
            return Err(AddressError::EmptyRegion(name));
        }
        let fits = offset
            .checked_add(size)
            .is_some_and(|end| end <= base_region.size);
        let origin = base_region.origin.checked_add(offset);
        let origin = match origin {
            Some(origin) if fits => origin,
            _ => {
                return Err(AddressError::OutOfBounds {
                    name,
                    base: base.to_string(),
                    offset,
                    size,
                    base_size: base_region.size,
                })
            }
        };

        let region = Region {
            name,
            origin,
            size,
            linked: true,
            alias_of: Some(base.to_string()),
        };
        self.check_shape(&region)?;

        // Aliases of the same base are not aliases of each other.
        if let Some(sibling) = self
            .regions
            .values()
            .filter(|r| r.alias_of.as_deref() == Some(base))
            .find(|r| r.overlaps(&region))
        {
            return Err(overlap_error(&region, sibling));
        }

        debug!(region = %region, "committed linked region");
        Ok(self.commit(region))
    }

    /// Look up a committed region by name.
    pub fn lookup(&self, name: &str) -> Result<&Region, AddressError> {
        self.regions
            .get(name)
            .ok_or_else(|| AddressError::UnknownRegion(name.to_string()))
    }

    /// Look up a committed region by name, if present.
    pub fn get(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    /// All committed regions ordered by origin, bases before their aliases.
    pub fn regions(&self) -> Vec<&Region> {
        let mut all: Vec<&Region> = self.regions.values().collect();
        all.sort_by(|a, b| {
            (a.origin, a.is_alias(), &a.name).cmp(&(b.origin, b.is_alias(), &b.name))
        });
        all
    }

    /// Consume the registry, returning regions ordered by origin.
    pub fn into_regions(self) -> Vec<Region> {
        let mut all: Vec<Region> = self.regions.into_values().collect();
        all.sort_by(|a, b| {
            (a.origin, a.is_alias(), &a.name).cmp(&(b.origin, b.is_alias(), &b.name))
        });
        all
    }

    /// Full pairwise audit of the committed set.
    ///
    /// Insertion already enforces this; the audit guards composed values built
    /// from several registries.
    pub fn check_invariants(&self) -> Result<(), AddressError> {
        let all = self.regions();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                let aliased = a.alias_of.as_deref() == Some(b.name.as_str())
                    || b.alias_of.as_deref() == Some(a.name.as_str());
                if !aliased && a.overlaps(b) {
                    return Err(overlap_error(b, a));
                }
            }
        }
        Ok(())
    }

    fn check_shape(&self, region: &Region) -> Result<(), AddressError> {
        if self.regions.contains_key(&region.name) {
            return Err(AddressError::DuplicateRegion(region.name.clone()));
        }
        if region.size == 0 {
            return Err(AddressError::EmptyRegion(region.name.clone()));
        }
        let end = u128::from(region.origin) + u128::from(region.size);
        if end > 1u128 << self.address_width {
            return Err(AddressError::OutsideAddressSpace {
                name: region.name.clone(),
                origin: region.origin,
                size: region.size,
                width: self.address_width,
            });
        }
        Ok(())
    }

    fn commit(&mut self, region: Region) -> &Region {
        let name = region.name.clone();
        self.regions.entry(name).or_insert(region)
    }
}
