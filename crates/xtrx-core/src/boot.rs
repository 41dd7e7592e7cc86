//! Boot-mode resolution.
//!
//! The CPU either starts from firmware preloaded into `main_ram` by the
//! bitstream, or executes in place from a firmware window inside the SPI
//! flash. The choice is made once at composition time.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::address::{AddressError, AddressSpaceRegistry, Region};

/// Constant exported when booting from `main_ram`.
pub const ROM_BOOT_ADDRESS: &str = "ROM_BOOT_ADDRESS";
/// Constant exported when booting from the flash firmware window.
pub const FLASH_BOOT_ADDRESS: &str = "FLASH_BOOT_ADDRESS";
/// Default offset of the firmware window inside the SPI flash.
pub const DEFAULT_FIRMWARE_FLASH_OFFSET: u64 = 0x22_0000;
/// Size of the firmware window (256 KiB).
pub const FIRMWARE_FLASH_REGION_SIZE: u64 = 0x4_0000;

/// Where the CPU fetches its first instruction from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    /// Firmware is embedded in the bitstream as `main_ram` initial contents.
    InFabric,
    /// Firmware is programmed separately into SPI flash and executed in place.
    ExternalFlash,
}

impl BootMode {
    pub fn from_flash_boot(flash_boot: bool) -> Self {
        if flash_boot {
            BootMode::ExternalFlash
        } else {
            BootMode::InFabric
        }
    }

    /// Name of the constant carrying the boot address.
    pub fn constant_name(self) -> &'static str {
        match self {
            BootMode::InFabric => ROM_BOOT_ADDRESS,
            BootMode::ExternalFlash => FLASH_BOOT_ADDRESS,
        }
    }
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::InFabric => write!(f, "in-fabric"),
            BootMode::ExternalFlash => write!(f, "external-flash"),
        }
    }
}

/// Which SPI-flash controller the SoC carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashController {
    /// Register-driven flash access for general reads and writes; not on the boot path.
    GeneralPurpose,
    /// Memory-mapped controller configured for execute-in-place boot.
    Boot,
}

/// A named integer exported to firmware startup code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BootConstant {
    pub name: String,
    pub value: u64,
}

/// The resolved boot decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootPlan {
    pub mode: BootMode,
    pub boot_address: u64,
    /// Linked firmware window, present only for flash boot.
    pub flash_region: Option<Region>,
    pub flash_controller: FlashController,
    pub constant: BootConstant,
}

/// Errors raised while resolving the boot plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootError {
    #[error("in-fabric boot requires a '{0}' region")]
    MissingMainRam(String),

    #[error("flash boot requires a committed flash region '{0}'")]
    MissingFlashRegion(String),

    #[error("firmware flash window: {0}")]
    Window(#[from] AddressError),
}

/// Resolves a [`BootMode`] against committed regions.
#[derive(Debug, Clone)]
pub struct BootModeResolver {
    pub mode: BootMode,
    /// Region holding in-fabric firmware.
    pub main_ram: String,
    /// Memory-mapped SPI flash region.
    pub flash: String,
    /// Name of the linked firmware window created for flash boot.
    pub window: String,
    pub firmware_flash_offset: u64,
    pub window_size: u64,
}

impl BootModeResolver {
    /// A resolver using the standard region names and window size.
    pub fn new(mode: BootMode, firmware_flash_offset: u64) -> Self {
        Self {
            mode,
            main_ram: "main_ram".into(),
            flash: "spiflash".into(),
            window: "flash".into(),
            firmware_flash_offset,
            window_size: FIRMWARE_FLASH_REGION_SIZE,
        }
    }

    /// Resolve the plan, committing the firmware window for flash boot.
    pub fn resolve(&self, regions: &mut AddressSpaceRegistry) -> Result<BootPlan, BootError> {
        let plan = match self.mode {
            BootMode::InFabric => {
                let main_ram = regions
                    .get(&self.main_ram)
                    .ok_or_else(|| BootError::MissingMainRam(self.main_ram.clone()))?;
                BootPlan {
                    mode: self.mode,
                    boot_address: main_ram.origin,
                    flash_region: None,
                    flash_controller: FlashController::GeneralPurpose,
                    constant: BootConstant {
                        name: self.mode.constant_name().into(),
                        value: main_ram.origin,
                    },
                }
            }
            BootMode::ExternalFlash => {
                if regions.get(&self.flash).is_none() {
                    return Err(BootError::MissingFlashRegion(self.flash.clone()));
                }
                let window = regions
                    .add_linked_region(
                        self.window.clone(),
                        &self.flash,
                        self.firmware_flash_offset,
                        self.window_size,
                    )?
                    .clone();
                BootPlan {
                    mode: self.mode,
                    boot_address: window.origin,
                    flash_controller: FlashController::Boot,
                    constant: BootConstant {
                        name: self.mode.constant_name().into(),
                        value: window.origin,
                    },
                    flash_region: Some(window),
                }
            }
        };
        info!(
            mode = %plan.mode,
            boot_address = %format!("0x{:08x}", plan.boot_address),
            "resolved boot plan"
        );
        Ok(plan)
    }
}
