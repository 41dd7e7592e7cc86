//! Board models for the XTRX card family.
//!
//! A board fixes everything the composition cannot choose:
//! - **FPGA device:** part number and PCIe lane count
//! - **SPI flash:** chip model and size
//! - **CPU memory map:** the regions the SoC bus exposes
//!
//! Built-in boards cover the supported cards; other boards can be described
//! in `.board.toml` files and validated with [`parse::validate_board`].

pub mod board;
pub mod error;
pub mod parse;

pub use board::{Board, BoardName, FlashChip, MemoryRegion};
pub use error::{Result, TargetError};
