//! Composition errors.

use thiserror::Error;

use crate::address::AddressError;
use crate::boot::BootError;
use crate::peripheral::PeripheralError;
use crate::stream::StreamError;
use crate::timing::TimingError;

/// Errors that can occur while composing a system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SocError {
    #[error("address space: {0}")]
    Address(#[from] AddressError),

    #[error("peripheral table: {0}")]
    Peripheral(#[from] PeripheralError),

    #[error("timing: {0}")]
    Timing(#[from] TimingError),

    #[error("stream interconnect: {0}")]
    Stream(#[from] StreamError),

    #[error("boot: {0}")]
    Boot(#[from] BootError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("constant '{0}' already defined")]
    DuplicateConstant(String),

    #[error("initial contents for '{region}' ({bytes} bytes) exceed its size ({size} bytes)")]
    InitTooLarge { region: String, bytes: u64, size: u64 },

    #[error("boot plan already resolved")]
    BootAlreadyResolved,

    #[error("boot plan was never resolved")]
    BootUnresolved,
}

/// Result type for composition.
pub type Result<T> = std::result::Result<T, SocError>;
