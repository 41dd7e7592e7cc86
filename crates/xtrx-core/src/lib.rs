//! Composition model for the XTRX System-on-Chip.
//!
//! The building blocks of a composition run:
//! - **Address space:** non-overlapping regions and linker-visible aliases
//! - **Peripheral index table:** stable register-block indices
//! - **Timing:** clock domains, period constraints and cross-domain exceptions
//! - **Streams:** valid/ready/last/data links between opaque components
//! - **Boot:** in-fabric vs. external-flash boot resolution
//!
//! [`builder::SocBuilder`] threads all of them through one composition and
//! freezes the result into a [`builder::ComposedSoc`].

pub mod address;
pub mod boot;
pub mod builder;
pub mod error;
pub mod hash;
pub mod peripheral;
pub mod stream;
pub mod timing;

pub use address::{AddressError, AddressSpaceRegistry, Region};
pub use boot::{BootError, BootMode, BootModeResolver, BootPlan, FlashController};
pub use builder::{Component, ComposedSoc, SocBuilder};
pub use error::{Result, SocError};
pub use peripheral::{Peripheral, PeripheralEntry, PeripheralError, PeripheralIndexTable};
pub use stream::{StreamEndpoint, StreamError, StreamField, StreamInterconnect, StreamLink};
pub use timing::{ExceptionKind, TimingDomainManager, TimingError, TimingModel};
