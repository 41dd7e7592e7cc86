//! CLI command implementations.

pub mod build;
pub mod driver;
pub mod program;
