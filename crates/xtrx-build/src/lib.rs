//! XTRX SoC composition and two-phase build.
//!
//! Builds the SoC for one board, exports its memory map, lets an external
//! firmware build compile against that map, then recomposes with the
//! firmware embedded (or scheduled for flash) and requests the hardware image:
//! composition -> prepare -> firmware compile -> finalize -> report.

pub mod artifact;
pub mod backend;
pub mod error;
pub mod export;
pub mod params;
pub mod pipeline;
pub mod report;
pub mod soc;

pub use artifact::{
    Bitstream, BuildArtifact, FirmwarePayload, FlashProgramming, MapExport, OutputDescriptor,
    Phase,
};
pub use backend::{
    CommandCompiler, CommandFramer, CommandImageBackend, CommandProgrammer, FirmwareCompiler,
    FirmwareFramer, ImageBackend, ImageRequest, Programmer,
};
pub use error::{BuildError, Result};
pub use export::{c_header, csr_csv, map_json, write_exports, ConstraintExporter, XdcExporter};
pub use params::{CompositionFingerprint, DebugBridge, SocParams};
pub use pipeline::{BuildConfig, BuildOrchestrator, BuildOutput, PhaseCheck};
pub use report::{BuildReport, PayloadPlacement};
pub use soc::{Composition, XtrxSoc};
