//! Two-phase build orchestrator.
//!
//! Firmware must be compiled against the SoC's memory map, yet the hardware
//! image embeds the compiled firmware. The orchestrator breaks the cycle:
//!
//! 1. **prepare:** compose without a payload and export the map
//! 2. the firmware compiler builds against the exported map
//! 3. **finalize:** compose again with identical parameters, place the
//!    payload and request the hardware image

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, warn};
use xtrx_core::boot::BootMode;
use xtrx_core::{SocBuilder, SocError};

use crate::artifact::{
    BuildArtifact, FirmwarePayload, FlashProgramming, MapExport, OutputDescriptor, Phase,
};
use crate::backend::{FirmwareCompiler, ImageBackend, ImageRequest};
use crate::error::{BuildError, Result};
use crate::export::{write_exports, ConstraintExporter, XdcExporter};
use crate::params::CompositionFingerprint;
use crate::report::{BuildReport, PayloadPlacement};
use crate::soc::Composition;

/// Region receiving in-fabric firmware.
const MAIN_RAM: &str = "main_ram";

/// How `finalize` treats a payload compiled for a different composition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PhaseCheck {
    /// Abort with [`BuildError::PhaseMismatch`].
    #[default]
    Strict,
    /// Log a warning, record the mismatch and carry on.
    Lenient,
}

/// Configuration for the build orchestrator.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Directory receiving exports and the gateware.
    pub output_dir: PathBuf,
    /// Whether `finalize` requests a hardware image.
    pub build_image: bool,
    pub phase_check: PhaseCheck,
    /// Whether `finalize` requires a complete timing model.
    pub enforce_timing: bool,
}

impl BuildConfig {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            build_image: false,
            phase_check: PhaseCheck::default(),
            enforce_timing: true,
        }
    }

    pub fn with_image(mut self, build_image: bool) -> Self {
        self.build_image = build_image;
        self
    }

    pub fn with_phase_check(mut self, check: PhaseCheck) -> Self {
        self.phase_check = check;
        self
    }
}

/// Output of a complete two-phase run.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub prepared: BuildArtifact,
    pub finalized: BuildArtifact,
    pub report: BuildReport,
}

/// Runs the prepare and finalize phases for one composition.
pub struct BuildOrchestrator<'a> {
    composition: &'a dyn Composition,
    config: BuildConfig,
    constraints: Box<dyn ConstraintExporter>,
}

impl<'a> BuildOrchestrator<'a> {
    pub fn new(composition: &'a dyn Composition, config: BuildConfig) -> Self {
        Self {
            composition,
            config,
            constraints: Box::new(XdcExporter),
        }
    }

    /// Render timing constraints with a different exporter.
    pub fn with_constraint_exporter(mut self, exporter: Box<dyn ConstraintExporter>) -> Self {
        self.constraints = exporter;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Name of the hardware image files.
    pub fn build_name(&self) -> String {
        format!("{}_xtrx", self.composition.params().board.name)
    }

    pub fn gateware_dir(&self) -> PathBuf {
        self.config.output_dir.join("gateware")
    }

    fn compose(&self) -> Result<(SocBuilder, CompositionFingerprint)> {
        let params = self.composition.params();
        let fingerprint = params.fingerprint()?;
        let mut soc = SocBuilder::new(params.board.ident(), params.board.address_width);
        self.composition.compose(&mut soc)?;
        Ok((soc, fingerprint))
    }

    /// Compose without a payload and export the memory map.
    pub fn prepare(&self) -> Result<BuildArtifact> {
        info!(phase = %Phase::Prepare, output_dir = %self.config.output_dir.display(), "starting phase");
        let (builder, fingerprint) = self.compose()?;
        let soc = builder.build()?;

        // Enforced at finalize; the firmware build does not need it.
        for (a, b) in soc.timing.missing_exceptions() {
            warn!(a = %a, b = %b, "unrelated clock domains have no timing exception");
        }

        let map = MapExport::new(&soc, fingerprint);
        let exports = write_exports(
            &self.config.output_dir,
            &soc,
            &map,
            self.constraints.as_ref(),
        )?;
        info!(
            phase = %Phase::Prepare,
            fingerprint = map.fingerprint.short(),
            boot_address = %format!("0x{:08x}", map.boot_address),
            "exported memory map"
        );

        Ok(BuildArtifact {
            phase: Phase::Prepare,
            soc,
            map,
            firmware_payload: None,
            flash_programming: None,
            phase_mismatches: Vec::new(),
            output: OutputDescriptor {
                output_dir: self.config.output_dir.clone(),
                exports,
                bitstream: None,
            },
        })
    }

    /// Compose again with the payload and request the hardware image.
    ///
    /// Nothing reaches the image backend unless every check passes.
    pub fn finalize(
        &self,
        payload: FirmwarePayload,
        backend: Option<&dyn ImageBackend>,
    ) -> Result<BuildArtifact> {
        info!(phase = %Phase::Finalize, payload_bytes = payload.len(), "starting phase");
        let (mut builder, fingerprint) = self.compose()?;
        let boot = builder.boot().cloned().ok_or(SocError::BootUnresolved)?;

        let phase_mismatches = self.check_phase(&payload, &fingerprint, boot.boot_address)?;
        if payload.is_empty() {
            return Err(BuildError::Configuration("firmware payload is empty".into()));
        }

        let flash_programming = match boot.mode {
            BootMode::InFabric => {
                builder.init_memory(MAIN_RAM, &payload.image)?;
                None
            }
            BootMode::ExternalFlash => {
                let window = boot.flash_region.as_ref().map_or(0, |r| r.size);
                let bytes = payload.len() as u64;
                if bytes > window {
                    return Err(BuildError::Configuration(format!(
                        "firmware ({bytes} bytes) exceeds the {window}-byte flash window"
                    )));
                }
                Some(FlashProgramming {
                    offset: self.composition.params().firmware_flash_offset,
                    image: payload.image.clone(),
                })
            }
        };

        let soc = builder.build()?;
        if self.config.enforce_timing {
            soc.timing.validate()?;
        }

        let map = MapExport::new(&soc, fingerprint);
        let exports = write_exports(
            &self.config.output_dir,
            &soc,
            &map,
            self.constraints.as_ref(),
        )?;

        let bitstream = if self.config.build_image {
            let backend = backend.ok_or_else(|| {
                BuildError::Configuration("hardware image requested without an image backend".into())
            })?;
            let gateware_dir = self.gateware_dir();
            let build_name = self.build_name();
            let request = ImageRequest {
                soc: &soc,
                fpga_device: &self.composition.params().board.fpga_device,
                build_name: &build_name,
                exports: &exports,
                gateware_dir: &gateware_dir,
            };
            Some(backend.build_image(&request)?)
        } else {
            None
        };

        Ok(BuildArtifact {
            phase: Phase::Finalize,
            soc,
            map,
            firmware_payload: Some(payload),
            flash_programming,
            phase_mismatches,
            output: OutputDescriptor {
                output_dir: self.config.output_dir.clone(),
                exports,
                bitstream,
            },
        })
    }

    fn check_phase(
        &self,
        payload: &FirmwarePayload,
        fingerprint: &CompositionFingerprint,
        boot_address: u64,
    ) -> Result<Vec<String>> {
        let mut mismatches = Vec::new();
        if payload.entry != boot_address {
            mismatches.push(format!(
                "firmware entry 0x{:08x} does not match boot address 0x{:08x}",
                payload.entry, boot_address
            ));
        }
        if &payload.fingerprint != fingerprint {
            mismatches.push(format!(
                "firmware was compiled for composition {} but finalize composes {}",
                payload.fingerprint.short(),
                fingerprint.short()
            ));
        }
        if mismatches.is_empty() {
            return Ok(mismatches);
        }
        match self.config.phase_check {
            PhaseCheck::Strict => Err(BuildError::PhaseMismatch {
                reason: mismatches.join("; "),
            }),
            PhaseCheck::Lenient => {
                for m in &mismatches {
                    warn!(phase = %Phase::Finalize, "{m}");
                }
                Ok(mismatches)
            }
        }
    }

    /// Run prepare, the firmware compiler and finalize.
    pub fn run(
        &self,
        compiler: &dyn FirmwareCompiler,
        backend: Option<&dyn ImageBackend>,
    ) -> Result<BuildOutput> {
        let start = Instant::now();
        let prepared = self.prepare()?;
        let payload = compiler.compile(&prepared.map, &self.config.output_dir)?;
        let finalized = self.finalize(payload, backend)?;
        let duration_ms = start.elapsed().as_millis() as u64;
        let report = self.report(&finalized, duration_ms);
        Ok(BuildOutput {
            prepared,
            finalized,
            report,
        })
    }

    /// Summarize a finalized artifact.
    pub fn report(&self, finalized: &BuildArtifact, duration_ms: u64) -> BuildReport {
        let soc = &finalized.soc;
        let placement = match &finalized.flash_programming {
            Some(fp) => PayloadPlacement::Flash { offset: fp.offset },
            None => PayloadPlacement::MainRam {
                words: soc.memory_init(MAIN_RAM).len(),
            },
        };
        BuildReport {
            board: self.composition.params().board.name.clone(),
            ident: soc.ident.clone(),
            fingerprint: finalized.map.fingerprint.short().to_string(),
            boot_mode: soc.boot.mode,
            boot_address: soc.boot.boot_address,
            duration_ms,
            regions: soc.regions.len(),
            peripherals: soc.peripherals.len(),
            clock_domains: soc.timing.domains.len(),
            timing_exceptions: soc.timing.exceptions.len(),
            stream_links: soc.streams.len(),
            payload_bytes: finalized.firmware_payload.as_ref().map_or(0, |p| p.len()),
            placement,
            phase_mismatches: finalized.phase_mismatches.clone(),
            exports: finalized.output.exports.clone(),
            bitstream: finalized.output.bitstream.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SocParams;
    use crate::soc::XtrxSoc;
    use xtrx_core::TimingModel;
    use xtrx_targets::BoardName;

    /// Lists each asynchronous pair on one line.
    struct PairListExporter;

    impl ConstraintExporter for PairListExporter {
        fn file_name(&self) -> &str {
            "clock_pairs.txt"
        }

        fn render(&self, timing: &TimingModel) -> String {
            timing
                .exceptions
                .iter()
                .map(|e| format!("{} {} {}\n", e.kind, e.a, e.b))
                .collect()
        }
    }

    #[test]
    fn prepare_has_no_payload() {
        let dir = tempfile::tempdir().unwrap();
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::Limesdr));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new(dir.path()));
        let prepared = orch.prepare().unwrap();
        assert_eq!(prepared.phase, Phase::Prepare);
        assert!(prepared.firmware_payload.is_none());
        assert!(prepared.output.bitstream.is_none());
        assert!(prepared.soc.memory_init(MAIN_RAM).is_empty());
        assert_eq!(prepared.output.exports.len(), 4);
    }

    #[test]
    fn finalize_places_payload_in_main_ram() {
        let dir = tempfile::tempdir().unwrap();
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::Limesdr));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new(dir.path()));
        let prepared = orch.prepare().unwrap();
        let payload = FirmwarePayload::for_map(vec![1, 2, 3, 4, 5], &prepared.map);

        let finalized = orch.finalize(payload, None).unwrap();
        assert_eq!(finalized.phase, Phase::Finalize);
        assert_eq!(finalized.soc.memory_init(MAIN_RAM), &[0x0403_0201, 0x05]);
        assert!(finalized.flash_programming.is_none());
        assert_eq!(finalized.map, prepared.map);

        let report = orch.report(&finalized, 0);
        assert_eq!(report.placement, PayloadPlacement::MainRam { words: 2 });
        assert_eq!(report.payload_bytes, 5);
    }

    #[test]
    fn image_request_needs_backend() {
        let dir = tempfile::tempdir().unwrap();
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::Limesdr));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new(dir.path()).with_image(true));
        let prepared = orch.prepare().unwrap();
        let payload = FirmwarePayload::for_map(vec![0; 4], &prepared.map);
        let err = orch.finalize(payload, None).unwrap_err();
        assert!(matches!(err, BuildError::Configuration(_)));
    }

    #[test]
    fn empty_payload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::FairwavesCs));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new(dir.path()));
        let prepared = orch.prepare().unwrap();
        let payload = FirmwarePayload::for_map(Vec::new(), &prepared.map);
        assert!(matches!(
            orch.finalize(payload, None),
            Err(BuildError::Configuration(_))
        ));
    }

    #[test]
    fn build_name_follows_board() {
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::FairwavesPro));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new("build"));
        assert_eq!(orch.build_name(), "fairwaves_pro_xtrx");
        assert_eq!(orch.gateware_dir(), PathBuf::from("build/gateware"));
    }

    #[test]
    fn custom_constraint_exporter_replaces_xdc() {
        let dir = tempfile::tempdir().unwrap();
        let soc = XtrxSoc::new(SocParams::for_board(BoardName::Limesdr));
        let orch = BuildOrchestrator::new(&soc, BuildConfig::new(dir.path()))
            .with_constraint_exporter(Box::new(PairListExporter));
        let prepared = orch.prepare().unwrap();

        let pairs = dir.path().join("clock_pairs.txt");
        assert!(prepared.output.exports.contains(&pairs));
        assert!(!dir.path().join("timing.xdc").exists());
        let text = std::fs::read_to_string(pairs).unwrap();
        assert_eq!(text.lines().count(), prepared.soc.timing.exceptions.len());
        assert!(text.contains("asynchronous jtag pcie"));
    }
}
