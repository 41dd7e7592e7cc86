//! The XTRX SoC composition.
//!
//! CPU memory map, peripheral register blocks, clocking, PCIe DMA and the
//! streaming bridge to the payload core. The CPU, PCIe PHY, DMA engine, AUX
//! block and payload core are opaque components; only their configuration and
//! their connections are modelled here.

use tracing::{debug, info};
use xtrx_core::boot::{BootModeResolver, FlashController};
use xtrx_core::stream::{StreamEndpoint, StreamField};
use xtrx_core::{Component, Peripheral, SocBuilder, SocError};

use crate::params::{DebugBridge, SocParams};

/// PCIe PHY user clock.
pub const PCIE_CLK_FREQ: f64 = 125e6;
/// IDELAYCTRL reference clock.
pub const IDELAY_CLK_FREQ: f64 = 200e6;
/// JTAG TCK.
pub const JTAG_CLK_FREQ: f64 = 20e6;
/// Width of the DMA streams and the PCIe PHY datapath.
pub const DMA_DATA_WIDTH: u32 = 64;

/// Clock pattern matching every PCIe PHY output clock.
const PCIE_CLOCK_PATTERN: &str = "*s7pciephy_clkout*";

/// A system that can be composed into a [`SocBuilder`].
///
/// Composition must be a pure function of [`Composition::params`]; the build
/// orchestrator runs it once per phase and relies on both runs agreeing.
pub trait Composition {
    fn params(&self) -> &SocParams;

    fn compose(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()>;
}

/// The XTRX SoC for one board and parameter set.
#[derive(Debug, Clone)]
pub struct XtrxSoc {
    params: SocParams,
}

impl XtrxSoc {
    pub fn new(params: SocParams) -> Self {
        Self { params }
    }

    fn add_memory_map(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        for r in &self.params.board.memory_regions {
            soc.add_region(&r.name, r.origin, r.size_bytes)?;
        }
        soc.register_peripherals("csr", &Peripheral::ALL)
    }

    fn add_clocking(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        let sys_clk_freq = self.params.sys_clk_freq;
        let t = soc.timing_mut();

        // PCIe PHY user clock feeds the PLL.
        t.declare_domain("pcie", PCIE_CLK_FREQ, None)?;
        t.set_clock_name("pcie", PCIE_CLOCK_PATTERN)?;
        t.declare_period_constraint("pcie", 1e9 / PCIE_CLK_FREQ)?;
        t.declare_domain("sys", sys_clk_freq, Some("pcie"))?;
        t.declare_domain("idelay", IDELAY_CLK_FREQ, Some("pcie"))?;

        // JTAG bridge or CPU debug chain.
        t.declare_domain("jtag", JTAG_CLK_FREQ, None)?;
        t.declare_period_constraint("jtag", 1e9 / JTAG_CLK_FREQ)?;

        // DNA and ICAP run from fabric-divided clocks.
        t.declare_domain("dna", sys_clk_freq / 2.0, None)?;
        t.declare_period_constraint("dna", 2e9 / sys_clk_freq)?;
        t.declare_domain("icap", sys_clk_freq / 16.0, None)?;
        t.declare_period_constraint("icap", 16e9 / sys_clk_freq)?;

        for slow in ["jtag", "dna", "icap"] {
            t.declare_false_path("sys", slow)?;
            t.declare_async("pcie", slow)?;
            t.declare_async("idelay", slow)?;
        }
        t.declare_async("jtag", "dna")?;
        t.declare_async("jtag", "icap")?;
        t.declare_async("dna", "icap")?;

        debug!(domains = t.len(), "declared clocking");
        Ok(())
    }

    fn add_debug(&self, soc: &mut SocBuilder) {
        let component = match self.params.debug {
            DebugBridge::JtagBone => Component::new("jtagbone", "jtag_bridge"),
            DebugBridge::CpuDebug => Component::new("jtag", "cpu_debug").param("chain", 4),
        };
        soc.attach(component);
    }

    fn add_flash(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        let resolver = BootModeResolver::new(
            self.params.boot_mode,
            self.params.firmware_flash_offset,
        );
        let controller = soc.resolve_boot(&resolver)?.flash_controller;
        let model = self.params.board.flash.model.clone();
        match controller {
            FlashController::GeneralPurpose => {
                soc.attach(Component::new("flash_cs_n", "gpio_out"));
                soc.attach(
                    Component::new("flash", "s7_spi_flash")
                        .param("model", model)
                        .param("spi_clk_freq", 25_000_000),
                );
            }
            FlashController::Boot => {
                soc.attach(
                    Component::new("flash", "spi_flash_mmap")
                        .param("model", model)
                        .param("mode", "1x")
                        .param("with_master", false),
                );
            }
        }
        Ok(())
    }

    fn add_pcie(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        if self.params.dma_buffering_depth == 0 {
            return Err(SocError::Configuration(
                "DMA buffering depth must be non-zero".into(),
            ));
        }
        let lanes = self.params.board.pcie_lanes;
        soc.attach(
            Component::new("pcie_phy", "s7_pcie_phy")
                .param("lanes", lanes)
                .param("data_width", DMA_DATA_WIDTH)
                .param("bar0_size", "0x20000")
                .param("class_code", "0d10"),
        );
        soc.attach(
            Component::new("pcie_dma0", "pcie_dma")
                .param("buffering_depth", self.params.dma_buffering_depth)
                .param("loopback", true)
                .param("synchronizer", true),
        );
        soc.attach(Component::new("pcie_msi", "pcie_msi"));
        Ok(())
    }

    fn add_payload_core(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        soc.attach(Component::new("aux", "aux"));
        soc.attach(Component::new("lime_top", "lime_top").param("mmap", "lime_top_mmap"));

        let keep = StreamField::ALL;
        let streams = soc.streams_mut();
        streams.connect(
            StreamEndpoint::new("pcie_dma0", "source", DMA_DATA_WIDTH),
            StreamEndpoint::new("lime_top", "dma_rx", DMA_DATA_WIDTH),
            keep,
        )?;
        streams.connect(
            StreamEndpoint::new("lime_top", "dma_tx", DMA_DATA_WIDTH),
            StreamEndpoint::new("pcie_dma0", "sink", DMA_DATA_WIDTH),
            keep,
        )?;
        Ok(())
    }
}

impl Composition for XtrxSoc {
    fn params(&self) -> &SocParams {
        &self.params
    }

    fn compose(&self, soc: &mut SocBuilder) -> xtrx_core::Result<()> {
        let p = &self.params;
        info!(
            board = %p.board.name,
            boot_mode = %p.boot_mode,
            sys_clk_freq = p.sys_clk_freq,
            "composing SoC"
        );

        self.add_memory_map(soc)?;
        soc.add_constant("CONFIG_CLOCK_FREQUENCY", p.sys_clk_freq.round() as u64)?;

        soc.attach(
            Component::new("cpu", "vexriscv_smp")
                .param("variant", "standard")
                .param("privileged_debug", p.debug == DebugBridge::CpuDebug),
        );
        soc.attach(Component::new("uart", "crossover").param("auto_tx_flush", true));
        soc.attach(Component::new("crg", "s7_pll").param("speedgrade", -1));
        self.add_clocking(soc)?;
        self.add_debug(soc);

        soc.attach(Component::new("leds", "led_chaser"));
        soc.attach(Component::new("icap", "icap").param("reload", true));
        self.add_flash(soc)?;
        soc.attach(Component::new("xadc", "xadc"));
        soc.attach(Component::new("dna", "dna"));

        self.add_pcie(soc)?;
        soc.attach(Component::new("i2c0", "i2c_master"));
        soc.attach(Component::new("i2c1", "i2c_master"));
        self.add_payload_core(soc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtrx_core::boot::{BootMode, FLASH_BOOT_ADDRESS, ROM_BOOT_ADDRESS};
    use xtrx_core::ComposedSoc;
    use xtrx_targets::BoardName;

    fn compose(params: SocParams) -> ComposedSoc {
        let mut b = SocBuilder::new(params.board.ident(), params.board.address_width);
        XtrxSoc::new(params).compose(&mut b).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn limesdr_memory_map() {
        let soc = compose(SocParams::for_board(BoardName::Limesdr));
        assert_eq!(soc.ident, "LiteX SoC on Limesdr XTRX");
        assert_eq!(soc.region("main_ram").unwrap().origin, 0x4000_0000);
        assert_eq!(soc.region("lime_top_mmap").unwrap().origin, 0x0300_0000);
        assert_eq!(soc.boot.boot_address, 0x4000_0000);
        assert_eq!(soc.constant(ROM_BOOT_ADDRESS), Some(0x4000_0000));
        assert_eq!(soc.constant("CONFIG_CLOCK_FREQUENCY"), Some(125_000_000));
    }

    #[test]
    fn peripheral_indices() {
        let soc = compose(SocParams::for_board(BoardName::FairwavesPro));
        let indices: Vec<(&str, u16)> = soc
            .peripherals
            .iter()
            .map(|p| (p.name.as_str(), p.index))
            .collect();
        assert_eq!(
            indices,
            [
                ("uart", 0),
                ("icap", 1),
                ("flash", 2),
                ("xadc", 3),
                ("dna", 4),
                ("pcie_phy", 10),
                ("pcie_msi", 11),
                ("pcie_dma0", 12),
                ("i2c0", 20),
                ("i2c1", 21),
                ("analyzer", 30),
            ]
        );
    }

    #[test]
    fn timing_is_complete() {
        let soc = compose(SocParams::for_board(BoardName::Limesdr));
        soc.timing.validate().unwrap();
        assert_eq!(soc.timing.domain("dna").unwrap().frequency_hz, 62.5e6);
        assert_eq!(soc.timing.domain("pcie").unwrap().clock, PCIE_CLOCK_PATTERN);
        assert!(soc.timing.related("sys", "idelay"));
        assert_eq!(
            soc.timing.exception("jtag", "sys"),
            Some(xtrx_core::ExceptionKind::FalsePath)
        );
        assert_eq!(
            soc.timing.exception("pcie", "icap"),
            Some(xtrx_core::ExceptionKind::Asynchronous)
        );
    }

    #[test]
    fn streams_bridge_dma_and_payload_core() {
        let soc = compose(SocParams::for_board(BoardName::Limesdr));
        let links: Vec<String> = soc.streams.iter().map(|l| l.to_string()).collect();
        assert_eq!(links.len(), 2);
        assert!(links[0].starts_with("pcie_dma0.source -> lime_top.dma_rx"));
        assert!(links[1].starts_with("lime_top.dma_tx -> pcie_dma0.sink"));
        assert!(soc.streams.iter().all(|l| l.keep.len() == 4));
    }

    #[test]
    fn flash_boot_swaps_controller() {
        let params = SocParams::for_board(BoardName::Limesdr).with_boot_mode(BootMode::ExternalFlash);
        let soc = compose(params);
        assert_eq!(soc.boot.flash_controller, FlashController::Boot);
        assert_eq!(soc.constant(FLASH_BOOT_ADDRESS), Some(0x2022_0000));
        assert_eq!(soc.component("flash").unwrap().kind, "spi_flash_mmap");
        assert!(soc.component("flash_cs_n").is_none());
    }

    #[test]
    fn debug_bridges_are_exclusive() {
        let soc = compose(SocParams::for_board(BoardName::Limesdr));
        assert!(soc.component("jtagbone").is_some());
        assert!(soc.component("jtag").is_none());

        let soc = compose(
            SocParams::for_board(BoardName::Limesdr).with_debug(DebugBridge::CpuDebug),
        );
        assert!(soc.component("jtagbone").is_none());
        assert_eq!(soc.component("cpu").unwrap().params["privileged_debug"], "true");
        assert!(soc.timing.domain("jtag").is_some());
    }

    #[test]
    fn zero_dma_depth_is_rejected() {
        let params = SocParams::for_board(BoardName::Limesdr).with_dma_buffering_depth(0);
        let mut b = SocBuilder::new("x", 32);
        let err = XtrxSoc::new(params).compose(&mut b).unwrap_err();
        assert!(matches!(err, SocError::Configuration(_)));
    }
}
