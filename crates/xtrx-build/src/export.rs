//! Exports consumed by firmware, drivers and the place-and-route toolchain.
//!
//! - `csr.csv`: register map in the LiteX CSV layout
//! - `map.json`: the [`MapExport`] the firmware build compiles against
//! - `soc.h`: C header with CSR bases, region bounds and constants
//! - timing constraints rendered by a [`ConstraintExporter`]

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::debug;
use xtrx_core::timing::TimingModel;
use xtrx_core::{ComposedSoc, ExceptionKind, Region};

use crate::artifact::MapExport;
use crate::error::Result;

pub const CSR_CSV: &str = "csr.csv";
pub const MAP_JSON: &str = "map.json";
pub const SOC_HEADER: &str = "soc.h";

/// Start of the CPU's uncached I/O window.
const IO_REGION_BASE: u64 = 0x8000_0000;

fn region_kind(r: &Region) -> &'static str {
    if r.linked {
        "linker"
    } else if r.origin >= IO_REGION_BASE {
        "io"
    } else {
        "cached"
    }
}

/// Render the register map as LiteX-style CSV.
pub fn csr_csv(soc: &ComposedSoc) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#--------------------------------------------------------------------------------");
    let _ = writeln!(out, "# {}", soc.ident);
    let _ = writeln!(out, "#--------------------------------------------------------------------------------");
    if let Some(base) = soc.csr_base {
        for p in &soc.peripherals {
            let _ = writeln!(out, "csr_base,{},0x{:08x},,", p.name, p.address(base));
        }
    }
    for (name, value) in &soc.constants {
        let _ = writeln!(out, "constant,{},{},,", name.to_lowercase(), value);
    }
    for r in &soc.regions {
        let _ = writeln!(
            out,
            "memory_region,{},0x{:08x},{},{}",
            r.name,
            r.origin,
            r.size,
            region_kind(r)
        );
    }
    out
}

/// Render the map export as pretty JSON.
pub fn map_json(map: &MapExport) -> Result<String> {
    Ok(serde_json::to_string_pretty(map)?)
}

fn c_ident(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Render a C header for firmware and driver sources.
pub fn c_header(soc: &ComposedSoc) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "/* {} */", soc.ident);
    let _ = writeln!(out, "#ifndef __GENERATED_SOC_H");
    let _ = writeln!(out, "#define __GENERATED_SOC_H");
    let _ = writeln!(out);

    if let Some(base) = soc.csr_base {
        let _ = writeln!(out, "#define CSR_BASE 0x{base:08x}L");
        for p in &soc.peripherals {
            let name = c_ident(&p.name);
            let _ = writeln!(
                out,
                "#define CSR_{name}_BASE (CSR_BASE + 0x{:x}L)",
                p.address(base) - base
            );
            let _ = writeln!(out, "#define CSR_{name}_INDEX {}", p.index);
        }
        let _ = writeln!(out);
    }

    for r in &soc.regions {
        let name = c_ident(&r.name);
        let _ = writeln!(out, "#define {name}_BASE 0x{:08x}L", r.origin);
        let _ = writeln!(out, "#define {name}_SIZE 0x{:08x}", r.size);
    }
    let _ = writeln!(out);

    for (name, value) in &soc.constants {
        let _ = writeln!(out, "#define {} {}", c_ident(name), value);
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "#endif");
    out
}

/// Renders a [`TimingModel`] into a toolchain's constraint language.
pub trait ConstraintExporter {
    /// File name of the rendered constraints.
    fn file_name(&self) -> &str;

    fn render(&self, timing: &TimingModel) -> String;
}

/// Xilinx XDC constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdcExporter;

impl XdcExporter {
    fn clock<'a>(timing: &'a TimingModel, domain: &'a str) -> &'a str {
        timing
            .domain(domain)
            .map(|d| d.clock.as_str())
            .unwrap_or(domain)
    }
}

impl ConstraintExporter for XdcExporter {
    fn file_name(&self) -> &str {
        "timing.xdc"
    }

    fn render(&self, timing: &TimingModel) -> String {
        let mut out = String::new();
        for p in &timing.periods {
            let clock = Self::clock(timing, &p.domain);
            if clock.contains('*') {
                // Generated inside a hard block; the tool derives it.
                let _ = writeln!(out, "# {clock}: {:.3} ns", p.period_ns);
            } else {
                let _ = writeln!(
                    out,
                    "create_clock -name {clock} -period {:.3} [get_nets {clock}]",
                    p.period_ns
                );
            }
        }
        for e in &timing.exceptions {
            let a = Self::clock(timing, &e.a);
            let b = Self::clock(timing, &e.b);
            match e.kind {
                ExceptionKind::Asynchronous => {
                    let _ = writeln!(
                        out,
                        "set_clock_groups -group [get_clocks {{{a}}}] -group [get_clocks {{{b}}}] -asynchronous"
                    );
                }
                ExceptionKind::FalsePath => {
                    let _ = writeln!(
                        out,
                        "set_false_path -from [get_clocks {{{a}}}] -to [get_clocks {{{b}}}]"
                    );
                    let _ = writeln!(
                        out,
                        "set_false_path -from [get_clocks {{{b}}}] -to [get_clocks {{{a}}}]"
                    );
                }
            }
        }
        out
    }
}

/// Write every export into `dir`, returning the written paths.
pub fn write_exports(
    dir: &Path,
    soc: &ComposedSoc,
    map: &MapExport,
    constraints: &dyn ConstraintExporter,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let files = [
        (CSR_CSV, csr_csv(soc)),
        (MAP_JSON, map_json(map)?),
        (SOC_HEADER, c_header(soc)),
        (constraints.file_name(), constraints.render(&soc.timing)),
    ];
    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = dir.join(name);
        std::fs::write(&path, content)?;
        debug!(path = %path.display(), "wrote export");
        written.push(path);
    }
    Ok(written)
}
