//! Host driver register header.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use xtrx_build::c_header;
use xtrx_core::ComposedSoc;

/// Write the register header for `soc` to `output` when `generate` is set,
/// otherwise require the checked-in copy to exist.
pub fn run(soc: &ComposedSoc, output: &Path, generate: bool) -> Result<PathBuf> {
    if generate {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(output, c_header(soc))
            .with_context(|| format!("writing {}", output.display()))?;
        println!("Driver header: {} (generated)", output.display());
    } else {
        if !output.is_file() {
            bail!(
                "driver header not found: {}. Run with --driver to generate it.",
                output.display()
            );
        }
        println!("Driver header: {} (local copy)", output.display());
    }
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use xtrx_core::boot::{BootMode, BootModeResolver};
    use xtrx_core::{Peripheral, SocBuilder};

    fn soc() -> ComposedSoc {
        let mut b = SocBuilder::new("test", 32);
        b.add_region("main_ram", 0x4000_0000, 0x4000).unwrap();
        b.add_region("csr", 0xf000_0000, 0x1_0000).unwrap();
        b.register_peripherals("csr", &[Peripheral::Uart]).unwrap();
        b.resolve_boot(&BootModeResolver::new(BootMode::InFabric, 0))
            .unwrap();
        b.build().unwrap()
    }

    #[test]
    fn generate_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("software/kernel/csr.h");
        let path = run(&soc(), &output, true).unwrap();
        let header = fs::read_to_string(path).unwrap();
        assert!(header.contains("CSR_UART_BASE"));
    }

    #[test]
    fn local_copy_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("csr.h");
        fs::write(&output, "/* hand-tuned */\n").unwrap();
        run(&soc(), &output, false).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "/* hand-tuned */\n");
    }

    #[test]
    fn missing_local_copy() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&soc(), &dir.path().join("csr.h"), false).unwrap_err();
        assert!(err.to_string().contains("--driver"));
    }
}
