//! Loading and flashing through the JTAG programmer.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use xtrx_build::{Bitstream, FirmwareFramer, FlashProgramming, Programmer};

/// Offset of the configuration image inside the SPI flash.
const BITSTREAM_FLASH_OFFSET: u64 = 0;

fn require(path: &Path, what: &str) -> Result<()> {
    if !path.is_file() {
        bail!(
            "{what} not found: {}. Run with --build first.",
            path.display()
        );
    }
    Ok(())
}

/// Load the volatile configuration image.
pub fn load(programmer: &dyn Programmer, bitstream: &Bitstream) -> Result<()> {
    require(&bitstream.bit, "bitstream")?;
    programmer
        .load_bitstream(&bitstream.bit)
        .context("loading bitstream")?;
    println!("Loaded {}", bitstream.bit.display());
    Ok(())
}

/// Write the configuration image to the start of the SPI flash.
pub fn flash_bitstream(programmer: &dyn Programmer, bitstream: &Bitstream) -> Result<()> {
    require(&bitstream.bin, "flash image")?;
    programmer
        .flash(BITSTREAM_FLASH_OFFSET, &bitstream.bin)
        .context("flashing bitstream")?;
    println!("Flashed {} at 0x{BITSTREAM_FLASH_OFFSET:x}", bitstream.bin.display());
    Ok(())
}

/// Name of the staged firmware image inside the output directory.
const FIRMWARE_BIN: &str = "firmware.bin";

/// Frame the scheduled firmware image with its CRC header and write it at
/// the scheduled offset.
///
/// The image is staged as `firmware.bin` in `work_dir`; the framed copy lands
/// next to it as `firmware.fbi`.
pub fn flash_firmware(
    programmer: &dyn Programmer,
    framer: &dyn FirmwareFramer,
    schedule: &FlashProgramming,
    work_dir: &Path,
) -> Result<PathBuf> {
    fs::create_dir_all(work_dir)
        .with_context(|| format!("creating {}", work_dir.display()))?;
    let firmware = work_dir.join(FIRMWARE_BIN);
    fs::write(&firmware, &schedule.image)
        .with_context(|| format!("writing {}", firmware.display()))?;

    let framed = firmware.with_extension("fbi");
    framer
        .frame(&firmware, &framed)
        .with_context(|| format!("framing {}", firmware.display()))?;
    programmer
        .flash(schedule.offset, &framed)
        .context("flashing firmware")?;
    println!("Flashed {} at 0x{:x}", framed.display(), schedule.offset);
    Ok(framed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use xtrx_build::BuildError;

    #[derive(Default)]
    struct RecordingProgrammer {
        calls: RefCell<Vec<String>>,
        flashed: RefCell<Vec<Vec<u8>>>,
    }

    impl Programmer for RecordingProgrammer {
        fn load_bitstream(&self, bitstream: &Path) -> xtrx_build::Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("load {}", bitstream.display()));
            Ok(())
        }

        fn flash(&self, offset: u64, image: &Path) -> xtrx_build::Result<()> {
            let name = image.file_name().unwrap().to_string_lossy().into_owned();
            self.flashed.borrow_mut().push(std::fs::read(image)?);
            self.calls
                .borrow_mut()
                .push(format!("flash 0x{offset:x} {name}"));
            Ok(())
        }
    }

    /// Prepends a fixed four-byte header.
    struct HeaderFramer;

    impl FirmwareFramer for HeaderFramer {
        fn frame(&self, input: &Path, output: &Path) -> xtrx_build::Result<()> {
            let mut framed = vec![0xde, 0xad, 0xbe, 0xef];
            framed.extend(std::fs::read(input)?);
            std::fs::write(output, framed)?;
            Ok(())
        }
    }

    struct FailingFramer;

    impl FirmwareFramer for FailingFramer {
        fn frame(&self, _input: &Path, _output: &Path) -> xtrx_build::Result<()> {
            Err(BuildError::ExternalTool {
                tool: "crcfbigen".into(),
                status: Some(1),
                stderr: "bad input".into(),
            })
        }
    }

    fn bitstream(dir: &Path) -> Bitstream {
        let bit = dir.join("limesdr_xtrx.bit");
        let bin = dir.join("limesdr_xtrx.bin");
        std::fs::write(&bit, b"bit").unwrap();
        std::fs::write(&bin, b"bin").unwrap();
        Bitstream { bit, bin }
    }

    #[test]
    fn load_and_flash_bitstream() {
        let dir = tempfile::tempdir().unwrap();
        let image = bitstream(dir.path());
        let prog = RecordingProgrammer::default();

        load(&prog, &image).unwrap();
        flash_bitstream(&prog, &image).unwrap();

        let calls = prog.calls.borrow();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("load "));
        assert_eq!(calls[1], "flash 0x0 limesdr_xtrx.bin");
    }

    #[test]
    fn missing_bitstream_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let image = Bitstream {
            bit: dir.path().join("none.bit"),
            bin: dir.path().join("none.bin"),
        };
        let prog = RecordingProgrammer::default();
        let err = load(&prog, &image).unwrap_err();
        assert!(err.to_string().contains("--build"));
        assert!(prog.calls.borrow().is_empty());
    }

    #[test]
    fn scheduled_image_is_framed_then_flashed() {
        let dir = tempfile::tempdir().unwrap();
        // A stale binary in the work directory must not be what gets flashed.
        std::fs::write(dir.path().join("firmware.bin"), [9, 9, 9, 9]).unwrap();
        let schedule = FlashProgramming {
            offset: 0x22_0000,
            image: vec![1, 2, 3],
        };
        let prog = RecordingProgrammer::default();

        let framed = flash_firmware(&prog, &HeaderFramer, &schedule, dir.path()).unwrap();
        assert_eq!(framed, dir.path().join("firmware.fbi"));
        assert_eq!(*prog.calls.borrow(), vec!["flash 0x220000 firmware.fbi"]);
        assert_eq!(
            *prog.flashed.borrow(),
            vec![vec![0xde, 0xad, 0xbe, 0xef, 1, 2, 3]]
        );
        assert_eq!(
            std::fs::read(dir.path().join("firmware.bin")).unwrap(),
            schedule.image
        );
    }

    #[test]
    fn framer_failure_skips_flash() {
        let dir = tempfile::tempdir().unwrap();
        let schedule = FlashProgramming {
            offset: 0x22_0000,
            image: vec![1],
        };
        let prog = RecordingProgrammer::default();

        let err = flash_firmware(&prog, &FailingFramer, &schedule, dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("bad input"));
        assert!(prog.calls.borrow().is_empty());
    }
}
