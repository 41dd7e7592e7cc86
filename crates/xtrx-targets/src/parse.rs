//! TOML parsing, serialization, validation, and discovery for board definitions.
//!
//! Board definitions are stored as `.board.toml` files in the `boards/`
//! directory of a project. This module provides functions to load, validate,
//! serialize, and discover these files.

use std::path::{Path, PathBuf};

use tracing::warn;
use xtrx_core::peripheral::CSR_PAGING;

use crate::board::Board;
use crate::error::{Result, TargetError};

/// Regions every board must expose for the SoC to compose.
const REQUIRED_REGIONS: [&str; 3] = ["rom", "main_ram", "csr"];

/// A validation issue found in a board definition.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity: "error" or "warning".
    pub severity: &'static str,
    /// Human-readable description.
    pub message: String,
}

/// Load a board from a `.board.toml` file.
pub fn load_board_toml(path: &Path) -> Result<Board> {
    if !path.exists() {
        return Err(TargetError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let content = std::fs::read_to_string(path)?;
    parse_board_toml(&content)
}

/// Load a board file and reject it if validation reports any error.
///
/// Warnings are logged and otherwise tolerated.
pub fn load_validated(path: &Path) -> Result<Board> {
    let board = load_board_toml(path)?;
    if let Err(issues) = validate_board(&board) {
        let mut errors = Vec::new();
        for issue in issues {
            if issue.severity == "error" {
                errors.push(issue.message);
            } else {
                warn!(board = %board.name, "{}", issue.message);
            }
        }
        if !errors.is_empty() {
            return Err(TargetError::Validation {
                detail: format!("{}: {}", path.display(), errors.join("; ")),
            });
        }
    }
    Ok(board)
}

/// Parse a board from a TOML string.
pub fn parse_board_toml(toml_str: &str) -> Result<Board> {
    let board: Board = toml::from_str(toml_str)?;
    Ok(board)
}

/// Serialize a board to pretty TOML.
pub fn board_to_toml(board: &Board) -> Result<String> {
    let toml_str = toml::to_string_pretty(board)?;
    Ok(toml_str)
}

/// Validate a board definition for structural correctness.
///
/// Returns `Ok(())` if valid, or `Err(issues)` with a list of problems.
pub fn validate_board(board: &Board) -> std::result::Result<(), Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    // 1. Address width fits a 64-bit address
    if board.address_width == 0 || board.address_width > 64 {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!(
                "address width {} is out of range (expected 1..=64 bits)",
                board.address_width
            ),
        });
    }

    // 2. PCIe lane count is one the PHY supports
    if ![1, 2, 4].contains(&board.pcie_lanes) {
        issues.push(ValidationIssue {
            severity: "error",
            message: format!(
                "PCIe lane count {} is not supported (expected 1, 2 or 4)",
                board.pcie_lanes
            ),
        });
    }

    // 3. Required regions exist
    for name in REQUIRED_REGIONS {
        if board.region(name).is_none() {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!("memory map has no '{name}' region"),
            });
        }
    }

    // 4. Regions are non-empty and inside the address space
    let limit = match board.address_width {
        w if w >= 64 => u128::from(u64::MAX) + 1,
        w => 1u128 << w,
    };
    for r in &board.memory_regions {
        if r.size_bytes == 0 {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!("memory region '{}' has size 0", r.name),
            });
        }
        if u128::from(r.origin) + u128::from(r.size_bytes) > limit {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!(
                    "memory region '{}' (0x{:X}, {} bytes) exceeds the {}-bit address space",
                    r.name, r.origin, r.size_bytes, board.address_width
                ),
            });
        }
    }

    // 5. Regions don't overlap (pairwise check)
    let regions = &board.memory_regions;
    for i in 0..regions.len() {
        for j in (i + 1)..regions.len() {
            let a = &regions[i];
            let b = &regions[j];
            if a.name == b.name {
                issues.push(ValidationIssue {
                    severity: "error",
                    message: format!("memory region '{}' is defined twice", a.name),
                });
                continue;
            }
            let a_end = a.origin.saturating_add(a.size_bytes);
            let b_end = b.origin.saturating_add(b.size_bytes);
            if a.origin < b_end && b.origin < a_end {
                issues.push(ValidationIssue {
                    severity: "error",
                    message: format!(
                        "memory regions '{}' (0x{:X}..0x{:X}) and '{}' (0x{:X}..0x{:X}) overlap",
                        a.name, a.origin, a_end, b.name, b.origin, b_end
                    ),
                });
            }
        }
    }

    // 6. CSR window is a whole number of pages
    if let Some(csr) = board.region("csr") {
        if csr.size_bytes % CSR_PAGING != 0 {
            issues.push(ValidationIssue {
                severity: "error",
                message: format!(
                    "csr window size 0x{:X} is not a multiple of the 0x{:X} CSR paging",
                    csr.size_bytes, CSR_PAGING
                ),
            });
        }
    }

    // 7. Flash window matches the fitted chip
    match board.region("spiflash") {
        Some(window) if window.size_bytes != board.flash.size_bytes => {
            issues.push(ValidationIssue {
                severity: "warning",
                message: format!(
                    "spiflash window ({} bytes) does not match {} capacity ({} bytes)",
                    window.size_bytes, board.flash.model, board.flash.size_bytes
                ),
            });
        }
        Some(_) => {}
        None => issues.push(ValidationIssue {
            severity: "warning",
            message: "memory map has no 'spiflash' region; flash boot is unavailable".into(),
        }),
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}

/// Discover all `.board.toml` files in a project's `boards/` directory.
///
/// Returns a list of (board_name, file_path) pairs.
pub fn discover_boards(project_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let boards_dir = project_dir.join("boards");
    if !boards_dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut boards = Vec::new();
    for entry in std::fs::read_dir(&boards_dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".board.toml"))
            .map(str::to_string);
        if let Some(name) = name {
            boards.push((name, path));
        }
    }
    boards.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(boards)
}
