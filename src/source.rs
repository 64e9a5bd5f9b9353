// 📂 Source & Destination Checks
// A batch directory holds image files plus exactly one spreadsheet export.
// The destination must be fresh so a run never mixes with earlier output.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// What a source directory contains
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceListing {
    pub dir: PathBuf,
    pub spreadsheet: PathBuf,
    /// Sorted by path
    pub images: Vec<PathBuf>,
}

/// Clean up a directory argument pasted from a file manager
///
/// `"C:\data\batch 7\"` → `C:/data/batch 7`
pub fn normalize_dir_arg(raw: &str) -> PathBuf {
    let cleaned = raw.replace('\\', "/").replace('"', "");
    let trimmed = cleaned.trim();
    let trimmed = if trimmed.len() > 1 {
        trimmed.trim_end_matches('/')
    } else {
        trimmed
    };
    PathBuf::from(trimmed)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// List image files and the spreadsheet in `dir`
pub fn scan_source(dir: &Path, image_ext: &str, spreadsheet_ext: &str) -> Result<SourceListing> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read source directory: {}", dir.display()))?;

    let mut images = Vec::new();
    let mut spreadsheets = Vec::new();

    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to list source directory: {}", dir.display()))?
            .path();

        if !path.is_file() {
            continue;
        }

        if has_extension(&path, image_ext) {
            images.push(path);
        } else if has_extension(&path, spreadsheet_ext) {
            spreadsheets.push(path);
        }
    }

    images.sort();
    spreadsheets.sort();

    let spreadsheet = match spreadsheets.len() {
        0 => bail!("spreadsheet (.{}) not found in '{}'", spreadsheet_ext, dir.display()),
        1 => spreadsheets.remove(0),
        n => bail!(
            "{} spreadsheet (.{}) files found in '{}', expected one",
            n,
            spreadsheet_ext,
            dir.display()
        ),
    };

    if images.is_empty() {
        bail!("no image file (.{}) found in '{}'", image_ext, dir.display());
    }

    info!("{} image file(s) found in '{}'", images.len(), dir.display());

    Ok(SourceListing {
        dir: dir.to_path_buf(),
        spreadsheet,
        images,
    })
}

/// Destination must be absent or an empty directory
pub fn check_destination(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    if !dir.is_dir() {
        bail!("'{}' exists but is not a directory", dir.display());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read destination directory: {}", dir.display()))?;
    if entries.next().is_some() {
        bail!("'{}' is not an empty directory", dir.display());
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn test_normalize_dir_arg() {
        assert_eq!(normalize_dir_arg("\"C:\\data\\batch 7\\\""), PathBuf::from("C:/data/batch 7"));
        assert_eq!(normalize_dir_arg("/data/in/"), PathBuf::from("/data/in"));
        assert_eq!(normalize_dir_arg("/"), PathBuf::from("/"));
    }

    #[test]
    fn test_scan_source_lists_images_and_sheet() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "HPAP-001_b.ndpi");
        touch(dir.path(), "HPAP-001_a.NDPI");
        touch(dir.path(), "sheet.csv");
        touch(dir.path(), "notes.txt");
        fs::create_dir(dir.path().join("sub.ndpi")).unwrap();

        let listing = scan_source(dir.path(), "ndpi", "csv").unwrap();
        assert_eq!(listing.spreadsheet, dir.path().join("sheet.csv"));
        assert_eq!(
            listing.images,
            vec![dir.path().join("HPAP-001_a.NDPI"), dir.path().join("HPAP-001_b.ndpi")]
        );

        println!("✅ Source scan test passed");
    }

    #[test]
    fn test_scan_source_requires_one_sheet() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "HPAP-001_a.ndpi");
        let err = scan_source(dir.path(), "ndpi", "csv").unwrap_err();
        assert!(err.to_string().contains("not found"));

        touch(dir.path(), "one.csv");
        touch(dir.path(), "two.csv");
        let err = scan_source(dir.path(), "ndpi", "csv").unwrap_err();
        assert!(err.to_string().contains("expected one"));
    }

    #[test]
    fn test_scan_source_requires_images() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "sheet.csv");
        let err = scan_source(dir.path(), "ndpi", "csv").unwrap_err();
        assert!(err.to_string().contains("no image file"));
    }

    #[test]
    fn test_check_destination() {
        let dir = tempdir().unwrap();
        assert!(check_destination(&dir.path().join("missing")).is_ok());
        assert!(check_destination(dir.path()).is_ok());

        touch(dir.path(), "leftover");
        let err = check_destination(dir.path()).unwrap_err();
        assert!(err.to_string().contains("not an empty directory"));

        let err = check_destination(&dir.path().join("leftover")).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }
}
