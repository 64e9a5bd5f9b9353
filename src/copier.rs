// 📦 Plan Execution - copy files into the upload tree + write a manifest
//
// Layout:
//   <dest>/<HPAP-donor>/Histology/<short anatomy>/<destination name>
//   <dest>/<HPAP-donor>/manifest.json

use crate::batch::BatchPlan;
use crate::donor::DonorId;
use crate::matcher::MatchingMode;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyOptions {
    pub dry_run: bool,
    pub verify: bool,
    pub manifest_name: String,
}

impl Default for CopyOptions {
    fn default() -> Self {
        CopyOptions {
            dry_run: false,
            verify: true,
            manifest_name: "manifest.json".to_string(),
        }
    }
}

// ============================================================================
// MANIFEST
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source: PathBuf,
    /// Relative to the donor directory
    pub destination: PathBuf,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub run_id: String,
    pub planned_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub donor: DonorId,
    pub donor_label: String,
    pub mode: MatchingMode,
    pub dry_run: bool,
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.bytes).sum()
    }
}

/// Hex SHA-256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)
        .with_context(|| format!("Failed to hash file: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// EXECUTION
// ============================================================================

/// Copy every planned file under `dest_root`
///
/// In dry-run mode nothing is written; the returned manifest still lists
/// what would have been copied.
pub fn execute_plan(plan: &BatchPlan, dest_root: &Path, options: &CopyOptions) -> Result<Manifest> {
    let donor_dir = dest_root.join(&plan.donor_label);
    let batch_root = dest_root.join(plan.batch_root());

    let mut entries = Vec::with_capacity(plan.destinations.len());

    for destination in &plan.destinations {
        let relative = Path::new("Histology").join(destination.relative_path());
        let target = batch_root.join(destination.relative_path());

        let bytes = fs::metadata(&destination.source)
            .with_context(|| format!("Failed to stat '{}'", destination.source.display()))?
            .len();

        if options.dry_run {
            info!(
                "[dry run] '{}' → '{}'",
                destination.source.display(),
                target.display()
            );
            entries.push(ManifestEntry {
                source: destination.source.clone(),
                destination: relative,
                bytes,
                sha256: None,
            });
            continue;
        }

        if target.exists() {
            bail!("destination '{}' already exists", target.display());
        }

        let parent = target.parent().unwrap_or(batch_root.as_path());
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;

        info!("Copying '{}' ...", destination.source.display());
        fs::copy(&destination.source, &target).with_context(|| {
            format!(
                "Failed to copy '{}' to '{}'",
                destination.source.display(),
                target.display()
            )
        })?;

        let sha256 = if options.verify {
            let expected = sha256_file(&destination.source)?;
            let actual = sha256_file(&target)?;
            if expected != actual {
                bail!(
                    "checksum mismatch after copying '{}' to '{}'",
                    destination.source.display(),
                    target.display()
                );
            }
            debug!(file = %target.display(), sha256 = %actual, "copy verified");
            Some(actual)
        } else {
            None
        };

        entries.push(ManifestEntry {
            source: destination.source.clone(),
            destination: relative,
            bytes,
            sha256,
        });
    }

    let manifest = Manifest {
        run_id: plan.run_id.clone(),
        planned_at: plan.planned_at,
        completed_at: Utc::now(),
        donor: plan.donor.clone(),
        donor_label: plan.donor_label.clone(),
        mode: plan.mode,
        dry_run: options.dry_run,
        entries,
    };

    if !options.dry_run {
        write_manifest(&manifest, &donor_dir.join(&options.manifest_name))?;
    }

    info!(
        "{} file(s), {} bytes {}",
        manifest.entries.len(),
        manifest.total_bytes(),
        if options.dry_run { "planned" } else { "copied" }
    );

    Ok(manifest)
}

fn write_manifest(manifest: &Manifest, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write manifest: {}", path.display()))?;

    info!("Manifest written to '{}'", path.display());
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
