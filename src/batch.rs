// ⚙️ Batch Reconciliation - one donor's sheet + image directory → plan
//
// Flow:
//   files → keys → donor check
//   rows  → keys → donor check → anatomy + stain
//   rows ⋈ files → destinations
//
// All state (donor reference, counters) is created here per batch and
// dropped with it. Nothing is copied until the whole plan exists.

use crate::allocator::{AllocationContext, Destination, DestinationAllocator};
use crate::anatomy::AnatomyClassifier;
use crate::donor::{DonorId, DonorResolver};
use crate::error::{ReconcileError, Result};
use crate::key::{KeyExtractor, DEFAULT_DONOR_PREFIX};
use crate::matcher::{MatchingMode, RowFileMatcher};
use crate::record::{ImageFile, PreparedRow, SpreadsheetRow};
use crate::stain::StainLabel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// OPTIONS & PLAN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub donor_prefix: String,
    /// `None` selects the mode from the row data
    pub match_mode: Option<MatchingMode>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            donor_prefix: DEFAULT_DONOR_PREFIX.to_string(),
            match_mode: None,
        }
    }
}

/// Fully reconciled batch, ready to copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPlan {
    pub run_id: String,
    pub planned_at: DateTime<Utc>,
    pub donor: DonorId,
    /// `HPAP-001`
    pub donor_label: String,
    pub mode: MatchingMode,
    pub destinations: Vec<Destination>,
}

impl BatchPlan {
    /// `HPAP-001/Histology`, the root every destination directory hangs off
    pub fn batch_root(&self) -> PathBuf {
        Path::new(&self.donor_label).join("Histology")
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} image file(s) planned ({})",
            self.donor_label,
            self.destinations.len(),
            self.mode.name()
        )
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct Reconciler {
    options: BatchOptions,
    extractor: KeyExtractor,
    classifier: AnatomyClassifier,
}

impl Reconciler {
    pub fn new(options: BatchOptions) -> Self {
        let extractor = KeyExtractor::new(options.donor_prefix.clone());
        Reconciler {
            options,
            extractor,
            classifier: AnatomyClassifier::new(),
        }
    }

    /// Reconcile one batch, all or nothing
    pub fn reconcile(&self, rows: &[SpreadsheetRow], files: &[PathBuf]) -> Result<BatchPlan> {
        if rows.is_empty() && files.is_empty() {
            return Err(ReconcileError::malformed("", "batch has no rows and no image files"));
        }

        let mode = match self.options.match_mode {
            Some(mode) => mode,
            None => MatchingMode::select(rows)?,
        };
        info!(mode = mode.name(), rows = rows.len(), files = files.len(), "reconciling batch");

        let mut donors = DonorResolver::new(self.options.donor_prefix.clone());

        let images = files
            .iter()
            .map(|path| self.prepare_file(path, mode, &mut donors))
            .collect::<Result<Vec<_>>>()?;

        let prepared = rows
            .iter()
            .map(|row| self.prepare_row(row, mode, &mut donors))
            .collect::<Result<Vec<_>>>()?;

        let donor = donors
            .donor()
            .cloned()
            .ok_or_else(|| ReconcileError::malformed("", "no record carries a donor ID"))?;
        info!(donor = %donor, "donor ID consistent across batch");

        let records = RowFileMatcher::new().join(prepared, images)?;

        let allocator = DestinationAllocator::new(self.options.donor_prefix.clone());
        let destinations = allocator.allocate(records, AllocationContext::new());

        let plan = BatchPlan {
            run_id: Uuid::new_v4().to_string(),
            planned_at: Utc::now(),
            donor_label: donor.label(&self.options.donor_prefix),
            donor,
            mode,
            destinations,
        };
        info!("{}", plan.summary());

        Ok(plan)
    }

    fn prepare_file(
        &self,
        path: &Path,
        mode: MatchingMode,
        donors: &mut DonorResolver,
    ) -> Result<ImageFile> {
        let record = format!("image file '{}'", path.display());

        let join_key = match mode {
            MatchingMode::ByIdentityKey => {
                let key = self.extractor.file_key(path)?;
                donors.check(&key, &record)?;
                key
            }
            MatchingMode::ByNumericImageId => {
                // Scanner exports may be named by image id alone
                if let Ok(key) = self.extractor.file_key(path) {
                    donors.check(&key, &record)?;
                }
                self.extractor.file_image_id_key(path)?
            }
        };

        debug!(file = %path.display(), key = %join_key, "image file keyed");
        Ok(ImageFile {
            path: path.to_path_buf(),
            join_key,
        })
    }

    fn prepare_row(
        &self,
        row: &SpreadsheetRow,
        mode: MatchingMode,
        donors: &mut DonorResolver,
    ) -> Result<PreparedRow> {
        let key = self.extractor.row_key(&row.identity_label)?;
        let donor = donors.check(&key, &row.describe())?;

        let join_key = match mode {
            MatchingMode::ByIdentityKey => key.clone(),
            MatchingMode::ByNumericImageId => {
                let image_id = row
                    .image_id
                    .as_deref()
                    .filter(|id| !id.trim().is_empty())
                    .ok_or_else(|| ReconcileError::malformed(&row.describe(), "image id missing"))?;
                self.extractor.image_id_key(image_id)?
            }
        };

        let anatomy = self.classifier.classify(row.anatomy_source())?;
        let stain = StainLabel::normalize(&row.stain_label);

        debug!(
            row = row.line,
            key = %join_key,
            anatomy = anatomy.long_form(),
            stain = %stain,
            "row prepared"
        );

        Ok(PreparedRow {
            row: row.clone(),
            key,
            join_key,
            donor,
            anatomy,
            stain,
        })
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(BatchOptions::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
