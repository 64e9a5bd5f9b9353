// 🔗 Row/File Matcher - total bijection between sheet rows and image files
// Explicit hash join: duplicates and orphans on either side abort the batch.

use crate::error::{
    RecordOrigin, ReconcileError, Result, UnmatchedFile, UnmatchedReport, UnmatchedRow,
};
use crate::key::IdentityKey;
use crate::record::{ImageFile, MatchedRecord, PreparedRow, SpreadsheetRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

// ============================================================================
// MATCHING MODE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Row label key == filename key
    ByIdentityKey,
    /// Row image-id cell == image id at the end of the filename
    ByNumericImageId,
}

impl MatchingMode {
    pub fn name(&self) -> &str {
        match self {
            MatchingMode::ByIdentityKey => "by_identity_key",
            MatchingMode::ByNumericImageId => "by_numeric_image_id",
        }
    }

    /// Pick the mode once per batch from the row data
    ///
    /// Every row has an image id → `ByNumericImageId`; none has one →
    /// `ByIdentityKey`. A partially filled image-id column is rejected.
    pub fn select(rows: &[SpreadsheetRow]) -> Result<Self> {
        let with_id = rows.iter().filter(|row| row.has_image_id()).count();

        if with_id == 0 {
            return Ok(MatchingMode::ByIdentityKey);
        }

        if with_id == rows.len() {
            return Ok(MatchingMode::ByNumericImageId);
        }

        let first_missing = rows
            .iter()
            .find(|row| !row.has_image_id())
            .map(|row| row.describe())
            .unwrap_or_default();

        Err(ReconcileError::malformed(
            &first_missing,
            format!(
                "image id missing while {} of {} rows have one",
                with_id,
                rows.len()
            ),
        ))
    }
}

// ============================================================================
// ROW/FILE MATCHER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct RowFileMatcher;

impl RowFileMatcher {
    pub fn new() -> Self {
        RowFileMatcher
    }

    /// Join rows to files on `join_key`
    ///
    /// Fails on the first duplicate key. Otherwise every unmatched row and
    /// every unmatched file is reported together. On success the result has
    /// one record per row, in row order.
    pub fn join(&self, rows: Vec<PreparedRow>, files: Vec<ImageFile>) -> Result<Vec<MatchedRecord>> {
        let mut row_index: HashMap<IdentityKey, usize> = HashMap::with_capacity(rows.len());
        for (idx, prepared) in rows.iter().enumerate() {
            if let Some(&first) = row_index.get(&prepared.join_key) {
                return Err(ReconcileError::DuplicateKey {
                    key: prepared.join_key.to_string(),
                    origin: RecordOrigin::Row,
                    first: rows[first].row.describe(),
                    second: prepared.row.describe(),
                });
            }
            row_index.insert(prepared.join_key.clone(), idx);
        }

        let mut file_index: HashMap<IdentityKey, ImageFile> = HashMap::with_capacity(files.len());
        for file in files {
            if let Some(first) = file_index.get(&file.join_key) {
                return Err(ReconcileError::DuplicateKey {
                    key: file.join_key.to_string(),
                    origin: RecordOrigin::File,
                    first: first.describe(),
                    second: file.describe(),
                });
            }
            file_index.insert(file.join_key.clone(), file);
        }

        let mut records = Vec::with_capacity(rows.len());
        let mut orphan_rows = Vec::new();
        for prepared in rows {
            match file_index.remove(&prepared.join_key) {
                Some(file) => {
                    debug!(
                        key = %prepared.join_key,
                        file = %file.path.display(),
                        "row matched"
                    );
                    records.push(MatchedRecord::join(prepared, file));
                }
                None => orphan_rows.push(unmatched_row(&prepared)),
            }
        }

        // Whatever is left in the index has no row
        let mut orphan_files: Vec<UnmatchedFile> = file_index
            .into_values()
            .map(|file| UnmatchedFile {
                path: file.path,
                key: file.join_key.to_string(),
            })
            .collect();
        orphan_files.sort_by(|a, b| a.path.cmp(&b.path));

        let report = UnmatchedReport {
            rows: orphan_rows,
            files: orphan_files,
        };
        if !report.is_empty() {
            return Err(ReconcileError::Unmatched(report));
        }

        info!("{} rows matched to image files", records.len());
        Ok(records)
    }
}

fn unmatched_row(prepared: &PreparedRow) -> UnmatchedRow {
    UnmatchedRow {
        line: prepared.row.line,
        label: prepared.row.identity_label.clone(),
        key: prepared.join_key.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================
