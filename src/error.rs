// 🚨 Reconciliation Errors
// Every variant is fatal: the whole batch is rejected, nothing is repaired.

use crate::donor::DonorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

// ============================================================================
// ERROR KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    MalformedKey,
    DonorMismatch,
    DuplicateKey,
    UnclassifiedAnatomy,
    UnmatchedRow,
    UnmatchedFile,
}

impl ErrorKind {
    pub fn name(&self) -> &str {
        match self {
            ErrorKind::MalformedKey => "MalformedKey",
            ErrorKind::DonorMismatch => "DonorMismatch",
            ErrorKind::DuplicateKey => "DuplicateKey",
            ErrorKind::UnclassifiedAnatomy => "UnclassifiedAnatomy",
            ErrorKind::UnmatchedRow => "UnmatchedRow",
            ErrorKind::UnmatchedFile => "UnmatchedFile",
        }
    }
}

/// Which side of the join a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordOrigin {
    Row,
    File,
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordOrigin::Row => write!(f, "spreadsheet row"),
            RecordOrigin::File => write!(f, "image file"),
        }
    }
}

// ============================================================================
// UNMATCHED REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedRow {
    /// 1-based line in the tabulated sheet
    pub line: usize,
    pub label: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedFile {
    pub path: PathBuf,
    pub key: String,
}

/// Complete listing of both sides of a failed join
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedReport {
    pub rows: Vec<UnmatchedRow>,
    pub files: Vec<UnmatchedFile>,
}

impl UnmatchedReport {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.files.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} unmatched row(s), {} unmatched file(s)",
            self.rows.len(),
            self.files.len()
        )
    }
}

impl fmt::Display for UnmatchedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())?;
        for row in &self.rows {
            write!(
                f,
                "\n  row #{} '{}' (key '{}') matches no image file",
                row.line, row.label, row.key
            )?;
        }
        for file in &self.files {
            write!(
                f,
                "\n  image file '{}' (key '{}') matches no spreadsheet row",
                file.path.display(),
                file.key
            )?;
        }
        Ok(())
    }
}

// ============================================================================
// RECONCILE ERROR
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconcileError {
    #[error("malformed key from '{raw}': {reason}")]
    MalformedKey { raw: String, reason: String },

    #[error("inconsistent donor ID in {record}: expected {expected}, found {found}")]
    DonorMismatch {
        record: String,
        expected: DonorId,
        found: DonorId,
    },

    #[error("duplicate key '{key}' in {origin}: '{first}' and '{second}'")]
    DuplicateKey {
        key: String,
        origin: RecordOrigin,
        first: String,
        second: String,
    },

    #[error("valid anatomy name not found in '{text}': {reason}")]
    UnclassifiedAnatomy { text: String, reason: String },

    #[error("rows and image files do not match: {0}")]
    Unmatched(UnmatchedReport),
}

impl ReconcileError {
    pub fn malformed(raw: &str, reason: impl Into<String>) -> Self {
        ReconcileError::MalformedKey {
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unclassified(text: &str, reason: impl Into<String>) -> Self {
        ReconcileError::UnclassifiedAnatomy {
            text: text.to_string(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::MalformedKey { .. } => ErrorKind::MalformedKey,
            ReconcileError::DonorMismatch { .. } => ErrorKind::DonorMismatch,
            ReconcileError::DuplicateKey { .. } => ErrorKind::DuplicateKey,
            ReconcileError::UnclassifiedAnatomy { .. } => ErrorKind::UnclassifiedAnatomy,
            ReconcileError::Unmatched(report) if !report.rows.is_empty() => {
                ErrorKind::UnmatchedRow
            }
            ReconcileError::Unmatched(_) => ErrorKind::UnmatchedFile,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
