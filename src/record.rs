// 📋 Batch Records - rows, files, and what they become once joined

use crate::anatomy::AnatomyLabel;
use crate::donor::DonorId;
use crate::key::IdentityKey;
use crate::stain::StainLabel;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One logical record of the metadata sheet, as tabulated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadsheetRow {
    /// 1-based line in the source sheet (header is line 1)
    pub line: usize,
    pub identity_label: String,
    pub stain_label: String,
    pub image_id: Option<String>,
    /// Explicit anatomy cell; the identity label is used when absent
    pub anatomy_text: Option<String>,
}

impl SpreadsheetRow {
    pub fn new(line: usize, identity_label: &str, stain_label: &str) -> Self {
        SpreadsheetRow {
            line,
            identity_label: identity_label.to_string(),
            stain_label: stain_label.to_string(),
            image_id: None,
            anatomy_text: None,
        }
    }

    pub fn with_image_id(mut self, image_id: &str) -> Self {
        self.image_id = Some(image_id.to_string());
        self
    }

    pub fn with_anatomy(mut self, anatomy_text: &str) -> Self {
        self.anatomy_text = Some(anatomy_text.to_string());
        self
    }

    /// Blank cells count as absent
    pub fn has_image_id(&self) -> bool {
        self.image_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn anatomy_source(&self) -> &str {
        match self.anatomy_text.as_deref() {
            Some(text) if !text.trim().is_empty() => text,
            _ => &self.identity_label,
        }
    }

    /// How this row is named in error messages
    pub fn describe(&self) -> String {
        format!("row #{} '{}'", self.line, self.identity_label)
    }
}

/// A row after key extraction and classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedRow {
    pub row: SpreadsheetRow,
    /// Strict, donor-prefixed key of the identity label
    pub key: IdentityKey,
    /// Key used for the join (depends on the matching mode)
    pub join_key: IdentityKey,
    pub donor: DonorId,
    pub anatomy: AnatomyLabel,
    pub stain: StainLabel,
}

/// An image file in the source directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFile {
    pub path: PathBuf,
    pub join_key: IdentityKey,
}

impl ImageFile {
    pub fn describe(&self) -> String {
        format!("image file '{}'", self.path.display())
    }
}

/// One row joined with exactly one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedRecord {
    pub row: SpreadsheetRow,
    pub source: PathBuf,
    pub key: IdentityKey,
    pub donor: DonorId,
    pub anatomy: AnatomyLabel,
    pub stain: StainLabel,
}

impl MatchedRecord {
    pub fn join(prepared: PreparedRow, file: ImageFile) -> Self {
        MatchedRecord {
            row: prepared.row,
            source: file.path,
            key: prepared.key,
            donor: prepared.donor,
            anatomy: prepared.anatomy,
            stain: prepared.stain,
        }
    }
}
