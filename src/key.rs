// 🔑 Key Extraction - raw labels → identity keys
// Filenames and spreadsheet cells are typed by hand; the key keeps only the
// characters that survive years of inconsistent data entry.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Default donor-prefix token
pub const DEFAULT_DONOR_PREFIX: &str = "HPAP";

// ============================================================================
// CORE TYPES
// ============================================================================

/// Which characters survive extraction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionMode {
    /// Letters, digits, `_` and `-`
    Strict,
    /// ASCII digits and `_` only
    Loose,
}

impl ExtractionMode {
    pub fn keeps(&self, c: char) -> bool {
        match self {
            ExtractionMode::Strict => c == '_' || c == '-' || c.is_alphanumeric(),
            ExtractionMode::Loose => c == '_' || c.is_ascii_digit(),
        }
    }
}

/// Normalized string used to join a spreadsheet row to an image file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IdentityKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// KEY EXTRACTOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct KeyExtractor {
    donor_prefix: String,
}

impl KeyExtractor {
    pub fn new(donor_prefix: impl Into<String>) -> Self {
        KeyExtractor {
            donor_prefix: donor_prefix.into(),
        }
    }

    pub fn donor_prefix(&self) -> &str {
        &self.donor_prefix
    }

    /// Filter `raw` down to the characters `mode` keeps
    ///
    /// Fails only when nothing survives. Re-extracting an extracted key
    /// returns it unchanged.
    pub fn extract(&self, raw: &str, mode: ExtractionMode) -> Result<IdentityKey> {
        let key: String = raw.chars().filter(|c| mode.keeps(*c)).collect();

        if key.is_empty() {
            return Err(ReconcileError::malformed(raw, "no usable characters"));
        }

        Ok(IdentityKey(key))
    }

    /// Strict key that must start with the donor prefix
    ///
    /// Used for spreadsheet labels, and for filenames whenever the file is
    /// expected to carry its donor.
    pub fn prefixed_key(&self, raw: &str) -> Result<IdentityKey> {
        let key = self.extract(raw, ExtractionMode::Strict)?;

        if !key.as_str().starts_with(&self.donor_prefix) {
            return Err(ReconcileError::malformed(
                raw,
                format!("does not begin with '{}'", self.donor_prefix),
            ));
        }

        Ok(key)
    }

    /// Key of a spreadsheet row's identity label
    pub fn row_key(&self, label: &str) -> Result<IdentityKey> {
        self.prefixed_key(label.trim())
    }

    /// Key of an image file, from its basename with the extension removed
    pub fn file_key(&self, path: &Path) -> Result<IdentityKey> {
        self.prefixed_key(&file_stem(path))
    }

    /// Digits-and-underscores skeleton of an image file's basename
    pub fn file_skeleton(&self, path: &Path) -> Result<IdentityKey> {
        self.extract(&file_stem(path), ExtractionMode::Loose)
    }

    /// Key of a spreadsheet image-id cell: `"00123"` and `"123.0"` → `"123"`
    pub fn image_id_key(&self, raw: &str) -> Result<IdentityKey> {
        let trimmed = raw.trim();
        let integral = match trimmed.split_once('.') {
            Some((int, frac)) if frac.chars().all(|c| c == '0') => int,
            _ => trimmed,
        };

        if integral.is_empty() || !integral.chars().all(|c| c.is_ascii_digit()) {
            return Err(ReconcileError::malformed(raw, "image id is not a number"));
        }

        Ok(IdentityKey(strip_leading_zeros(integral)))
    }

    /// Image id embedded in a filename: the last `_`-separated segment of
    /// the loose skeleton
    ///
    /// `"HPAP-001_Slide_00123.ndpi"` → `"123"`
    ///
    /// A basename carrying the donor prefix needs a segment after the donor
    /// head, so `"HPAP-001.ndpi"` has no image id rather than id `1`.
    pub fn file_image_id_key(&self, path: &Path) -> Result<IdentityKey> {
        let stem = file_stem(path);
        let skeleton = self.file_skeleton(path)?;

        let last = match skeleton.as_str().rsplit_once('_') {
            Some((_, last)) => last,
            None if self.prefixed_key(&stem).is_ok() => {
                return Err(ReconcileError::malformed(
                    &stem,
                    "only the donor number, no image id after it",
                ));
            }
            None => skeleton.as_str(),
        };

        if last.is_empty() {
            return Err(ReconcileError::malformed(
                &stem,
                "no image id at the end of the filename",
            ));
        }

        Ok(IdentityKey(strip_leading_zeros(last)))
    }
}

fn strip_leading_zeros(digits: &str) -> String {
    let stripped = digits.trim_start_matches('0');
    if stripped.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

impl Default for KeyExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DONOR_PREFIX)
    }
}

/// Basename of `path` with its last extension removed
///
/// `"dir/HPAP-001_a.b.ndpi"` → `"HPAP-001_a.b"`
pub fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

/// Extension of `path` exactly as written, without the dot
pub fn file_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_string_lossy().into_owned();
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext.to_string()),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
