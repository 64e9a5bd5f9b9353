// 🧪 Stain Normalization - prep labels → canonical stain tokens

use serde::{Deserialize, Serialize};
use std::fmt;

pub const OCT_FLASH_FROZEN: &str = "OCT-flash-frozen";
pub const OCT_LIGHTLY_FIXED: &str = "OCT-lightly-fixed";

/// Canonical stain/prep token embedded in destination names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StainLabel(String);

impl StainLabel {
    /// Normalize a raw prep label
    ///
    /// Rules, in order:
    /// - exactly `OCT` → `OCT-flash-frozen`
    /// - contains `VAN` (Vanderbilt fixation) → `OCT-lightly-fixed`
    /// - anything else is kept, upper-cased and trimmed (`ffpe` → `FFPE`)
    ///
    /// Never fails: the stain vocabulary is open-ended.
    pub fn normalize(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();

        if upper == "OCT" {
            return StainLabel(OCT_FLASH_FROZEN.to_string());
        }

        if upper.contains("VAN") {
            return StainLabel(OCT_LIGHTLY_FIXED.to_string());
        }

        StainLabel(upper)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
