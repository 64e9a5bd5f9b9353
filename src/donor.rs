// 🧬 Donor Resolution - one donor per batch
// Mixing two donors' slides in one upload is the mistake this guards against.

use crate::error::{ReconcileError, Result};
use crate::key::IdentityKey;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Zero-padded (at least 3 digits) donor number
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DonorId(String);

impl DonorId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `"HPAP"` + `"001"` → `"HPAP-001"`, the form used in destination names
    pub fn label(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.0)
    }
}

impl fmt::Display for DonorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the donor from a key such as `HPAP-1_Spleen` → `001`
///
/// Only the text before the first `_` is considered. The prefix token is
/// stripped along with any `-` separators that follow it; what remains must
/// be digits.
pub fn resolve_donor_id(key: &IdentityKey, prefix: &str) -> Result<DonorId> {
    let head = key
        .as_str()
        .split_once('_')
        .map(|(head, _)| head)
        .unwrap_or(key.as_str());

    let digits = head
        .strip_prefix(prefix)
        .ok_or_else(|| {
            ReconcileError::malformed(key.as_str(), format!("donor prefix '{}' not found", prefix))
        })?
        .trim_start_matches('-');

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ReconcileError::malformed(
            key.as_str(),
            format!("no donor number after '{}'", prefix),
        ));
    }

    Ok(DonorId(format!("{:0>3}", digits)))
}

// ============================================================================
// DONOR RESOLVER
// ============================================================================

/// Per-batch donor consistency check
///
/// The first resolved donor becomes the reference; every later record must
/// resolve to the same one.
#[derive(Debug, Clone)]
pub struct DonorResolver {
    prefix: String,
    reference: Option<(DonorId, String)>,
}

impl DonorResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        DonorResolver {
            prefix: prefix.into(),
            reference: None,
        }
    }

    /// Resolve `key` and check it against the batch donor
    ///
    /// `record` names the row or file in error messages.
    pub fn check(&mut self, key: &IdentityKey, record: &str) -> Result<DonorId> {
        let donor = resolve_donor_id(key, &self.prefix)?;

        match &self.reference {
            None => {
                debug!(donor = %donor, record, "batch donor established");
                self.reference = Some((donor.clone(), record.to_string()));
            }
            Some((expected, _)) if *expected != donor => {
                return Err(ReconcileError::DonorMismatch {
                    record: record.to_string(),
                    expected: expected.clone(),
                    found: donor,
                });
            }
            Some(_) => {}
        }

        Ok(donor)
    }

    /// The batch donor, once any record has been checked
    pub fn donor(&self) -> Option<&DonorId> {
        self.reference.as_ref().map(|(donor, _)| donor)
    }

    /// The record that established the batch donor
    pub fn established_by(&self) -> Option<&str> {
        self.reference.as_ref().map(|(_, record)| record.as_str())
    }
}

// ============================================================================
// TESTS
// ============================================================================
