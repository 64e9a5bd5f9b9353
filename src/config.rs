// ⚙️ Run Configuration
// Defaults suit the histology scanner exports; a TOML file can override
// them and CLI flags override the file.

use crate::batch::BatchOptions;
use crate::key::DEFAULT_DONOR_PREFIX;
use crate::matcher::MatchingMode;
use crate::spreadsheet::SpreadsheetFormat;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// How rows are joined to files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchModeSetting {
    Auto,
    IdentityKey,
    ImageId,
}

impl MatchModeSetting {
    pub fn resolve(&self) -> Option<MatchingMode> {
        match self {
            MatchModeSetting::Auto => None,
            MatchModeSetting::IdentityKey => Some(MatchingMode::ByIdentityKey),
            MatchModeSetting::ImageId => Some(MatchingMode::ByNumericImageId),
        }
    }
}

impl FromStr for MatchModeSetting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(MatchModeSetting::Auto),
            "identity-key" | "identity_key" => Ok(MatchModeSetting::IdentityKey),
            "image-id" | "image_id" => Ok(MatchModeSetting::ImageId),
            other => Err(format!(
                "unknown match mode '{}' (expected auto, identity-key or image-id)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub donor_prefix: String,
    /// Without the dot
    pub image_extension: String,
    pub spreadsheet_extension: String,
    pub match_mode: MatchModeSetting,
    /// Compare SHA-256 of source and copy
    pub verify_copies: bool,
    pub manifest_name: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            donor_prefix: DEFAULT_DONOR_PREFIX.to_string(),
            image_extension: "ndpi".to_string(),
            spreadsheet_extension: "csv".to_string(),
            match_mode: MatchModeSetting::Auto,
            verify_copies: true,
            manifest_name: "manifest.json".to_string(),
        }
    }
}

impl RunConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: RunConfig = toml::from_str(content).context("Failed to parse config TOML")?;
        config.image_extension = config.image_extension.trim_start_matches('.').to_string();
        config.spreadsheet_extension = config.spreadsheet_extension.trim_start_matches('.').to_string();
        SpreadsheetFormat::from_extension(&config.spreadsheet_extension)?;
        Ok(config)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            donor_prefix: self.donor_prefix.clone(),
            match_mode: self.match_mode.resolve(),
        }
    }
}
