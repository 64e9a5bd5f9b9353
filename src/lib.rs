// Histology Curation - Core Library
// Reconciles a slide metadata sheet with a directory of scanned images and
// plans canonical, collision-free names for upload.

pub mod error;
pub mod key;            // KeyExtractor
pub mod donor;          // DonorResolver
pub mod stain;          // StainNormalizer
pub mod anatomy;        // AnatomyClassifier
pub mod record;
pub mod matcher;        // RowFileMatcher
pub mod allocator;      // DestinationAllocator
pub mod batch;
pub mod spreadsheet;
pub mod source;
pub mod copier;
pub mod config;

// Re-export commonly used types
pub use error::{
    ErrorKind, RecordOrigin, ReconcileError, UnmatchedFile, UnmatchedReport, UnmatchedRow,
};
pub use key::{ExtractionMode, IdentityKey, KeyExtractor, DEFAULT_DONOR_PREFIX};
pub use donor::{resolve_donor_id, DonorId, DonorResolver};
pub use stain::StainLabel;
pub use anatomy::{AnatomyClassifier, AnatomyLabel, Site};
pub use record::{ImageFile, MatchedRecord, PreparedRow, SpreadsheetRow};
pub use matcher::{MatchingMode, RowFileMatcher};
pub use allocator::{AllocationContext, Destination, DestinationAllocator, GroupKey};
pub use batch::{BatchOptions, BatchPlan, Reconciler};
pub use spreadsheet::{parse_rows, parse_workbook, read_rows, ColumnLayout, SpreadsheetFormat};
pub use source::{check_destination, normalize_dir_arg, scan_source, SourceListing};
pub use copier::{execute_plan, sha256_file, CopyOptions, Manifest, ManifestEntry};
pub use config::{MatchModeSetting, RunConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
