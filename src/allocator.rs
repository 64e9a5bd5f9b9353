// 🏷️ Destination Allocation - deterministic, collision-free names
//
// Name format:
//   <HPAP-donor>_Histology_<long anatomy>_<stain>_H-and-E_<n>.<ext>
//
// `n` counts per (donor, long anatomy, stain) group, from 1, in a fixed
// sort order over the whole batch. Filesystem listing order and sheet row
// order never influence it.

use crate::donor::DonorId;
use crate::key::file_extension;
use crate::record::MatchedRecord;
use crate::stain::StainLabel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

// ============================================================================
// GROUP KEY & CONTEXT
// ============================================================================

/// Scope of one uniqueness counter
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey {
    pub donor: DonorId,
    pub long_anatomy: String,
    pub stain: StainLabel,
}

/// Uniqueness counters for exactly one batch
///
/// The allocator consumes the context, so counters can never leak into a
/// second batch.
#[derive(Debug, Default)]
pub struct AllocationContext {
    counters: HashMap<GroupKey, u32>,
}

impl AllocationContext {
    pub fn new() -> Self {
        AllocationContext {
            counters: HashMap::new(),
        }
    }

    /// Next sequence number for `group`, starting at 1
    pub fn next(&mut self, group: &GroupKey) -> u32 {
        let counter = self.counters.entry(group.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    pub fn group_count(&self) -> usize {
        self.counters.len()
    }
}

// ============================================================================
// DESTINATION
// ============================================================================

/// Where one source file goes, relative to the batch root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub source: PathBuf,
    /// Short anatomy form, used as the grouping directory
    pub directory: String,
    pub file_name: String,
    pub group: GroupKey,
    pub sequence: u32,
}

impl Destination {
    /// `<directory>/<file_name>`
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.directory).join(&self.file_name)
    }
}

// ============================================================================
// ALLOCATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct DestinationAllocator {
    donor_prefix: String,
}

impl DestinationAllocator {
    pub fn new(donor_prefix: impl Into<String>) -> Self {
        DestinationAllocator {
            donor_prefix: donor_prefix.into(),
        }
    }

    /// Assign a destination to every record
    ///
    /// Records are sorted by long anatomy, then stain, then numeric image id,
    /// then identity key and source path as final tie-breakers. The result
    /// follows that order.
    pub fn allocate(
        &self,
        mut records: Vec<MatchedRecord>,
        mut context: AllocationContext,
    ) -> Vec<Destination> {
        records.sort_by_cached_key(sort_key);

        let destinations: Vec<Destination> = records
            .into_iter()
            .map(|record| {
                let group = GroupKey {
                    donor: record.donor.clone(),
                    long_anatomy: record.anatomy.long_form().to_string(),
                    stain: record.stain.clone(),
                };
                let sequence = context.next(&group);
                let file_name = self.file_name(&group, sequence, &record);

                debug!(
                    source = %record.source.display(),
                    destination = %file_name,
                    "destination allocated"
                );

                Destination {
                    source: record.source,
                    directory: record.anatomy.short_form().to_string(),
                    file_name,
                    group,
                    sequence,
                }
            })
            .collect();

        debug!(groups = context.group_count(), "allocation finished");
        destinations
    }

    fn file_name(&self, group: &GroupKey, sequence: u32, record: &MatchedRecord) -> String {
        let stem = format!(
            "{}_Histology_{}_{}_H-and-E_{}",
            group.donor.label(&self.donor_prefix),
            group.long_anatomy,
            group.stain,
            sequence
        );

        match file_extension(&record.source) {
            Some(ext) => format!("{}.{}", stem, ext),
            None => stem,
        }
    }
}

type SortKey = (String, StainLabel, Option<u64>, String, PathBuf);

fn sort_key(record: &MatchedRecord) -> SortKey {
    let image_id = record
        .row
        .image_id
        .as_deref()
        .and_then(|id| id.trim().split('.').next())
        .and_then(|id| id.parse::<u64>().ok());

    (
        record.anatomy.long_form().to_string(),
        record.stain.clone(),
        image_id,
        record.key.to_string(),
        record.source.clone(),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anatomy::AnatomyClassifier;
    use crate::donor::resolve_donor_id;
    use crate::key::KeyExtractor;
    use crate::record::SpreadsheetRow;

    fn record(label: &str, stain: &str, file: &str, image_id: Option<&str>) -> MatchedRecord {
        let key = KeyExtractor::default().row_key(label).unwrap();
        let mut row = SpreadsheetRow::new(2, label, stain);
        if let Some(id) = image_id {
            row = row.with_image_id(id);
        }

        MatchedRecord {
            donor: resolve_donor_id(&key, "HPAP").unwrap(),
            anatomy: AnatomyClassifier::new().classify(label).unwrap(),
            stain: StainLabel::normalize(stain),
            source: PathBuf::from(file),
            key,
            row,
        }
    }

    fn names(destinations: &[Destination]) -> Vec<String> {
        destinations.iter().map(|d| d.file_name.clone()).collect()
    }

    #[test]
    fn test_scenario_shared_group_counts_up() {
        let allocator = DestinationAllocator::new("HPAP");
        let records = vec![
            record("HPAP-001_Pancreas head_B", "OCT", "/in/b.ndpi", None),
            record("HPAP-001_Pancreas head_A", "OCT", "/in/a.ndpi", None),
        ];

        let destinations = allocator.allocate(records, AllocationContext::new());
        assert_eq!(
            names(&destinations),
            vec![
                "HPAP-001_Histology_Head-of-pancreas_OCT-flash-frozen_H-and-E_1.ndpi",
                "HPAP-001_Histology_Head-of-pancreas_OCT-flash-frozen_H-and-E_2.ndpi",
            ]
        );
        assert_eq!(destinations[0].source, PathBuf::from("/in/a.ndpi"));
        assert_eq!(destinations[0].directory, "Pancreas");
        assert_eq!(destinations[1].sequence, 2);

        println!("✅ Group counter test passed");
    }

    #[test]
    fn test_groups_count_independently() {
        let allocator = DestinationAllocator::new("HPAP");
        let records = vec![
            record("HPAP-001_Spleen_1", "FFPE", "/in/s1.ndpi", None),
            record("HPAP-001_Spleen_2", "OCT", "/in/s2.ndpi", None),
            record("HPAP-001_LN-SMA", "OCT", "/in/ln.ndpi", None),
            record("HPAP-001_Spleen_3", "FFPE", "/in/s3.ndpi", None),
        ];

        let destinations = allocator.allocate(records, AllocationContext::new());
        assert_eq!(
            names(&destinations),
            vec![
                "HPAP-001_Histology_Lymph-node-SMA_OCT-flash-frozen_H-and-E_1.ndpi",
                "HPAP-001_Histology_Spleen_FFPE_H-and-E_1.ndpi",
                "HPAP-001_Histology_Spleen_FFPE_H-and-E_2.ndpi",
                "HPAP-001_Histology_Spleen_OCT-flash-frozen_H-and-E_1.ndpi",
            ]
        );
        assert_eq!(destinations[0].directory, "Lymph node");
        assert_eq!(
            destinations[0].relative_path(),
            PathBuf::from("Lymph node/HPAP-001_Histology_Lymph-node-SMA_OCT-flash-frozen_H-and-E_1.ndpi")
        );
    }

    #[test]
    fn test_image_id_orders_within_group() {
        let allocator = DestinationAllocator::new("HPAP");
        let records = vec![
            record("HPAP-001_Thymus_a", "OCT", "/in/a.ndpi", Some("100")),
            record("HPAP-001_Thymus_b", "OCT", "/in/b.ndpi", Some("9")),
        ];

        let destinations = allocator.allocate(records, AllocationContext::new());
        assert_eq!(destinations[0].source, PathBuf::from("/in/b.ndpi"));
        assert_eq!(destinations[0].sequence, 1);
        assert_eq!(destinations[1].source, PathBuf::from("/in/a.ndpi"));
    }

    #[test]
    fn test_allocation_ignores_arrival_order() {
        let allocator = DestinationAllocator::new("HPAP");
        let records = vec![
            record("HPAP-001_Pancreas tail_1", "OCT", "/in/1.ndpi", None),
            record("HPAP-001_Pancreas tail_2", "OCT", "/in/2.ndpi", None),
            record("HPAP-001_Duod prox_1", "Vanderbilt", "/in/3.ndpi", None),
            record("HPAP-001_Pancreas tail_3", "FFPE", "/in/4.ndpi", None),
        ];

        let forward = allocator.allocate(records.clone(), AllocationContext::new());
        let mut reversed = records;
        reversed.reverse();
        let backward = allocator.allocate(reversed, AllocationContext::new());

        assert_eq!(forward, backward);
    }

    #[test]
    fn test_extension_preserved_verbatim() {
        let allocator = DestinationAllocator::new("HPAP");
        let records = vec![
            record("HPAP-001_Artery", "FFPE", "/in/x.NDPI", None),
            record("HPAP-001_Artery_2", "FFPE", "/in/noext", None),
        ];

        let destinations = allocator.allocate(records, AllocationContext::new());
        assert_eq!(
            names(&destinations),
            vec![
                "HPAP-001_Histology_Artery_FFPE_H-and-E_1.NDPI",
                "HPAP-001_Histology_Artery_FFPE_H-and-E_2",
            ]
        );
    }

    #[test]
    fn test_context_counts_from_one() {
        let group = GroupKey {
            donor: resolve_donor_id(&KeyExtractor::default().row_key("HPAP-9").unwrap(), "HPAP")
                .unwrap(),
            long_anatomy: "Spleen".to_string(),
            stain: StainLabel::normalize("FFPE"),
        };

        let mut context = AllocationContext::new();
        assert_eq!(context.next(&group), 1);
        assert_eq!(context.next(&group), 2);
        assert_eq!(context.group_count(), 1);

        let mut fresh = AllocationContext::new();
        assert_eq!(fresh.next(&group), 1);
    }
}
