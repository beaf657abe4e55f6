//! Reconciliation of stored checksums against reference (`RDS `) values

use crate::integrity::ChecksumAlgorithm;
use crate::storage::MetadataRecord;
use serde::{Deserialize, Serialize};

/// Integrity classification of one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityStatus {
    /// At least one reference checksum equals the stored checksum
    Match,
    /// Reference checksums exist but none equals its stored counterpart
    Mismatch,
    /// No reference checksum to compare against
    Unknown,
}

/// Classify `record` by comparing each `RDS <ALG>` field with `<ALG>`
///
/// Hex comparison ignores case; CRC32 is stored upper-case while reference
/// documents are typed by hand.
pub fn reconcile(record: &MetadataRecord) -> IntegrityStatus {
    let mut has_reference = false;

    for algorithm in ChecksumAlgorithm::ALL {
        let field = algorithm.field_name();
        let Some(reference) = record.reference(field).filter(|r| !r.trim().is_empty()) else {
            continue;
        };
        has_reference = true;

        if record
            .get(field)
            .is_some_and(|stored| stored.trim().eq_ignore_ascii_case(reference.trim()))
        {
            return IntegrityStatus::Match;
        }
    }

    if has_reference {
        IntegrityStatus::Mismatch
    } else {
        IntegrityStatus::Unknown
    }
}
