//! Integrity Layer
//!
//! - Single-pass multi-algorithm checksums (CRC32, CRC64, SHA1, SHA256, BLAKE2sp)
//! - Reconciliation of stored checksums against reference (`RDS `) values

pub mod checksum;
pub mod reconcile;

pub use checksum::{ChecksumAlgorithm, ChecksumEngine, ChecksumSet};
pub use reconcile::{reconcile, IntegrityStatus};
