//! Provenance Document Sync
//!
//! Owns the `## RDS` section of each directory's `README.md`, which records
//! externally asserted ("reference") checksums and review metadata, and the
//! import of rendered HTML review reports into that section.

pub mod document;
pub mod report;

pub use document::{
    extract_from_document, parse_rds_section, readme_path, write, README_FILE_NAME, RDS_MARKER,
};
pub use report::{extract_from_report, import_report, parse_report};
