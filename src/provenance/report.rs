//! Rendered HTML review reports
//!
//! A review report is an HTML page whose `<p>` elements carry lines such as
//! `SHA256: e3b0...`. The labels are fixed; each one maps to a provenance
//! field. A report missing any required field yields nothing, so partial
//! provenance is never committed.

use crate::error::{AppError, Result};
use crate::integrity::ChecksumAlgorithm;
use crate::provenance::document;
use crate::storage::MetadataRecord;
use scraper::Html;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

pub const REVIEW_DATE_FIELD: &str = "Дата проверки";
pub const REFERENCE_FIELD: &str = "RDS";
pub const REFERENCE_LINK_FIELD: &str = "Ссылка на RDS";

/// `(label prefix, field name)` pairs recognised in report paragraphs
const REPORT_LABELS: &[(&str, &str)] = &[
    ("Дата проверки:", REVIEW_DATE_FIELD),
    ("Основание:", REFERENCE_FIELD),
    ("Ссылка на RDS:", REFERENCE_LINK_FIELD),
    ("CRC32:", "CRC32"),
    ("CRC64:", "CRC64"),
    ("SHA256:", "SHA256"),
    ("SHA1:", "SHA1"),
    ("BLAKE2sp:", "BLAKE2sp"),
];

const REQUIRED_FIELDS: &[&str] = &[REVIEW_DATE_FIELD, REFERENCE_FIELD];

/// Parse a review report file into provenance fields
pub fn extract_from_report(report_path: &Path) -> Result<MetadataRecord> {
    let html = std::fs::read_to_string(report_path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::NotFound(report_path.to_path_buf()),
        _ => AppError::io_error(
            format!("Failed to read review report: {}", e),
            Some(report_path.to_path_buf()),
        ),
    })?;

    let fields = parse_report(&html);
    if fields.is_empty() {
        warn!(
            path = %report_path.display(),
            "Review report lacks required fields, ignoring it"
        );
    }
    Ok(fields)
}

/// Collect labelled text nodes that are direct children of `<p>` elements
pub fn parse_report(html: &str) -> MetadataRecord {
    let document = Html::parse_document(html);
    let mut fields = MetadataRecord::new();

    let paragraphs = document
        .tree
        .root()
        .descendants()
        .filter(|node| node.value().as_element().is_some_and(|e| e.name() == "p"));

    for paragraph in paragraphs {
        for child in paragraph.children() {
            let Some(text) = child.value().as_text() else {
                continue;
            };
            let text = text.trim();
            if let Some((field, value)) = REPORT_LABELS
                .iter()
                .find_map(|(label, field)| text.strip_prefix(label).map(|v| (*field, v.trim())))
            {
                fields.insert(field, value);
            }
        }
    }

    if is_complete(&fields) {
        fields
    } else {
        MetadataRecord::new()
    }
}

fn is_complete(fields: &MetadataRecord) -> bool {
    let has_required = REQUIRED_FIELDS
        .iter()
        .all(|field| fields.get(field).is_some_and(|v| !v.is_empty()));
    let has_checksum = ChecksumAlgorithm::ALL
        .iter()
        .any(|alg| fields.get(alg.field_name()).is_some_and(|v| !v.is_empty()));
    has_required && has_checksum
}

/// Parse a review report and record its fields in the README of the report's
/// directory; returns the fields written (empty when the report is incomplete)
pub fn import_report(report_path: &Path) -> Result<MetadataRecord> {
    let fields = extract_from_report(report_path)?;
    if fields.is_empty() {
        return Ok(fields);
    }

    let dir = report_path.parent().ok_or_else(|| {
        AppError::invalid_path(format!("{} has no parent directory", report_path.display()))
    })?;
    document::write(dir, &fields)?;

    info!(
        report = %report_path.display(),
        fields = fields.len(),
        "Review report imported into provenance document"
    );
    Ok(fields)
}
