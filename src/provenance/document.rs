//! `README.md` provenance section
//!
//! The section starts at a `## RDS` line and runs to the next `## ` heading or
//! end of file. Each field is one line:
//!
//! ```text
//! ## RDS
//! - **SHA256**: `e3b0c442...`
//! - **Version**: `1.0`
//! ```
//!
//! Only this section is owned here; every other line of the document is kept
//! verbatim and in order.

use crate::error::{AppError, Result};
use crate::storage::MetadataRecord;
use crate::utils::write_atomic;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const README_FILE_NAME: &str = "README.md";
pub const RDS_MARKER: &str = "## RDS";

const SECTION_PREFIX: &str = "## ";
const FIELD_OPEN: &str = "- **";
const FIELD_SEPARATOR: &str = "**: `";
const FIELD_CLOSE: char = '`';

pub fn readme_path(dir: &Path) -> PathBuf {
    dir.join(README_FILE_NAME)
}

/// Read the RDS fields of `dir/README.md`
///
/// A missing document or a document without the marker yields an empty
/// record. Keys are returned as written, without any prefix.
pub fn extract_from_document(dir: &Path) -> Result<MetadataRecord> {
    let path = readme_path(dir);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MetadataRecord::new()),
        Err(e) => {
            return Err(AppError::io_error(
                format!("Failed to read provenance document: {}", e),
                Some(path),
            ))
        }
    };

    let fields = parse_rds_section(&content);
    debug!(path = %path.display(), fields = fields.len(), "Extracted provenance fields");
    Ok(fields)
}

/// Parse the RDS section out of a Markdown document
pub fn parse_rds_section(content: &str) -> MetadataRecord {
    let mut fields = MetadataRecord::new();
    let mut in_section = false;

    for line in content.lines() {
        if line.trim() == RDS_MARKER {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if line.starts_with(SECTION_PREFIX) {
            break;
        }
        if let Some((key, value)) = parse_field_line(line) {
            fields.insert(key, value);
        }
    }

    fields
}

fn parse_field_line(line: &str) -> Option<(String, String)> {
    if !line.ends_with(FIELD_CLOSE) {
        return None;
    }
    let (key, rest) = line.strip_prefix(FIELD_OPEN)?.split_once(FIELD_SEPARATOR)?;
    let value = rest.strip_suffix(FIELD_CLOSE).unwrap_or(rest);
    Some((key.trim().to_string(), value.trim().to_string()))
}

fn format_field_line(key: &str, value: &str) -> String {
    format!("{}{}{}{}{}", FIELD_OPEN, key, FIELD_SEPARATOR, value.trim(), FIELD_CLOSE)
}

/// Fields as they will appear in the document: filename keys dropped, keys
/// trimmed, every key and value on a single line
fn prepare_fields(fields: &MetadataRecord) -> Result<MetadataRecord> {
    let mut prepared = MetadataRecord::new();
    for (key, value) in fields.iter() {
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::ProvenanceFormat("empty field name".to_string()));
        }
        if key.contains(FIELD_SEPARATOR) {
            return Err(AppError::ProvenanceFormat(format!(
                "field name {:?} contains the field separator",
                key
            )));
        }
        if [key, value].iter().any(|s| s.contains(&['\n', '\r'][..])) {
            return Err(AppError::ProvenanceFormat(format!(
                "field {:?} spans more than one line",
                key
            )));
        }
        prepared.insert(key, value.trim());
    }
    prepared.strip_filename();
    Ok(prepared)
}

/// Write `fields` into the RDS section of `dir/README.md`
///
/// Without a document, one is created holding only the RDS section. With a
/// document, lines for the written keys and any `## RDS` line are removed and
/// a fresh section is appended at the end.
///
/// Keys and values are written trimmed, the same way `extract_from_document`
/// reads them back: a field `" Version "` = `" 1.0 "` round-trips as
/// `"Version"` = `"1.0"`. The document keeps its file permissions.
pub fn write(dir: &Path, fields: &MetadataRecord) -> Result<()> {
    let fields = prepare_fields(fields)?;
    let path = readme_path(dir);

    let (mut lines, created): (Vec<String>, bool) = match std::fs::read_to_string(&path) {
        Ok(existing) => {
            let written_prefixes: Vec<String> = fields
                .keys()
                .map(|key| format!("{}{}**:", FIELD_OPEN, key))
                .collect();

            let kept = existing
                .lines()
                .filter(|line| line.trim() != RDS_MARKER)
                .filter(|line| !written_prefixes.iter().any(|p| line.starts_with(p.as_str())))
                .map(str::to_string)
                .collect();
            (kept, false)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => (Vec::new(), true),
        Err(e) => {
            return Err(AppError::io_error(
                format!("Failed to read provenance document: {}", e),
                Some(path),
            ))
        }
    };

    lines.push(RDS_MARKER.to_string());
    lines.extend(fields.iter().map(|(k, v)| format_field_line(k, v)));

    let mut content = lines.join("\n");
    content.push('\n');

    write_atomic(&path, content.as_bytes()).map_err(|e| {
        AppError::io_error(
            format!("Failed to write provenance document: {}", e),
            Some(path.clone()),
        )
    })?;

    info!(
        path = %path.display(),
        fields = fields.len(),
        created,
        "Provenance section written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_document_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(extract_from_document(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_document_without_marker_is_empty() {
        let fields = parse_rds_section("# Title\n- **SHA256**: `abc`\n");
        assert!(fields.is_empty());
    }

    #[test]
    fn test_section_ends_at_next_heading() {
        let doc = "# Release\n\n## RDS\n- **SHA256**: `abc123`\n- **Version**: ` 1.0 `\nnot a field\n## Notes\n- **Other**: `x`\n";
        let fields = parse_rds_section(doc);

        assert_eq!(
            fields,
            MetadataRecord::from([("SHA256", "abc123"), ("Version", "1.0")])
        );
    }

    #[test]
    fn test_malformed_field_lines_skipped() {
        let doc = "## RDS\n- **A**: `1`\n- **B**: 2\n* **C**: `3`\n- **D** `4`\n";
        assert_eq!(parse_rds_section(doc), MetadataRecord::from([("A", "1")]));
    }

    #[test]
    fn test_crlf_document() {
        let doc = "## RDS\r\n- **SHA1**: `abc`\r\n";
        assert_eq!(parse_rds_section(doc), MetadataRecord::from([("SHA1", "abc")]));
    }

    #[test]
    fn test_write_creates_document() {
        let dir = TempDir::new().unwrap();
        let fields = MetadataRecord::from([("SHA256", "abc"), ("Filename", "a.bin")]);

        write(dir.path(), &fields).unwrap();

        let content = std::fs::read_to_string(readme_path(dir.path())).unwrap();
        assert_eq!(content, "## RDS\n- **SHA256**: `abc`\n");
    }

    #[test]
    fn test_write_preserves_other_content() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            readme_path(dir.path()),
            "# Project\n\nIntro text.\n## RDS\n- **SHA256**: `old`\n- **Version**: `0.9`\n## Changelog\n- fixed things\n",
        )
        .unwrap();

        write(dir.path(), &MetadataRecord::from([("SHA256", "new")])).unwrap();

        let content = std::fs::read_to_string(readme_path(dir.path())).unwrap();
        assert_eq!(
            content,
            "# Project\n\nIntro text.\n- **Version**: `0.9`\n## Changelog\n- fixed things\n## RDS\n- **SHA256**: `new`\n"
        );
        assert_eq!(
            extract_from_document(dir.path()).unwrap(),
            MetadataRecord::from([("SHA256", "new")])
        );
    }

    #[test]
    fn test_write_twice_is_idempotent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(readme_path(dir.path()), "# Title\nBody\n").unwrap();
        let fields = MetadataRecord::from([("SHA256", "abc"), ("Version", "2")]);

        write(dir.path(), &fields).unwrap();
        let first = std::fs::read_to_string(readme_path(dir.path())).unwrap();
        write(dir.path(), &fields).unwrap();
        let second = std::fs::read_to_string(readme_path(dir.path())).unwrap();

        assert_eq!(first, second);
        assert_eq!(extract_from_document(dir.path()).unwrap(), fields);
    }

    #[test]
    fn test_write_trims_keys_and_values() {
        let dir = TempDir::new().unwrap();

        write(dir.path(), &MetadataRecord::from([(" Version ", "  1.0 ")])).unwrap();

        let content = std::fs::read_to_string(readme_path(dir.path())).unwrap();
        assert_eq!(content, "## RDS\n- **Version**: `1.0`\n");
        assert_eq!(
            extract_from_document(dir.path()).unwrap(),
            MetadataRecord::from([("Version", "1.0")])
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_write_keeps_document_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = readme_path(dir.path());
        std::fs::write(&path, "# Title\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        write(dir.path(), &MetadataRecord::from([("SHA256", "abc")])).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }

    #[test]
    fn test_multiline_value_rejected() {
        let dir = TempDir::new().unwrap();
        let result = write(dir.path(), &MetadataRecord::from([("Note", "a\nb")]));
        assert!(matches!(result, Err(AppError::ProvenanceFormat(_))));
        assert!(!readme_path(dir.path()).exists());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn field_map() -> impl Strategy<Value = MetadataRecord> {
            prop::collection::btree_map(
                "[A-Za-z][A-Za-z0-9 _-]{0,12}[A-Za-z0-9]",
                "[A-Za-z0-9][A-Za-z0-9 .:/_-]{0,30}[A-Za-z0-9]",
                1..8,
            )
            .prop_filter("filename keys are never written", |m| {
                !m.keys().any(|k| k == "Filename" || k == "File name")
            })
            .prop_map(|m| m.into_iter().collect())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn prop_write_then_extract_round_trips(fields in field_map(), preamble in "[A-Za-z .]{0,40}") {
                let dir = TempDir::new().unwrap();
                if !preamble.is_empty() {
                    std::fs::write(readme_path(dir.path()), format!("# Title\n{}\n", preamble)).unwrap();
                }

                write(dir.path(), &fields).unwrap();
                prop_assert_eq!(extract_from_document(dir.path()).unwrap(), fields.clone());

                write(dir.path(), &fields).unwrap();
                prop_assert_eq!(extract_from_document(dir.path()).unwrap(), fields);
            }
        }
    }
}
