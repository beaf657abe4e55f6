//! Sidecar Metadata Store
//!
//! Owns one JSON sidecar per filesystem entry and keeps it in lockstep with
//! the entry across rename, move and delete.
//!
//! ## Sidecar Layout
//!
//! ```text
//! docs/
//! ├── README.md            # provenance document (## RDS section)
//! ├── report.pdf
//! └── .report.pdf.meta     # {"CRC32": "...", "RDS SHA256": "...", ...}
//! ```
//!
//! ## Merge Order
//!
//! 1. existing sidecar record (empty when absent)
//! 2. provenance fields of the parent `README.md`, prefixed with `RDS `,
//!    when the section applies to this entry
//! 3. caller-supplied fields
//!
//! Later layers win. Filename keys are stripped before every write, and the
//! write replaces the sidecar atomically.
//!
//! ## Concurrency
//!
//! Read-merge-write and mirror operations are serialised per entry path
//! through an on-demand lock table. Plain reads take no lock: sidecar writes
//! are atomic renames, so a reader sees either the old or the new record.

use crate::error::{AppError, Result};
use crate::integrity::{ChecksumEngine, ChecksumSet};
use crate::provenance;
use crate::storage::MetadataRecord;
use crate::utils::write_atomic;
use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use serde::Serialize;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Suffix appended to the entry's name to form its sidecar name
pub const SIDECAR_EXTENSION: &str = ".meta";

/// Sidecar path of `entry`: `.<name>.meta` in the same directory
///
/// # Example
///
/// ```
/// use file_station::storage::sidecar_path;
/// use std::path::Path;
///
/// let sidecar = sidecar_path(Path::new("/srv/docs/report.pdf")).unwrap();
/// assert_eq!(sidecar, Path::new("/srv/docs/.report.pdf.meta"));
/// ```
pub fn sidecar_path(entry: &Path) -> Result<PathBuf> {
    let name = entry.file_name().ok_or_else(|| {
        AppError::invalid_path(format!("{} has no entry name", entry.display()))
    })?;

    let mut sidecar_name = OsString::from(".");
    sidecar_name.push(name);
    sidecar_name.push(SIDECAR_EXTENSION);
    Ok(entry.with_file_name(sidecar_name))
}

/// Whether a directory entry name looks like a sidecar file
pub fn is_sidecar_name(name: &str) -> bool {
    name.len() > 1 + SIDECAR_EXTENSION.len()
        && name.starts_with('.')
        && name.ends_with(SIDECAR_EXTENSION)
}

/// Result of an on-demand checksum recalculation
///
/// The checksums are always available once the file was read; a failure to
/// store them is reported next to them instead of discarding them.
#[derive(Debug)]
pub struct RecalculationReport {
    pub checksums: ChecksumSet,
    pub persist_error: Option<AppError>,
}

impl RecalculationReport {
    pub fn persisted(&self) -> bool {
        self.persist_error.is_none()
    }

    /// Checksums if they were stored, the persist error otherwise
    pub fn into_result(self) -> Result<ChecksumSet> {
        match self.persist_error {
            None => Ok(self.checksums),
            Some(e) => Err(e),
        }
    }
}

type EntryMutexGuard = ArcMutexGuard<RawMutex, ()>;

/// Per-entry mutex table
///
/// Mutexes are created on first use and dropped from the table as soon as
/// the last holder releases them.
#[derive(Debug, Default)]
struct EntryLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl EntryLocks {
    fn acquire(&self, path: &Path) -> EntryGuard<'_> {
        let lock = self
            .locks
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        EntryGuard {
            table: self,
            path: path.to_path_buf(),
            guard: Some(lock.lock_arc()),
        }
    }

    /// Lock two entries in a global (sorted) order
    fn acquire_pair(&self, a: &Path, b: &Path) -> (EntryGuard<'_>, Option<EntryGuard<'_>>) {
        if a == b {
            return (self.acquire(a), None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.acquire(first);
        let second = self.acquire(second);
        (first, Some(second))
    }

    fn len(&self) -> usize {
        self.locks.len()
    }
}

struct EntryGuard<'a> {
    table: &'a EntryLocks,
    path: PathBuf,
    guard: Option<EntryMutexGuard>,
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.table
            .locks
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Sidecar metadata store
///
/// Operates on confined absolute paths (see [`crate::utils::PathResolver`]).
#[derive(Debug, Default)]
pub struct MetadataStore {
    locks: EntryLocks,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the sidecar record of `entry`
    ///
    /// # Errors
    ///
    /// - `MetadataDecode` if the sidecar exists but is not a JSON object of strings
    /// - `MetadataPersistence` if the sidecar exists but cannot be read
    ///
    /// A missing sidecar is not an error: the record is empty.
    pub fn read_metadata(&self, entry: &Path) -> Result<MetadataRecord> {
        let sidecar = sidecar_path(entry)?;
        load_sidecar(&sidecar)
    }

    /// Merge `new_fields` into the sidecar record of `entry` and persist it
    ///
    /// Returns the record as written.
    pub fn add_metadata(&self, entry: &Path, new_fields: MetadataRecord) -> Result<MetadataRecord> {
        let _guard = self.locks.acquire(entry);

        if let Err(e) = std::fs::symlink_metadata(entry) {
            return Err(match e.kind() {
                ErrorKind::NotFound => AppError::NotFound(entry.to_path_buf()),
                _ => AppError::persistence(entry, e.to_string()),
            });
        }

        let sidecar = sidecar_path(entry)?;
        let mut record = load_sidecar(&sidecar)?;

        if let Some(parent) = entry.parent() {
            let provenance = provenance::extract_from_document(parent).map_err(|e| {
                AppError::persistence(&sidecar, format!("provenance lookup failed: {}", e))
            })?;
            if provenance_applies(&provenance, entry) {
                debug!(
                    entry = %entry.display(),
                    fields = provenance.len(),
                    "Merging provenance fields"
                );
                record.merge(provenance.with_reference_prefix());
            }
        }

        record.merge(new_fields);
        record.strip_filename();

        persist_sidecar(&sidecar, &record)?;
        info!(
            entry = %entry.display(),
            fields = record.len(),
            "Metadata sidecar written"
        );
        Ok(record)
    }

    /// Recompute the checksums of `entry` and store them in its sidecar
    ///
    /// Fails only when the file cannot be hashed; a store failure is carried
    /// in the returned report.
    pub fn recalculate_and_store(&self, entry: &Path) -> Result<RecalculationReport> {
        let checksums = ChecksumEngine::recompute(entry)?;

        let persist_error = match self.add_metadata(entry, checksums.to_record()) {
            Ok(_) => None,
            Err(e) => {
                error!(entry = %entry.display(), error = %e, "Failed to store recalculated checksums");
                Some(e)
            }
        };

        Ok(RecalculationReport {
            checksums,
            persist_error,
        })
    }

    /// Rename `old` to `new` and carry its sidecar along
    pub fn rename_entry(&self, old: &Path, new: &Path) -> Result<()> {
        let _guards = self.locks.acquire_pair(old, new);
        relocate(old, new)?;
        info!(from = %old.display(), to = %new.display(), "Entry renamed");
        mirror_sidecar("rename", old, new)
    }

    /// Move `src` to `dest`, creating the destination directory first
    pub fn move_entry(&self, src: &Path, dest: &Path) -> Result<()> {
        let _guards = self.locks.acquire_pair(src, dest);

        if let Some(dest_dir) = dest.parent() {
            std::fs::create_dir_all(dest_dir).map_err(|e| {
                AppError::io_error(
                    format!("Failed to create destination directory: {}", e),
                    Some(dest_dir.to_path_buf()),
                )
            })?;
        }

        relocate(src, dest)?;
        info!(from = %src.display(), to = %dest.display(), "Entry moved");
        mirror_sidecar("move", src, dest)
    }

    /// Delete `entry` (recursively for directories) and its sidecar
    pub fn delete_entry(&self, entry: &Path) -> Result<()> {
        let _guard = self.locks.acquire(entry);

        let meta = std::fs::symlink_metadata(entry).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(entry.to_path_buf()),
            _ => AppError::Io(e),
        })?;

        if meta.is_dir() {
            std::fs::remove_dir_all(entry)?;
        } else {
            std::fs::remove_file(entry)?;
        }
        info!(entry = %entry.display(), "Entry deleted");

        let sidecar = sidecar_path(entry)?;
        match std::fs::remove_file(&sidecar) {
            Ok(()) => {
                debug!(sidecar = %sidecar.display(), "Sidecar deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(sidecar = %sidecar.display(), error = %e, "Failed to delete sidecar");
                Err(AppError::SidecarMirror {
                    operation: "delete",
                    path: sidecar,
                    source: e,
                })
            }
        }
    }

    #[cfg(test)]
    fn active_locks(&self) -> usize {
        self.locks.len()
    }
}

/// Provenance applies to the entry when it names no file, or names this one
fn provenance_applies(provenance: &MetadataRecord, entry: &Path) -> bool {
    if provenance.is_empty() {
        return false;
    }
    match provenance.filename() {
        None => true,
        Some(name) => entry
            .file_name()
            .is_some_and(|entry_name| entry_name.to_string_lossy() == name),
    }
}

fn load_sidecar(sidecar: &Path) -> Result<MetadataRecord> {
    let bytes = match std::fs::read(sidecar) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MetadataRecord::new()),
        Err(e) => {
            return Err(AppError::persistence(
                sidecar,
                format!("failed to read sidecar: {}", e),
            ))
        }
    };

    serde_json::from_slice(&bytes).map_err(|source| AppError::MetadataDecode {
        path: sidecar.to_path_buf(),
        source,
    })
}

/// Pretty-printed JSON, one-space indent, trailing newline
fn persist_sidecar(sidecar: &Path, record: &MetadataRecord) -> Result<()> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    record
        .serialize(&mut serializer)
        .map_err(|e| AppError::persistence(sidecar, format!("failed to encode record: {}", e)))?;
    buffer.push(b'\n');

    write_atomic(sidecar, &buffer)
        .map_err(|e| AppError::persistence(sidecar, format!("failed to write sidecar: {}", e)))
}

fn relocate(from: &Path, to: &Path) -> Result<()> {
    if std::fs::symlink_metadata(to).is_ok() {
        return Err(AppError::invalid_path(format!(
            "{} already exists",
            to.display()
        )));
    }
    std::fs::rename(from, to).map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::NotFound(from.to_path_buf()),
        _ => AppError::Io(e),
    })
}

/// Relocate the sidecar of `from` to the sidecar path of `to`
///
/// Runs after the primary entry already moved; a failure here leaves the
/// entry in place with stale metadata.
fn mirror_sidecar(operation: &'static str, from: &Path, to: &Path) -> Result<()> {
    let src = sidecar_path(from)?;
    let dst = sidecar_path(to)?;

    match std::fs::rename(&src, &dst) {
        Ok(()) => {
            debug!(operation, from = %src.display(), to = %dst.display(), "Sidecar relocated");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            // no sidecar to carry; drop a stale one left at the target name
            match std::fs::remove_file(&dst) {
                Ok(()) => {
                    warn!(sidecar = %dst.display(), "Removed stale sidecar at target");
                    Ok(())
                }
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(source) => Err(AppError::SidecarMirror {
                    operation,
                    path: dst,
                    source,
                }),
            }
        }
        Err(source) => {
            warn!(operation, sidecar = %src.display(), error = %source, "Failed to relocate sidecar");
            Err(AppError::SidecarMirror {
                operation,
                path: src,
                source,
            })
        }
    }
}
