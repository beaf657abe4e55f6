//! File Service
//!
//! Request-level operations over logical paths. Every call resolves its
//! paths through [`PathResolver`] first, so nothing below this layer ever
//! sees a path outside the storage root.

use crate::archive::{build_archive, ArchiveOptions, ArchiveSummary};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::integrity::{reconcile, ChecksumEngine, ChecksumSet, IntegrityStatus};
use crate::provenance;
use crate::storage::{
    is_sidecar_name, MetadataRecord, MetadataStore, RecalculationReport, UPLOADER_KEY, VERSION_KEY,
};
use crate::utils::{staging_file, validate_entry_name, PathResolver};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, instrument};

/// Uploader-supplied attributes recorded alongside the checksums
#[derive(Debug, Clone, Copy)]
pub struct UploadRequest<'a> {
    pub version: &'a str,
    pub uploader: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub path: String,
    pub size: u64,
    pub checksums: ChecksumSet,
    pub metadata: MetadataRecord,
}

/// One visible entry of a directory listing
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

pub struct FileService {
    resolver: PathResolver,
    store: MetadataStore,
    archive_options: ArchiveOptions,
}

impl FileService {
    /// Build the service from configuration, creating the root if needed
    pub fn new(config: &AppConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage.root).map_err(|e| {
            AppError::io_error(
                format!("Failed to create storage root: {}", e),
                Some(config.storage.root.clone()),
            )
        })?;
        let resolver = PathResolver::new(&config.storage.root)?;
        Ok(Self::from_parts(resolver, config.archive_options()))
    }

    pub fn from_parts(resolver: PathResolver, archive_options: ArchiveOptions) -> Self {
        info!(root = %resolver.root().display(), "File service ready");
        Self {
            resolver,
            store: MetadataStore::new(),
            archive_options,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Stream `reader` into `<dir>/<file_name>` and record its checksums
    ///
    /// The body lands in a temporary file next to the target and is renamed
    /// into place only after it was fully read, so a failed upload never
    /// leaves a truncated file behind.
    #[instrument(skip(self, reader, request), fields(uploader = request.uploader))]
    pub fn upload<R: Read>(
        &self,
        dir: &str,
        file_name: &str,
        reader: R,
        request: UploadRequest<'_>,
    ) -> Result<UploadOutcome> {
        let name = checked_entry_name(file_name)?;
        let dir_abs = self.existing_directory(dir)?;
        let target = dir_abs.join(name);

        let mut staging = staging_file(&target)?;
        let (checksums, size) = ChecksumEngine::copy_and_compute(reader, staging.as_file_mut())?;
        staging.as_file().sync_all()?;
        staging.persist(&target).map_err(|e| AppError::Io(e.error))?;

        let mut fields = checksums.to_record();
        if !request.version.trim().is_empty() {
            fields.insert(VERSION_KEY, request.version.trim());
        }
        fields.insert(UPLOADER_KEY, request.uploader);
        let metadata = self
            .store
            .add_metadata(&target, fields)
            .map_err(|e| e.with_context(format!("recording upload of {}", name)))?;

        let path = self.logical(&target);
        info!(path = %path, size, "File uploaded");
        Ok(UploadOutcome {
            path,
            size,
            checksums,
            metadata,
        })
    }

    /// Create `<parent>/<name>`; returns its logical path
    pub fn create_folder(&self, parent: &str, name: &str) -> Result<String> {
        let name = checked_entry_name(name)?;
        let parent_abs = self.existing_directory(parent)?;
        let target = parent_abs.join(name);

        std::fs::create_dir(&target).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => {
                AppError::invalid_path(format!("{} already exists", self.logical(&target)))
            }
            _ => AppError::Io(e),
        })?;

        let path = self.logical(&target);
        info!(path = %path, "Folder created");
        Ok(path)
    }

    /// Rename an entry in place; returns the new logical path
    pub fn rename(&self, path: &str, new_name: &str) -> Result<String> {
        let new_name = checked_entry_name(new_name)?;
        let source = self.resolve_entry(path)?;
        let target = source.with_file_name(new_name);

        self.store.rename_entry(&source, &target)?;
        Ok(self.logical(&target))
    }

    /// Move every source into `dest_dir`, keeping its name
    ///
    /// Stops at the first failure; entries moved before it stay moved.
    pub fn move_entries<S: AsRef<str>>(&self, sources: &[S], dest_dir: &str) -> Result<Vec<String>> {
        let dest_abs = self.resolver.resolve(dest_dir)?;
        let mut moved = Vec::with_capacity(sources.len());

        for source in sources {
            let source_abs = self.resolve_entry(source.as_ref())?;
            if dest_abs.starts_with(&source_abs) {
                return Err(AppError::invalid_path(format!(
                    "cannot move {} into itself",
                    source.as_ref()
                )));
            }
            let Some(name) = source_abs.file_name() else {
                return Err(AppError::invalid_path(source.as_ref()));
            };
            let target = dest_abs.join(name);
            if target == source_abs {
                debug!(path = %source.as_ref(), "Entry already in destination");
                moved.push(self.logical(&target));
                continue;
            }

            self.store.move_entry(&source_abs, &target)?;
            moved.push(self.logical(&target));
        }
        Ok(moved)
    }

    /// Delete an entry (recursively) together with its sidecar
    pub fn delete(&self, path: &str) -> Result<()> {
        let entry = self.resolve_entry(path)?;
        self.store.delete_entry(&entry)
    }

    pub fn read_metadata(&self, path: &str) -> Result<MetadataRecord> {
        let entry = self.resolve_child(path)?;
        self.store.read_metadata(&entry)
    }

    /// Merge user-edited fields into the entry's record
    pub fn save_metadata(&self, path: &str, fields: MetadataRecord) -> Result<MetadataRecord> {
        let entry = self.resolve_child(path)?;
        self.store.add_metadata(&entry, fields)
    }

    pub fn recalculate(&self, path: &str) -> Result<RecalculationReport> {
        let entry = self.resolve_child(path)?;
        self.store.recalculate_and_store(&entry)
    }

    pub fn integrity_status(&self, path: &str) -> Result<IntegrityStatus> {
        Ok(reconcile(&self.read_metadata(path)?))
    }

    /// Stream a ZIP of the selected entries into `output`
    pub fn download_archive<W, S>(&self, output: &mut W, paths: &[S]) -> Result<ArchiveSummary>
    where
        W: Write,
        S: AsRef<str>,
    {
        if paths.is_empty() {
            return Err(AppError::invalid_path("no entries selected for download"));
        }
        build_archive(output, &self.resolver, paths, &self.archive_options)
    }

    /// Import a rendered review report into the README of its directory
    pub fn import_report(&self, report: &str) -> Result<MetadataRecord> {
        let report_abs = self.resolver.resolve(report)?;
        provenance::import_report(&report_abs)
    }

    /// Directory listing without sidecar files, folders first
    pub fn list_directory(&self, path: &str) -> Result<Vec<EntryInfo>> {
        let dir_abs = self.existing_directory(path)?;
        let mut entries = Vec::new();

        for entry in std::fs::read_dir(&dir_abs)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_sidecar_name(&name) {
                continue;
            }
            // entries removed while listing are skipped
            let Ok(meta) = entry.metadata() else {
                continue;
            };
            entries.push(EntryInfo {
                path: self.logical(&entry.path()),
                name,
                is_dir: meta.is_dir(),
                size: if meta.is_dir() { 0 } else { meta.len() },
                modified: meta.modified().ok(),
            });
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Resolve a path below the root; the root has no sidecar of its own
    fn resolve_child(&self, path: &str) -> Result<PathBuf> {
        let entry = self.resolver.resolve(path)?;
        if entry == self.resolver.root() {
            return Err(AppError::invalid_path("the storage root cannot be modified"));
        }
        Ok(entry)
    }

    /// Resolve a path that names an existing entry other than the root
    fn resolve_entry(&self, path: &str) -> Result<PathBuf> {
        let entry = self.resolve_child(path)?;
        if std::fs::symlink_metadata(&entry).is_err() {
            return Err(AppError::NotFound(entry));
        }
        Ok(entry)
    }

    fn existing_directory(&self, path: &str) -> Result<PathBuf> {
        let dir = self.resolver.resolve(path)?;
        match std::fs::metadata(&dir) {
            Ok(meta) if meta.is_dir() => Ok(dir),
            Ok(_) => Err(AppError::invalid_path(format!("{} is not a directory", path))),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(dir)),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    fn logical(&self, absolute: &Path) -> String {
        self.resolver
            .to_logical(absolute)
            .unwrap_or_else(|| absolute.display().to_string())
    }
}

/// A new entry name that is valid and does not collide with sidecar naming
fn checked_entry_name(name: &str) -> Result<&str> {
    let name = validate_entry_name(name)?;
    if is_sidecar_name(name) {
        return Err(AppError::invalid_path(format!(
            "{} is reserved for metadata sidecars",
            name
        )));
    }
    Ok(name)
}

/// Human-readable byte size, e.g. `1.5 KB`
pub fn format_readable_size(size: u64) -> String {
    const UNIT: u64 = 1024;
    const PREFIXES: &[char] = &['K', 'M', 'G', 'T', 'P', 'E'];

    if size < UNIT {
        return format!("{} B", size);
    }
    let mut div = UNIT;
    let mut exp = 0;
    let mut n = size / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    format!("{:.1} {}B", size as f64 / div as f64, PREFIXES[exp])
}
