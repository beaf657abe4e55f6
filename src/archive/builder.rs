//! ZIP 归档构建器
//!
//! 将一组逻辑路径打包为单个 Deflate 压缩的 ZIP 流。
//! 目录按文件名排序后深度优先遍历。ZIP 中央目录需要回写偏移，
//! 因此先写入匿名临时文件，完成后再整体复制到调用方的 `Write`（无需 `Seek`），
//! 归档内容不会整体驻留内存。

use crate::error::{AppError, Result};
use crate::utils::PathResolver;
use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 归档选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveOptions {
    /// 是否为空目录写入 `name/` 标记条目；非空目录由其文件隐含
    pub include_directories: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            include_directories: true,
        }
    }
}

/// 打包结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// ZIP 归档构建器
///
/// # Example
///
/// ```no_run
/// use file_station::archive::{ArchiveBuilder, ArchiveOptions};
/// use file_station::utils::PathResolver;
///
/// let resolver = PathResolver::new("/srv/files").unwrap();
/// let builder = ArchiveBuilder::new(&resolver, ArchiveOptions::default());
/// let mut out = Vec::new();
/// builder.build(&mut out, &["docs", "notes.txt"]).unwrap();
/// ```
pub struct ArchiveBuilder<'a> {
    resolver: &'a PathResolver,
    options: ArchiveOptions,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(resolver: &'a PathResolver, options: ArchiveOptions) -> Self {
        Self { resolver, options }
    }

    /// 将 `logical_paths` 打包写入 `output`
    ///
    /// 任意条目失败都会中止整个归档；失败发生在复制之前时 `output` 不会收到任何字节。
    pub fn build<W, S>(&self, output: &mut W, logical_paths: &[S]) -> Result<ArchiveSummary>
    where
        W: Write,
        S: AsRef<str>,
    {
        let root = self.resolver.root();
        let mut spool = tempfile::tempfile()
            .map_err(|e| AppError::archive_entry(root, format!("failed to create spool: {}", e)))?;

        let summary = {
            let mut session = ArchiveSession {
                zip: ZipWriter::new(&mut spool),
                include_directories: self.options.include_directories,
                seen: HashSet::new(),
                summary: ArchiveSummary::default(),
            };

            for logical in logical_paths {
                let logical = logical.as_ref();
                let absolute = self.resolver.resolve(logical)?;
                let prefix = self.resolver.relative(logical)?;
                session.add_path(&absolute, &prefix)?;
            }

            let ArchiveSession { zip, summary, .. } = session;
            zip.finish()
                .map_err(|e| AppError::archive_entry(root, e.to_string()))?;
            summary
        };

        stream_spool(&mut spool, output).map_err(|e| {
            AppError::archive_entry(root, format!("failed to stream archive: {}", e))
        })?;

        info!(
            files = summary.files,
            directories = summary.directories,
            bytes = summary.bytes,
            "Archive built"
        );
        Ok(summary)
    }
}

/// 便捷函数：使用给定选项构建归档
pub fn build_archive<W, S>(
    output: &mut W,
    resolver: &PathResolver,
    logical_paths: &[S],
    options: &ArchiveOptions,
) -> Result<ArchiveSummary>
where
    W: Write,
    S: AsRef<str>,
{
    ArchiveBuilder::new(resolver, *options).build(output, logical_paths)
}

struct ArchiveSession<Z: Write + Seek> {
    zip: ZipWriter<Z>,
    include_directories: bool,
    seen: HashSet<String>,
    summary: ArchiveSummary,
}

impl<Z: Write + Seek> ArchiveSession<Z> {
    fn add_path(&mut self, absolute: &Path, prefix: &str) -> Result<()> {
        let meta = std::fs::symlink_metadata(absolute).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => AppError::archive_entry(absolute, "entry does not exist"),
            _ => AppError::archive_entry(absolute, e.to_string()),
        })?;

        if meta.file_type().is_symlink() {
            warn!(path = %absolute.display(), "Skipping symbolic link");
            return Ok(());
        }
        if meta.is_file() {
            return self.add_file(absolute, prefix.to_string());
        }

        // 迭代式深度优先遍历，不跟随符号链接
        for entry in WalkDir::new(absolute).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(absolute).to_path_buf();
                AppError::archive_entry(path, e.to_string())
            })?;

            let relative = entry.path().strip_prefix(absolute).unwrap_or(Path::new(""));
            let name = entry_name(prefix, relative);
            let file_type = entry.file_type();

            if file_type.is_dir() {
                if self.include_directories && !name.is_empty() && is_empty_dir(entry.path())? {
                    self.add_directory(entry.path(), name)?;
                }
            } else if file_type.is_file() {
                self.add_file(entry.path(), name)?;
            } else {
                warn!(path = %entry.path().display(), "Skipping non-regular entry");
            }
        }
        Ok(())
    }

    fn add_directory(&mut self, path: &Path, name: String) -> Result<()> {
        let name = format!("{}/", name);
        if !self.seen.insert(name.clone()) {
            return Ok(());
        }
        self.zip
            .add_directory(name.as_str(), entry_options())
            .map_err(|e| AppError::archive_entry(path, e.to_string()))?;
        self.summary.directories += 1;
        debug!(entry = %name, "Archived directory");
        Ok(())
    }

    fn add_file(&mut self, path: &Path, name: String) -> Result<()> {
        if name.is_empty() || !self.seen.insert(name.clone()) {
            return Ok(());
        }

        let mut source =
            File::open(path).map_err(|e| AppError::archive_entry(path, e.to_string()))?;
        let size = source
            .metadata()
            .map_err(|e| AppError::archive_entry(path, e.to_string()))?
            .len();
        self.zip
            .start_file(name.as_str(), entry_options().large_file(needs_zip64(size)))
            .map_err(|e| AppError::archive_entry(path, e.to_string()))?;
        let written = io::copy(&mut source, &mut self.zip)
            .map_err(|e| AppError::archive_entry(path, e.to_string()))?;

        self.summary.files += 1;
        self.summary.bytes += written;
        debug!(entry = %name, bytes = written, "Archived file");
        Ok(())
    }
}

fn stream_spool<W: Write>(spool: &mut File, output: &mut W) -> io::Result<u64> {
    spool.seek(SeekFrom::Start(0))?;
    let copied = io::copy(spool, output)?;
    output.flush()?;
    Ok(copied)
}

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// 超过 32 位尺寸字段的条目必须预先声明为 zip64
fn needs_zip64(size: u64) -> bool {
    size >= u64::from(u32::MAX)
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    let mut entries =
        std::fs::read_dir(path).map_err(|e| AppError::archive_entry(path, e.to_string()))?;
    Ok(entries.next().is_none())
}

/// 条目名：根相对前缀 + 目录内相对路径，始终以 `/` 分隔
fn entry_name(prefix: &str, relative: &Path) -> String {
    let tail: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();

    match (prefix.is_empty(), tail.is_empty()) {
        (_, true) => prefix.to_string(),
        (true, false) => tail.join("/"),
        (false, false) => format!("{}/{}", prefix, tail.join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathResolver) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("docs/sub")).unwrap();
        fs::write(dir.path().join("notes.txt"), "top level").unwrap();
        fs::write(dir.path().join("docs/a.txt"), "alpha").unwrap();
        fs::write(dir.path().join("docs/sub/b.txt"), "beta").unwrap();
        let resolver = PathResolver::new(dir.path()).unwrap();
        (dir, resolver)
    }

    fn entry_names(bytes: Vec<u8>) -> Vec<String> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn test_entry_name_joining() {
        assert_eq!(entry_name("docs", Path::new("")), "docs");
        assert_eq!(entry_name("docs", Path::new("sub/b.txt")), "docs/sub/b.txt");
        assert_eq!(entry_name("", Path::new("sub/b.txt")), "sub/b.txt");
    }

    #[test]
    fn test_file_and_directory() {
        let (_dir, resolver) = setup();
        let mut out = Vec::new();

        let summary = build_archive(
            &mut out,
            &resolver,
            &["notes.txt", "/docs"],
            &ArchiveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.files, 3);
        assert_eq!(summary.directories, 0);
        assert_eq!(
            entry_names(out),
            vec!["docs/a.txt", "docs/sub/b.txt", "notes.txt"]
        );
    }

    #[test]
    fn test_empty_directory_marker() {
        let (dir, resolver) = setup();
        fs::create_dir_all(dir.path().join("docs/empty")).unwrap();
        fs::create_dir_all(dir.path().join("blank")).unwrap();
        let mut out = Vec::new();

        let summary = build_archive(
            &mut out,
            &resolver,
            &["docs", "blank"],
            &ArchiveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.directories, 2);
        assert_eq!(
            entry_names(out),
            vec!["blank/", "docs/a.txt", "docs/empty/", "docs/sub/b.txt"]
        );
    }

    #[test]
    fn test_without_directory_entries() {
        let (dir, resolver) = setup();
        fs::create_dir_all(dir.path().join("docs/empty")).unwrap();
        let mut out = Vec::new();
        let options = ArchiveOptions {
            include_directories: false,
        };

        build_archive(&mut out, &resolver, &["docs"], &options).unwrap();

        assert_eq!(entry_names(out), vec!["docs/a.txt", "docs/sub/b.txt"]);
    }

    #[test]
    fn test_zip64_threshold() {
        assert!(!needs_zip64(0));
        assert!(!needs_zip64(u64::from(u32::MAX) - 1));
        assert!(needs_zip64(u64::from(u32::MAX)));
        assert!(needs_zip64(5 * 1024 * 1024 * 1024));
    }

    #[test]
    fn test_content_is_deflated_and_intact() {
        let (dir, resolver) = setup();
        let payload = "compressible ".repeat(1000);
        fs::write(dir.path().join("big.txt"), &payload).unwrap();
        let mut out = Vec::new();

        build_archive(
            &mut out,
            &resolver,
            &["big.txt"],
            &ArchiveOptions::default(),
        )
        .unwrap();

        let mut archive = zip::ZipArchive::new(Cursor::new(out)).unwrap();
        let mut file = archive.by_name("big.txt").unwrap();
        assert_eq!(file.compression(), CompressionMethod::Deflated);
        let mut content = String::new();
        io::Read::read_to_string(&mut file, &mut content).unwrap();
        assert_eq!(content, payload);
    }

    #[test]
    fn test_overlapping_paths_archived_once() {
        let (_dir, resolver) = setup();
        let mut out = Vec::new();

        let summary = build_archive(
            &mut out,
            &resolver,
            &["docs", "docs/a.txt"],
            &ArchiveOptions::default(),
        )
        .unwrap();

        assert_eq!(summary.files, 2);
    }

    #[test]
    fn test_missing_path_aborts() {
        let (dir, resolver) = setup();
        let mut out = Vec::new();

        let result = build_archive(
            &mut out,
            &resolver,
            &["ghost.txt"],
            &ArchiveOptions::default(),
        );

        match result {
            Err(AppError::ArchiveEntry { path, .. }) => {
                assert_eq!(path, resolver.root().join("ghost.txt"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
        drop(dir);
    }

    #[test]
    fn test_escaping_path_rejected() {
        let (_dir, resolver) = setup();
        let mut out = Vec::new();

        let result = build_archive(&mut out, &resolver, &["../etc"], &ArchiveOptions::default());
        assert!(matches!(result, Err(AppError::InvalidPath(_))));
    }

    #[test]
    fn test_non_seekable_sink() {
        struct Sink(Vec<u8>);
        impl Write for Sink {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let (_dir, resolver) = setup();
        let mut sink = Sink(Vec::new());
        build_archive(&mut sink, &resolver, &["docs"], &ArchiveOptions::default()).unwrap();

        assert_eq!(entry_names(sink.0), vec!["docs/a.txt", "docs/sub/b.txt"]);
    }
}
