/**
 * 归档下载模块
 *
 * 将选中的文件和目录打包为单个 ZIP 流供下载
 */
pub mod builder;

pub use builder::{build_archive, ArchiveBuilder, ArchiveOptions, ArchiveSummary};

/// 归档响应的 MIME 类型
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// 归档附件的默认文件名
pub const ARCHIVE_FILE_NAME: &str = "files.zip";
