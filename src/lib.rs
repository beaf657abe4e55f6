//! file-station - 文件元数据与完整性层
//!
//! 为受限根目录下的文件树提供：
//! - 逻辑路径解析与越界拦截 (`utils::path`)
//! - 单次读取多算法校验和 (`integrity`)
//! - README `## RDS` 溯源段落同步 (`provenance`)
//! - 与条目同生命周期的 JSON sidecar 元数据 (`storage`)
//! - 流式 ZIP 打包下载 (`archive`)
//!
//! `services::FileService` 把以上组件组合为请求级操作。

pub mod archive;
pub mod config;
pub mod error;
pub mod integrity;
pub mod logging;
pub mod provenance;
pub mod services;
pub mod storage;
pub mod utils;

pub use archive::{ArchiveBuilder, ArchiveOptions, ARCHIVE_CONTENT_TYPE, ARCHIVE_FILE_NAME};
pub use config::AppConfig;
pub use error::{AppError, Result};
pub use integrity::{ChecksumEngine, ChecksumSet, IntegrityStatus};
pub use services::FileService;
pub use storage::{MetadataRecord, MetadataStore};
pub use utils::PathResolver;
