use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/**
 * 应用错误类型 - 使用 miette 提供用户友好的错误诊断
 *
 * 客户端错误（路径非法、条目不存在、字段格式错误）与服务端错误
 * （哈希初始化、sidecar 读写、归档）分开，HTTP 层据此选择状态码
 */
#[derive(Error, Debug, Diagnostic)]
pub enum AppError {
    #[error("IO error: {0}")]
    #[diagnostic(code(file_station::io_error))]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    #[diagnostic(
        code(file_station::invalid_path),
        help("Paths are relative to the storage root and must not escape it")
    )]
    InvalidPath(String),

    #[error("Not found: {}", .0.display())]
    #[diagnostic(code(file_station::not_found))]
    NotFound(PathBuf),

    #[error("Failed to initialize {algorithm} hash state")]
    #[diagnostic(code(file_station::integrity_engine_init))]
    IntegrityEngineInit { algorithm: &'static str },

    #[error("Malformed metadata sidecar {}: {source}", path.display())]
    #[diagnostic(
        code(file_station::metadata_decode),
        help("The sidecar must be a JSON object of string values; fix or remove it")
    )]
    MetadataDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to persist metadata sidecar {}: {message}", path.display())]
    #[diagnostic(code(file_station::metadata_persistence))]
    MetadataPersistence { path: PathBuf, message: String },

    #[error("Failed to mirror sidecar {} after {operation}: {source}", path.display())]
    #[diagnostic(
        code(file_station::sidecar_mirror),
        help("The entry itself was updated; its metadata sidecar is now stale")
    )]
    SidecarMirror {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to add {} to archive: {message}", path.display())]
    #[diagnostic(code(file_station::archive_entry))]
    ArchiveEntry { path: PathBuf, message: String },

    #[error("Invalid provenance field: {0}")]
    #[diagnostic(
        code(file_station::provenance_format),
        help("Provenance keys and values must fit on a single line")
    )]
    ProvenanceFormat(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(file_station::config_error))]
    Config(String),

    #[error("IO error: {message}")]
    #[diagnostic(code(file_station::io_error_detailed))]
    IoDetailed {
        message: String,
        path: Option<PathBuf>,
    },
}

impl AppError {
    /**
     * 为错误添加上下文信息
     */
    pub fn with_context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        match self {
            AppError::ArchiveEntry { path, message } => AppError::ArchiveEntry {
                path,
                message: format!("{}: {}", context, message),
            },
            AppError::MetadataPersistence { path, message } => AppError::MetadataPersistence {
                path,
                message: format!("{}: {}", context, message),
            },
            AppError::IoDetailed { message, path } => AppError::IoDetailed {
                message: format!("{}: {}", context, message),
                path,
            },
            other => other,
        }
    }

    /**
     * 创建路径非法错误
     */
    pub fn invalid_path(message: impl Into<String>) -> Self {
        AppError::InvalidPath(message.into())
    }

    /**
     * 创建 sidecar 持久化错误
     */
    pub fn persistence(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AppError::MetadataPersistence {
            path: path.into(),
            message: message.into(),
        }
    }

    /**
     * 创建归档条目错误
     */
    pub fn archive_entry(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        AppError::ArchiveEntry {
            path: path.into(),
            message: message.into(),
        }
    }

    /**
     * 创建详细的IO错误
     */
    pub fn io_error(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        AppError::IoDetailed {
            message: message.into(),
            path,
        }
    }

    /// 调用方输入导致的错误（映射为 4xx），其余均为服务端错误
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidPath(_) | AppError::NotFound(_) | AppError::ProvenanceFormat(_)
        )
    }
}

/**
 * 统一结果类型
 */
pub type Result<T> = std::result::Result<T, AppError>;
