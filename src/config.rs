//! 配置管理
//!
//! 分层加载：内置默认值 -> 可选 TOML/JSON 文件 -> `FILE_STATION__*` 环境变量。
//! 加载后统一经过 `validator` 校验。

use crate::archive::ArchiveOptions;
use crate::error::AppError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use validator::{Validate, ValidationError};

/// 环境变量前缀，例如 `FILE_STATION__STORAGE__ROOT=/srv/files`
pub const ENV_PREFIX: &str = "FILE_STATION";

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置验证失败: {0}")]
    Validation(String),

    #[error("配置文件不存在: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("配置文件格式错误: {0}")]
    FormatError(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::FormatError(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(err: validator::ValidationErrors) -> Self {
        ConfigError::Validation(err.to_string())
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// 全局配置根结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    #[serde(default)]
    #[validate(nested)]
    pub logging: LoggingConfig,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    /// 所有逻辑路径的根目录
    #[validate(custom(function = "validate_root"))]
    pub root: PathBuf,
}

/// 归档下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// 是否为空目录写入 `name/` 标记条目
    #[serde(default = "default_true")]
    pub include_directories: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    /// 默认过滤级别，`RUST_LOG` 优先
    #[validate(custom(function = "validate_level"))]
    pub level: String,

    /// 以 JSON 行格式输出
    #[serde(default)]
    pub json: bool,

    /// 按天滚动的日志目录；未设置时只输出到 stderr
    #[serde(default)]
    pub directory: Option<PathBuf>,

    #[validate(length(min = 1, max = 100))]
    pub file_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./data"),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            include_directories: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "file-station.log".to_string(),
        }
    }
}

impl From<&ArchiveConfig> for ArchiveOptions {
    fn from(config: &ArchiveConfig) -> Self {
        ArchiveOptions {
            include_directories: config.include_directories,
        }
    }
}

fn default_true() -> bool {
    true
}

fn validate_root(root: &Path) -> Result<(), ValidationError> {
    if root.as_os_str().is_empty() {
        return Err(ValidationError::new("empty_root"));
    }
    Ok(())
}

fn validate_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
        Ok(())
    } else {
        Err(ValidationError::new("unknown_log_level"))
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// `path` 指定时文件必须存在，格式由扩展名决定（`.toml` / `.json`）。
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = serde_json::to_string(&AppConfig::default())
            .map_err(|e| ConfigError::FormatError(e.to_string()))?;

        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, config::FileFormat::Json));

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        tracing::debug!(root = %config.storage.root.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn archive_options(&self) -> ArchiveOptions {
        ArchiveOptions::from(&self.archive)
    }
}
