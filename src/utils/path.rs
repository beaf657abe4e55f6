//! 路径处理工具函数
//!
//! 把调用方提供的逻辑路径（相对于存储根目录、以 `/` 分隔）映射为受限的绝对路径，
//! 并拒绝任何逃逸出根目录的输入。

use crate::error::{AppError, Result};
use std::path::{Component, Path, PathBuf};

/// 规范化路径
///
/// 在 Windows 上使用 dunce 去除 UNC 前缀，在 Unix-like 系统上使用标准规范化。
pub fn canonicalize_path(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| {
        AppError::io_error(
            format!("Path canonicalization failed: {}", e),
            Some(path.to_path_buf()),
        )
    })
}

/// 逻辑路径解析器
///
/// 构造时规范化一次根目录，之后的 `resolve` 是纯函数：只做词法清理，不访问文件系统。
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    /// 以已存在的根目录创建解析器
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = canonicalize_path(root.as_ref())?;
        if !root.is_dir() {
            return Err(AppError::invalid_path(format!(
                "storage root is not a directory: {}",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 解析逻辑路径为根目录下的绝对路径
    ///
    /// `.` 被忽略，`..` 弹出上一级；弹出超过根目录即为 `InvalidPath`。
    /// 开头的 `/` 表示根目录本身，不是文件系统根。
    ///
    /// # 示例
    ///
    /// ```
    /// # let dir = tempfile::tempdir().unwrap();
    /// use file_station::utils::PathResolver;
    ///
    /// let resolver = PathResolver::new(dir.path()).unwrap();
    /// let resolved = resolver.resolve("/docs/./a.txt").unwrap();
    /// assert!(resolved.ends_with("docs/a.txt"));
    /// assert!(resolver.resolve("docs/../../etc/passwd").is_err());
    /// ```
    pub fn resolve(&self, logical: &str) -> Result<PathBuf> {
        let segments = clean_segments(logical)?;
        let mut resolved = self.root.clone();
        resolved.extend(&segments);

        if !resolved.starts_with(&self.root) {
            return Err(AppError::invalid_path(format!(
                "{} resolves outside the storage root",
                logical
            )));
        }
        Ok(resolved)
    }

    /// 清理后的根相对路径，不带开头的分隔符（根目录本身为空串）
    pub fn relative(&self, logical: &str) -> Result<String> {
        Ok(clean_segments(logical)?.join("/"))
    }

    /// 把根目录下的绝对路径还原为逻辑路径（用于日志和响应）
    pub fn to_logical(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", parts.join("/")))
    }
}

fn clean_segments(logical: &str) -> Result<Vec<String>> {
    if logical.contains('\0') {
        return Err(AppError::invalid_path("path contains a NUL byte"));
    }

    let mut segments: Vec<String> = Vec::new();
    for component in Path::new(logical).components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(AppError::invalid_path(format!(
                        "{} escapes the storage root",
                        logical
                    )));
                }
            }
            Component::Normal(part) => {
                segments.push(part.to_string_lossy().into_owned());
            }
            Component::Prefix(_) => {
                return Err(AppError::invalid_path(format!(
                    "{} carries a drive or UNC prefix",
                    logical
                )));
            }
        }
    }
    Ok(segments)
}

/// 校验单个新建路径组件（上传文件名、新文件夹名、重命名目标）
pub fn validate_entry_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::invalid_path("entry name is empty"));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(AppError::invalid_path(format!("{} is not a valid entry name", name)));
    }
    if trimmed.contains(&['/', '\\', '\0'][..]) {
        return Err(AppError::invalid_path(format!(
            "{} must be a single path component",
            name
        )));
    }
    Ok(trimmed)
}
