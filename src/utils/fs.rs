//! 文件写入工具
//!
//! 先写入同目录下的临时文件，再原子替换目标文件：写入失败时旧内容保持不变。

use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// 原子替换 `path` 的全部内容
pub fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut temp = staging_file(path)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// 在 `target` 所在目录创建用于替换它的临时文件
///
/// 目标是已存在的普通文件时沿用其权限；否则按 0o666 创建，由进程 umask 裁剪，
/// 与直接创建文件得到的权限一致。
pub fn staging_file(target: &Path) -> io::Result<NamedTempFile> {
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let existing = std::fs::metadata(target)
        .ok()
        .filter(|meta| meta.is_file())
        .map(|meta| meta.permissions());

    let temp = new_temp_in(dir)?;
    if let Some(permissions) = existing {
        std::fs::set_permissions(temp.path(), permissions)?;
    }
    Ok(temp)
}

#[cfg(unix)]
fn new_temp_in(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    tempfile::Builder::new()
        .permissions(std::fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn new_temp_in(dir: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}
