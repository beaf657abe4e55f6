//! 通用工具函数模块
//!
//! 提供逻辑路径解析、条目名称校验和原子文件写入。

pub mod fs;
pub mod path;

pub use fs::*;
pub use path::*;
