//! 文件端点。
//!
//! 端点在构造时对路径做一次分类，之后的泵送循环只依据分类结果决定读取方式；
//! 分类之后路径发生的变化（例如文件被删除）表现为打开或读取阶段的 IO 错误。

use core::fmt;
use std::path::{Path, PathBuf};

/// 路径类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathType {
    /// 路径不存在。
    NotExist,
    /// 单个文件。
    File,
    /// 目录。
    Directory,
}

impl PathType {
    fn classify(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(metadata) if metadata.is_dir() => PathType::Directory,
            Ok(_) => PathType::File,
            Err(_) => PathType::NotExist,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PathType::NotExist => "not_exist",
            PathType::File => "file",
            PathType::Directory => "directory",
        }
    }
}

/// 由名称与路径组成的文件端点。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FileEndPoint {
    name: String,
    path: PathBuf,
    path_type: PathType,
}

impl FileEndPoint {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let path_type = PathType::classify(&path);
        Self {
            name: name.into(),
            path,
            path_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 构造时确定的路径类型。
    pub fn path_type(&self) -> PathType {
        self.path_type
    }

    pub fn exists(&self) -> bool {
        self.path_type != PathType::NotExist
    }
}

impl fmt::Display for FileEndPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.path.display())
    }
}
