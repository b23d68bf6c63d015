use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::ErrorKind;

/// 上传目标目录：所有写入都解析到该目录下的单层文件名。
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// 目录不存在时递归创建（unix 下权限 0777，受 umask 约束）。
    pub async fn ensure_root(&self) -> io::Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        builder.mode(0o777);
        builder.create(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// 名称是否已被占用；悬空的符号链接同样视为占用。
    pub async fn exists(&self, name: &str) -> bool {
        fs::symlink_metadata(self.root.join(name)).await.is_ok()
    }

    /// 将单层文件名解析为根目录下的绝对路径。
    pub async fn resolve_file(&self, name: &str) -> Result<PathBuf, StorageError> {
        let target = self.resolve(name)?;
        match fs::symlink_metadata(&target).await {
            Ok(metadata) if metadata.file_type().is_symlink() || metadata.is_dir() => {
                Err(StorageError::InvalidPath)
            }
            Ok(_) => Ok(target),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(target),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(segment)), None) => Ok(self.root.join(segment)),
            _ => Err(StorageError::InvalidPath),
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] io::Error),
}
