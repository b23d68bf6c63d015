//! 上传配置、处理上下文与暂存目录管理。

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{info, warn};

use crate::config::{DEFAULT_TEMP_TTL_SECS, UPLOAD_TEMP_DIR};
use crate::locking::LockManager;
use crate::sessions::SessionRegistry;
use crate::storage::Storage;

#[derive(Debug)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub temp_dir: PathBuf,
    pub temp_ttl: Duration,
}

impl UploadConfig {
    /// 声明大小是否超过上限（上限为 0 时不限制）。
    pub fn exceeds_limit(&self, size: u64) -> bool {
        self.max_file_size > 0 && size > self.max_file_size
    }

    /// 续传会话的空闲上限；暂存过期关闭时仍按默认值回收会话。
    pub fn session_ttl(&self) -> Duration {
        if self.temp_ttl.is_zero() {
            Duration::from_secs(DEFAULT_TEMP_TTL_SECS)
        } else {
            self.temp_ttl
        }
    }
}

/// 每个上传处理器共享的显式上下文。
#[derive(Debug)]
pub struct UploadContext {
    pub storage: Storage,
    pub config: UploadConfig,
    pub sessions: SessionRegistry,
    pub locks: LockManager,
}

impl UploadContext {
    pub fn new(storage: Storage, config: UploadConfig) -> Self {
        Self {
            storage,
            config,
            sessions: SessionRegistry::new(),
            locks: LockManager::new(),
        }
    }

    /// 创建目标目录与暂存目录。
    pub async fn prepare_dirs(&self) -> std::io::Result<()> {
        self.storage.ensure_root().await?;
        fs::create_dir_all(&self.config.temp_dir).await
    }
}

/// 返回暂存目录：与目标目录同级，不会出现在上传目录的文件列表中。
pub fn upload_temp_root(storage_root: &Path) -> PathBuf {
    let temp_path = Path::new(UPLOAD_TEMP_DIR);
    if temp_path.is_absolute() {
        return temp_path.to_path_buf();
    }

    let Some(parent) = storage_root.parent() else {
        return PathBuf::from(UPLOAD_TEMP_DIR);
    };

    if temp_path.iter().next() == Some(OsStr::new(".axo"))
        && parent.file_name() == Some(OsStr::new(".axo"))
    {
        let rest: PathBuf = temp_path.iter().skip(1).collect();
        return if rest.as_os_str().is_empty() {
            parent.to_path_buf()
        } else {
            parent.join(rest)
        };
    }

    parent.join(temp_path)
}

/// 清理过期的暂存文件与空闲的续传会话。
pub async fn cleanup_stale_uploads(context: &UploadContext) -> Result<(), std::io::Error> {
    let pruned = context
        .sessions
        .prune_idle(context.config.session_ttl())
        .await;
    if pruned > 0 {
        info!(pruned, "pruned idle resumable sessions");
    }

    let ttl = context.config.temp_ttl;
    if ttl.is_zero() {
        return Ok(());
    }

    let temp_root = &context.config.temp_dir;
    if fs::metadata(temp_root).await.is_err() {
        return Ok(());
    }

    let now = SystemTime::now();
    let mut dir = fs::read_dir(temp_root).await?;
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age >= ttl {
            let path = entry.path();
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %err, "failed to remove stale staging file");
            } else {
                info!(path = ?path, "removed stale staging file");
            }
        }
    }

    Ok(())
}
