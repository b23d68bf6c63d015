//! 暂存文件与续传会话的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::TEMP_CLEAN_INTERVAL_SECS;
use crate::upload::{UploadContext, cleanup_stale_uploads};

/// 启动后台清理任务。
pub fn spawn_background_tasks(context: Arc<UploadContext>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_CLEAN_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = cleanup_stale_uploads(&context).await {
                warn!(error = %err, "upload temp cleanup failed");
            }
        }
    });
}
