//! 断点续传会话：在多次分片请求之间固定落盘文件名。

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Clone, Debug)]
pub struct ResumableSession {
    pub filename: String,
    pub total_size: u64,
    pub touched_at: Instant,
}

/// 以上传 ID（或原始文件名）为键的会话表。
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, ResumableSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 查找会话并刷新其活跃时间。
    pub async fn lookup(&self, key: &str) -> Option<ResumableSession> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions.get_mut(key)?;
        session.touched_at = Instant::now();
        Some(session.clone())
    }

    pub async fn pin(&self, key: &str, filename: &str, total_size: u64) {
        let mut sessions = self.sessions.lock().await;
        sessions.insert(
            key.to_string(),
            ResumableSession {
                filename: filename.to_string(),
                total_size,
                touched_at: Instant::now(),
            },
        );
    }

    pub async fn finish(&self, key: &str) {
        self.sessions.lock().await.remove(key);
    }

    /// 移除超过 `ttl` 未活跃的会话，返回移除数量。
    pub async fn prune_idle(&self, ttl: Duration) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        let now = Instant::now();
        sessions.retain(|_, session| now.duration_since(session.touched_at) < ttl);
        before - sessions.len()
    }
}
