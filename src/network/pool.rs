//! 渲染会话池 (SessionPool)
//!
//! 每个进行中的卷独占一个渲染会话，由该卷的任务负责申请与释放。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::interfaces::{RenderBackend, Renderer};

/// 会话键：(小说 ID, 卷 ID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub novel_id: u64,
    pub volume_id: u64,
}

impl SessionKey {
    pub fn new(novel_id: u64, volume_id: u64) -> Self {
        Self {
            novel_id,
            volume_id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.novel_id, self.volume_id)
    }
}

pub struct SessionPool {
    backend: Arc<dyn RenderBackend>,
    sessions: Mutex<HashMap<SessionKey, Arc<dyn Renderer>>>,
}

impl SessionPool {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 取得键对应的会话，不存在时新开一个
    pub async fn acquire(&self, key: SessionKey) -> Result<Arc<dyn Renderer>> {
        if let Some(existing) = self.sessions.lock().get(&key) {
            return Ok(existing.clone());
        }

        // 打开标签页期间不持锁
        let opened = self.backend.open().await?;

        // 锁仅在块内持有，不跨越 await
        let raced = {
            let mut sessions = self.sessions.lock();
            match sessions.get(&key) {
                Some(raced) => Some(raced.clone()),
                None => {
                    sessions.insert(key, opened.clone());
                    None
                }
            }
        };

        match raced {
            Some(raced) => {
                if let Err(e) = opened.close().await {
                    warn!("关闭多余会话失败 {}: {}", key, e);
                }
                Ok(raced)
            }
            None => {
                debug!("会话已创建: {}", key);
                Ok(opened)
            }
        }
    }

    /// 移除并关闭会话；键不存在时无操作
    pub async fn release(&self, key: SessionKey) -> Result<()> {
        let session = self.sessions.lock().remove(&key);
        if let Some(session) = session {
            session.close().await?;
            debug!("会话已关闭: {}", key);
        }
        Ok(())
    }

    /// 关闭所有会话及后端共享资源
    pub async fn close_all(&self) -> Result<()> {
        if !self.is_empty() {
            warn!("仍有 {} 个会话未释放，强制关闭", self.len());
        }
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        for (key, session) in drained {
            if let Err(e) = session.close().await {
                warn!("关闭会话失败 {}: {}", key, e);
            }
        }
        self.backend.shutdown().await
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
