//! 传输层抽象
//!
//! 采集器只依赖此 Trait，生产环境由 `SiteClient` 实现，测试中替换为内存实现。

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::core::error::Result;

#[async_trait]
pub trait Fetch: Send + Sync {
    /// GET 文本，非 2xx 返回 `SpiderError::Fetch`
    async fn get_text(&self, url: &str, headers: &HeaderMap) -> Result<String>;

    /// GET 二进制 (图片等)
    async fn get_bytes(&self, url: &str, headers: &HeaderMap) -> Result<Vec<u8>>;
}
