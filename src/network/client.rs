use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use crate::core::error::{Result, SpiderError};
use crate::interfaces::Fetch;
use crate::network::service::HttpService;

/// 面向站点的 HTTP 客户端封装
#[derive(Clone)]
pub struct SiteClient {
    http: Arc<HttpService>,
}

impl SiteClient {
    pub fn new(http: Arc<HttpService>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Fetch for SiteClient {
    /// 获取文本内容
    async fn get_text(&self, url: &str, headers: &HeaderMap) -> Result<String> {
        let resp = self.http.get(url, headers).await?;
        resp.text().await.map_err(SpiderError::Network)
    }

    /// 获取二进制内容
    async fn get_bytes(&self, url: &str, headers: &HeaderMap) -> Result<Vec<u8>> {
        let resp = self.http.get(url, headers).await?;
        let bytes = resp.bytes().await.map_err(SpiderError::Network)?;
        Ok(bytes.to_vec())
    }
}
