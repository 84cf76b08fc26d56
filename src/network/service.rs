use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::HeaderMap;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::core::config::AppConfig;
use crate::core::error::{Result, SpiderError};
use crate::network::middleware::{SessionMiddleware, TraceMiddleware};
use crate::network::session::Session;

/// HTTP 服务：带连接池的客户端 + 中间件链
#[derive(Clone)]
pub struct HttpService {
    client: ClientWithMiddleware,
    session: Arc<Session>,
}

impl HttpService {
    pub fn new(config: &AppConfig, session: Arc<Session>) -> Result<Self> {
        let client = Self::build_internal_client(config)?;
        Ok(Self { client, session })
    }

    /// 构建底层的 HTTP 客户端
    fn build_internal_client(config: &AppConfig) -> Result<ClientWithMiddleware> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.spider.pool_max_idle_per_host)
            .tcp_nodelay(true) // 禁用 Nagle 算法，降低小包延迟
            .gzip(true)
            .brotli(true)
            .connect_timeout(Duration::from_secs(config.spider.connect_timeout_secs))
            .timeout(Duration::from_secs(config.spider.timeout_secs))
            .build()
            .map_err(SpiderError::Network)?;

        Ok(ClientBuilder::new(client)
            .with(SessionMiddleware)
            .with(TraceMiddleware)
            .build())
    }

    /// 发起请求；非 2xx 状态统一转换为 `SpiderError::Fetch`
    pub async fn execute(
        &self,
        method: Method,
        url: &str,
        headers: &HeaderMap,
    ) -> Result<reqwest::Response> {
        let resp = self
            .client
            .request(method, url)
            .headers(headers.clone())
            .with_extension(self.session.clone())
            .send()
            .await
            .map_err(SpiderError::Middleware)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SpiderError::Fetch {
                url: url.to_string(),
                status,
            });
        }
        Ok(resp)
    }

    pub async fn get(&self, url: &str, headers: &HeaderMap) -> Result<reqwest::Response> {
        self.execute(Method::GET, url, headers).await
    }
}
