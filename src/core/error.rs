//! 错误处理体系 (Error Handling System)
//!
//! 定义采集管线的错误分类及全局 Result 别名。
//!
//! 传播策略：页面/章节级错误向上冒泡至所属卷任务并终止该卷；
//! 卷任务在边界处记录日志后被丢弃，整本书的采集仍返回其余成功的部分。

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// 全局错误定义 (Spider Domain Errors)
#[derive(Error, Debug)]
pub enum SpiderError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// 非 2xx 响应
    #[error("Fetch failed: {url} -> HTTP {status}")]
    Fetch { url: String, status: StatusCode },

    /// 内容根节点未在限定时间内可见
    #[error("Render timeout: `{selector}` not visible after {timeout:?}")]
    RenderTimeout { selector: String, timeout: Duration },

    /// 导航、脚本执行或序列化失败
    #[error("Render error: {0}")]
    Render(String),

    #[error("Browser error: {0}")]
    Browser(String),

    /// 期望的结构锚点缺失
    #[error("Parsing error: {0}")]
    Parse(String),

    /// 从标记中提取的数字 ID 无法转换
    #[error("Conversion error: {0}")]
    Conversion(#[from] std::num::ParseIntError),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Packaging error: {0}")]
    Package(String),

    #[error("Other error: {0}")]
    Custom(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, SpiderError>;

impl From<chromiumoxide::error::CdpError> for SpiderError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        SpiderError::Render(e.to_string())
    }
}

impl From<lol_html::errors::RewritingError> for SpiderError {
    fn from(e: lol_html::errors::RewritingError) -> Self {
        SpiderError::Rewrite(e.to_string())
    }
}

impl SpiderError {
    /// 若为 HTTP 状态失败则返回状态码
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            SpiderError::Fetch { status, .. } => Some(*status),
            SpiderError::Network(e) => e.status(),
            _ => None,
        }
    }
}
