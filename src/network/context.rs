//! 服务上下文 (ServiceContext)
//!
//! 统一管理所有副作用依赖：HTTP 服务、渲染后端、配置与事件通道。

use std::sync::Arc;

use crate::core::config::AppConfig;
use crate::core::event::EventSender;
use crate::interfaces::RenderBackend;
use crate::network::client::SiteClient;
use crate::network::service::HttpService;

/// 服务上下文
#[derive(Clone)]
pub struct ServiceContext {
    /// HTTP 服务
    pub http: Arc<HttpService>,
    /// 渲染会话工厂 (浏览器或回退实现)
    pub renderer: Arc<dyn RenderBackend>,
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 事件发送器（可选）
    pub events: Option<EventSender>,
}

impl ServiceContext {
    /// 创建新的服务上下文
    pub fn new(
        http: Arc<HttpService>,
        renderer: Arc<dyn RenderBackend>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            http,
            renderer,
            config,
            events: None,
        }
    }

    /// 设置事件发送器
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    /// 派生站点客户端
    pub fn client(&self) -> SiteClient {
        SiteClient::new(self.http.clone())
    }
}
