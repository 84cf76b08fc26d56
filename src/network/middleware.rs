use std::sync::Arc;
use std::time::Instant;

use reqwest::header::{HeaderValue, USER_AGENT};
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use tracing::debug;

use crate::network::session::Session;

/// 会话注入中间件
/// 负责在每次请求前，动态将 Session 中的最新 UA 注入 Header。
/// 调用方显式设置的 Header 优先，不会被覆盖。
pub struct SessionMiddleware;

#[async_trait::async_trait]
impl Middleware for SessionMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        if let Some(session) = extensions.get::<Arc<Session>>() {
            let headers = req.headers_mut();

            let ua = session.get_ua();
            if !ua.is_empty()
                && !headers.contains_key(USER_AGENT)
                && let Ok(val) = HeaderValue::from_str(&ua)
            {
                headers.insert(USER_AGENT, val);
            }
        }
        next.run(req, extensions).await
    }
}

/// 请求追踪中间件
pub struct TraceMiddleware;

#[async_trait::async_trait]
impl Middleware for TraceMiddleware {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let method = req.method().clone();
        let url = req.url().to_string();
        let started = Instant::now();

        let result = next.run(req, extensions).await;
        match &result {
            Ok(resp) => debug!(
                "{} {} -> {} ({:?})",
                method,
                url,
                resp.status(),
                started.elapsed()
            ),
            Err(e) => debug!("{} {} -> error: {} ({:?})", method, url, e, started.elapsed()),
        }
        result
    }
}
