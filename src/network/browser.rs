//! 浏览器服务
//!
//! 以真实浏览器执行站点页面，剔除仅靠计算样式隐藏的诱饵节点。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{
    Page,
    browser::{Browser, BrowserConfig},
};
use futures::StreamExt;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{interval, timeout},
};
use tracing::{debug, info};
use url::Url;

use crate::core::config::AppConfig;
use crate::core::error::{Result, SpiderError};
use crate::interfaces::{RenderBackend, RenderJob, Renderer};

pub const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 内容根节点可见性探测
const VISIBLE_JS: &str = r#"
(function(root) {
    const el = document.querySelector(root);
    if (!el) {
        return false;
    }
    const style = window.getComputedStyle(el);
    return style.display !== 'none' && style.visibility !== 'hidden' && el.getClientRects().length > 0;
})(__ROOT__)
"#;

/// 删除内容根节点下 `display: none` 或零缩放变换的所有后代
const STRIP_HIDDEN_JS: &str = r#"
(function(root) {
    const container = document.querySelector(root);
    if (!container) {
        return -1;
    }
    let removed = 0;
    const elements = container.querySelectorAll('*');
    // 从后往前遍历，避免删除父节点后子节点样式失效
    for (let i = elements.length - 1; i >= 0; i--) {
        const style = window.getComputedStyle(elements[i]);
        if (style.display === 'none' || style.transform === 'matrix(0, 0, 0, 0, 0, 0)') {
            elements[i].remove();
            removed++;
        }
    }
    return removed;
})(__ROOT__)
"#;

/// 屏蔽客户端跳转，使会话停留在已加载的文档上
pub fn neutralize_redirects(html: &str) -> String {
    html.replace("window.location.replace", "console.log")
}

/// 浏览器会话
/// 采用显式的所有权管理，确保关闭逻辑的确定性
pub struct BrowserSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
}

impl BrowserSession {
    /// 启动浏览器会话
    pub async fn launch(config: &AppConfig) -> Result<Self> {
        let browser_config = build_browser_config(config)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SpiderError::Browser(e.to_string()))?;

        // 启动事件循环
        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler: Some(handle),
        })
    }

    /// 创建新页面
    pub async fn new_page(&self) -> Result<Page> {
        let browser = self
            .browser
            .as_ref()
            .ok_or_else(|| SpiderError::Browser("Browser already closed".into()))?;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| SpiderError::Browser(e.to_string()))
    }

    /// 优雅关闭浏览器，并等待事件循环结束
    pub async fn close(&mut self) -> Result<()> {
        let browser = self.browser.take();
        let handler = self.handler.take();

        if let Some(mut b) = browser {
            let _ = b.close().await;
            if let Some(h) = handler {
                let _ = h.await;
            }
        }
        Ok(())
    }
}

/// 构建浏览器配置
fn build_browser_config(config: &AppConfig) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", DEFAULT_UA))
        .arg("--disable-infobars")
        .arg("--no-sandbox")
        .arg("--window-size=1920,1080")
        .arg("--disable-extensions");

    if config.browser.headless {
        builder = builder.arg("--headless=new");
    } else {
        builder = builder.with_head();
    }

    let chrome_path = if let Some(path) = &config.browser.chrome_path {
        Some(path.clone())
    } else {
        [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
            r"C:\Program Files\Microsoft\Edge\Application\msedge.exe",
        ]
        .iter()
        .find(|p| Path::new(p).exists())
        .map(|p| p.to_string())
    };

    if let Some(path) = chrome_path {
        builder = builder.chrome_executable(path);
    }

    builder.build().map_err(SpiderError::Browser)
}

// 在 Drop 时尝试最后一次保护
impl Drop for BrowserSession {
    fn drop(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            // 在后台清理
            if let Ok(rt) = tokio::runtime::Handle::try_current() {
                rt.spawn(async move {
                    let _ = browser.close().await;
                    if let Some(h) = handler {
                        let _ = h.await;
                    }
                });
            }
        }
    }
}

// =============================================================================
// RenderSession
// =============================================================================

/// 绑定到一个浏览器标签页的渲染会话
pub struct RenderSession {
    page: Page,
    wait: Duration,
    scratch_dir: PathBuf,
}

impl RenderSession {
    pub fn new(page: Page, wait: Duration, scratch_dir: PathBuf) -> Self {
        Self {
            page,
            wait,
            scratch_dir,
        }
    }

    /// 导航到本地文档，受渲染超时约束
    async fn navigate(&self, url: &str, root: &str) -> Result<()> {
        timeout(self.wait, self.page.goto(url))
            .await
            .map_err(|_| SpiderError::RenderTimeout {
                selector: root.to_string(),
                timeout: self.wait,
            })??;
        Ok(())
    }

    /// 等待内容根节点可见
    async fn wait_visible(&self, root: &str, root_literal: &str) -> Result<()> {
        let check = VISIBLE_JS.replace("__ROOT__", root_literal);

        timeout(self.wait, async {
            let mut ticker = interval(Duration::from_millis(100));
            loop {
                ticker.tick().await;

                // 导航过程中的脚本执行失败视为尚未就绪
                let visible = match self.page.evaluate(check.as_str()).await {
                    Ok(v) => v.into_value::<bool>().unwrap_or(false),
                    Err(_) => false,
                };
                if visible {
                    return;
                }
            }
        })
        .await
        .map_err(|_| SpiderError::RenderTimeout {
            selector: root.to_string(),
            timeout: self.wait,
        })
    }

    async fn strip_hidden(&self, root: &str, root_literal: &str) -> Result<()> {
        let script = STRIP_HIDDEN_JS.replace("__ROOT__", root_literal);
        let removed: i64 = self
            .page
            .evaluate(script.as_str())
            .await?
            .into_value()
            .map_err(|e| SpiderError::Render(e.to_string()))?;

        if removed < 0 {
            return Err(SpiderError::Render(format!("content root `{}` vanished", root)));
        }
        debug!("已移除 {} 个隐藏节点", removed);
        Ok(())
    }
}

#[async_trait]
impl Renderer for RenderSession {
    async fn render(&self, job: RenderJob<'_>) -> Result<String> {
        let html = neutralize_redirects(job.html);

        tokio::fs::create_dir_all(&self.scratch_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix("temp-")
            .suffix(".html")
            .tempfile_in(&self.scratch_dir)?;
        tokio::fs::write(scratch.path(), html.as_bytes()).await?;

        let file_url = Url::from_file_path(scratch.path()).map_err(|_| {
            SpiderError::Render(format!("invalid scratch path: {}", scratch.path().display()))
        })?;

        self.navigate(file_url.as_str(), job.root).await?;

        let root_literal = serde_json::to_string(job.root)?;
        self.wait_visible(job.root, &root_literal).await?;
        self.strip_hidden(job.root, &root_literal).await?;

        let rendered = self.page.content().await?;
        Ok(rendered)
    }

    async fn close(&self) -> Result<()> {
        self.page.clone().close().await?;
        Ok(())
    }
}

// =============================================================================
// BrowserService
// =============================================================================

/// 共享浏览器进程，首次打开会话时惰性启动
pub struct BrowserService {
    config: Arc<AppConfig>,
    session: Mutex<Option<BrowserSession>>,
    scratch_dir: PathBuf,
}

impl BrowserService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            session: Mutex::new(None),
            scratch_dir: std::env::temp_dir().join("bilinovel-spider"),
        }
    }
}

#[async_trait]
impl RenderBackend for BrowserService {
    async fn open(&self) -> Result<Arc<dyn Renderer>> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(BrowserSession::launch(&self.config).await?);
            info!("浏览器已启动");
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| SpiderError::Browser("Browser already closed".into()))?;

        let page = session.new_page().await?;
        Ok(Arc::new(RenderSession::new(
            page,
            Duration::from_secs(self.config.browser.render_timeout_secs),
            self.scratch_dir.clone(),
        )))
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(mut session) = self.session.lock().await.take() {
            session.close().await?;
            info!("浏览器已关闭");
        }
        Ok(())
    }
}
