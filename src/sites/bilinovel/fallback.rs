//! 无浏览器回退渲染
//!
//! 不执行页面脚本，直接在原始 HTML 上复现段落重排。
//! 依赖计算样式的诱饵节点无法识别，会保留在结果中。

use std::sync::Arc;

use async_trait::async_trait;
use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use scraper::{Html, Selector};

use super::SiteSelectors;
use super::unscramble::unscramble;
use crate::core::error::{Result, SpiderError};
use crate::interfaces::{RenderBackend, RenderJob, Renderer};
use crate::network::browser::neutralize_redirects;

/// 重排计划：根节点下每个段落是否为非空槽位，以及还原顺序后的非空段落
struct Reorder {
    slots: Vec<bool>,
    ordered: Vec<String>,
}

/// 收集内容根节点下的段落并还原非空段落的顺序
fn plan_reorder(html: &str, root: &str, chapter_id: u64) -> Result<Reorder> {
    let root_selector =
        Selector::parse(root).map_err(|e| SpiderError::Render(format!("{}: {}", root, e)))?;
    let doc = Html::parse_document(html);
    let container = doc
        .select(&root_selector)
        .next()
        .ok_or_else(|| SpiderError::Render(format!("content root `{}` not found", root)))?;

    let mut slots = Vec::new();
    let mut scrambled = Vec::new();
    for p in container.select(&SiteSelectors::get().paragraph) {
        let filled = !p.text().collect::<String>().trim().is_empty();
        if filled {
            scrambled.push(p.html());
        }
        slots.push(filled);
    }

    Ok(Reorder {
        slots,
        ordered: unscramble(scrambled, chapter_id),
    })
}

pub struct StaticRenderer;

#[async_trait]
impl Renderer for StaticRenderer {
    /// 仅把非空段落按还原后的顺序写回原槽位，图片与其他节点原样保留
    async fn render(&self, job: RenderJob<'_>) -> Result<String> {
        let html = neutralize_redirects(job.html);
        let Reorder { slots, ordered } = plan_reorder(&html, job.root, job.chapter_id)?;

        let paragraphs = format!("{} p", job.root);
        let mut seen = 0usize;
        let mut next = ordered.into_iter();

        let output = rewrite_str(
            &html,
            RewriteStrSettings {
                element_content_handlers: vec![element!(paragraphs, |el| {
                    let filled = slots.get(seen).copied().unwrap_or(false);
                    seen += 1;
                    if filled {
                        if let Some(paragraph) = next.next() {
                            el.replace(&paragraph, ContentType::Html);
                        }
                    }
                    Ok(())
                })],
                ..RewriteStrSettings::new()
            },
        )?;
        Ok(output)
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// 回退渲染后端，所有会话共享同一个无状态渲染器
pub struct StaticBackend {
    renderer: Arc<StaticRenderer>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self {
            renderer: Arc::new(StaticRenderer),
        }
    }
}

impl Default for StaticBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RenderBackend for StaticBackend {
    async fn open(&self) -> Result<Arc<dyn Renderer>> {
        Ok(self.renderer.clone())
    }
}
