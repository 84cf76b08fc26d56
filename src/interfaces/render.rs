//! 渲染层抽象 (Rendering Session)
//!
//! 一个 `Renderer` 对应一个浏览器标签页 (或无浏览器的回退实现)，
//! 在同一卷的所有章节分页之间复用。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::Result;

/// 单次渲染请求
#[derive(Debug, Clone, Copy)]
pub struct RenderJob<'a> {
    /// 服务端返回的原始 HTML
    pub html: &'a str,
    /// 内容根节点的 CSS 选择器
    pub root: &'a str,
    /// 章节 ID (回退路径用于段落重排)
    pub chapter_id: u64,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// 执行页面并返回清理隐藏节点后的 HTML
    async fn render(&self, job: RenderJob<'_>) -> Result<String>;

    /// 释放底层资源 (关闭标签页)
    async fn close(&self) -> Result<()>;
}

/// 渲染会话工厂
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn Renderer>>;

    /// 关闭工厂持有的共享资源 (浏览器进程)
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
