//! 站点定义
//!
//! 下载器能力集合：获取小说/卷/章节、提供打包用样式与附加资源、释放资源。

use std::collections::HashSet;

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{Chapter, ExtraFile, Novel, Volume};

/// 站点定义 Trait
///
/// 每个站点需要实现此 Trait，目前仅有 bilinovel 一个实现。
#[async_trait]
pub trait Site: Send + Sync {
    /// 站点唯一标识
    fn id(&self) -> &str;

    /// 按目录顺序列出卷 ID
    async fn discover_volumes(&self, novel_id: u64) -> Result<Vec<u64>>;

    /// 获取整本小说，跳过 `skip_volumes` 中的卷；单卷失败不影响整体
    async fn fetch_novel(
        &self,
        novel_id: u64,
        skip_content: bool,
        skip_volumes: &HashSet<u64>,
    ) -> Result<Novel>;

    /// 获取单卷 (含全部章节内容，除非 `skip_content`)
    async fn fetch_volume(&self, novel_id: u64, volume_id: u64, skip_content: bool)
    -> Result<Volume>;

    /// 获取单个章节的全部分页
    async fn fetch_chapter(&self, novel_id: u64, volume_id: u64, chapter_id: u64)
    -> Result<Chapter>;

    /// 打包用样式表
    fn style_css(&self) -> &str;

    /// 打包用附加资源
    fn extra_files(&self) -> Vec<ExtraFile>;

    /// 释放浏览器等资源
    async fn close(&self) -> Result<()>;
}
