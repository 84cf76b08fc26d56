//! Bilinovel 站点模块
//!
//! 目录发现、卷与章节抓取，以及按卷划分的渲染会话生命周期。

mod fallback;
mod fetcher;
mod font;
mod indexer;
mod selectors;
mod unscramble;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use url::Url;

use crate::core::config::AppConfig;
use crate::core::error::{Result, SpiderError};
use crate::core::event::{EventSender, SpiderEvent};
use crate::core::model::{Chapter, ExtraFile, Novel, Volume};
use crate::engine::scheduler::VolumeScheduler;
use crate::interfaces::{Fetch, RenderBackend, Renderer, Site};
use crate::network::context::ServiceContext;
use crate::network::pool::{SessionKey, SessionPool};

use self::fetcher::{BilinovelFetcher, image_headers};
use self::font::GlyphOutlineMapper;
use self::indexer::BilinovelIndexer;

pub use self::fallback::StaticBackend;
pub use self::selectors::SiteSelectors;

const STYLE_CSS: &str = include_str!("style.css");

/// 加载混淆字体映射；未配置时返回 `None`
fn load_fonts(config: &AppConfig) -> Result<Option<Arc<GlyphOutlineMapper>>> {
    match (&config.fonts.obfuscated, &config.fonts.reference) {
        (Some(obfuscated), Some(reference)) => {
            let mapper = GlyphOutlineMapper::load(obfuscated, reference)?;
            if mapper.is_empty() {
                warn!("字形映射为空，混淆字符将被丢弃");
            }
            info!("字形映射已加载: {} 个码位", mapper.len());
            Ok(Some(Arc::new(mapper)))
        }
        _ => {
            warn!("未配置字体文件 (fonts.obfuscated / fonts.reference)，混淆字体将不会被还原");
            Ok(None)
        }
    }
}

struct BilinovelCore {
    client: Arc<dyn Fetch>,
    indexer: BilinovelIndexer,
    fetcher: BilinovelFetcher,
    sessions: SessionPool,
    scheduler: VolumeScheduler,
    base: Url,
    events: Option<EventSender>,
}

impl BilinovelCore {
    fn emit(&self, event: SpiderEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    async fn crawl_chapter(&self, renderer: &dyn Renderer, chapter: Chapter) -> Result<Chapter> {
        self.fetcher
            .fetch_chapter(self.client.as_ref(), renderer, chapter)
            .await
    }

    /// 封面获取失败不影响卷
    async fn fetch_cover(&self, url: &str) -> Option<Vec<u8>> {
        if url.is_empty() {
            return None;
        }
        match self.client.get_bytes(url, &image_headers(&self.base)).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("封面获取失败，已跳过 {}: {}", url, e);
                None
            }
        }
    }

    /// 依次抓取卷内所有章节，共享同一个渲染会话
    async fn fill_chapters(&self, volume: &mut Volume, key: SessionKey) -> Result<()> {
        let renderer = self.sessions.acquire(key).await?;
        let chapters = std::mem::take(&mut volume.chapters);
        for chapter in chapters {
            let chapter = self.crawl_chapter(renderer.as_ref(), chapter).await?;
            self.emit(SpiderEvent::ChapterCompleted {
                volume_id: volume.id,
                title: chapter.title.clone(),
            });
            volume.chapters.push(chapter);
        }
        Ok(())
    }

    async fn load_volume(
        &self,
        novel_id: u64,
        volume_id: u64,
        novel_title: &str,
        position: usize,
        skip_content: bool,
    ) -> Result<Volume> {
        info!("正在获取卷: {} (小说 ID: {})", volume_id, novel_id);

        let mut volume = self
            .indexer
            .fetch_volume_page(self.client.as_ref(), novel_id, volume_id)
            .await?;
        volume.novel_title = novel_title.to_string();
        volume.series_idx = position;
        volume.cover = self.fetch_cover(&volume.cover_url).await;

        self.emit(SpiderEvent::VolumeStarted {
            volume_id,
            title: volume.title.clone(),
            chapters: volume.chapters.len(),
        });

        if !skip_content {
            let key = SessionKey::new(novel_id, volume_id);
            let filled = self.fill_chapters(&mut volume, key).await;
            // 无论成功与否都关闭本卷的标签页
            if let Err(e) = self.sessions.release(key).await {
                warn!("关闭渲染会话失败 {}: {}", key, e);
            }
            filled?;
        }

        self.emit(SpiderEvent::VolumeCompleted {
            volume_id,
            title: volume.title.clone(),
        });
        Ok(volume)
    }
}

/// Bilinovel 站点实现
pub struct Bilinovel {
    core: Arc<BilinovelCore>,
}

impl Bilinovel {
    /// 从服务上下文创建站点实例
    pub fn new(ctx: ServiceContext) -> Result<Self> {
        let client: Arc<dyn Fetch> = Arc::new(ctx.client());
        Self::from_parts(&ctx.config, client, ctx.renderer.clone(), ctx.events.clone())
    }

    /// 以显式依赖创建站点实例
    pub fn from_parts(
        config: &AppConfig,
        client: Arc<dyn Fetch>,
        backend: Arc<dyn RenderBackend>,
        events: Option<EventSender>,
    ) -> Result<Self> {
        let base = Url::parse(&config.site.base_url).map_err(|e| {
            SpiderError::Custom(format!("Invalid base URL {}: {}", config.site.base_url, e))
        })?;
        let fonts = load_fonts(config)?;

        Ok(Self {
            core: Arc::new(BilinovelCore {
                client,
                indexer: BilinovelIndexer::new(base.clone()),
                fetcher: BilinovelFetcher::new(base.clone(), fonts, config.site.text_only),
                sessions: SessionPool::new(backend),
                scheduler: VolumeScheduler::new(config.spider.concurrency),
                base,
                events,
            }),
        })
    }
}

#[async_trait]
impl Site for Bilinovel {
    fn id(&self) -> &str {
        "bilinovel"
    }

    async fn discover_volumes(&self, novel_id: u64) -> Result<Vec<u64>> {
        let catalog = self
            .core
            .indexer
            .fetch_catalog(self.core.client.as_ref(), novel_id)
            .await?;
        Ok(catalog.volume_ids)
    }

    async fn fetch_novel(
        &self,
        novel_id: u64,
        skip_content: bool,
        skip_volumes: &HashSet<u64>,
    ) -> Result<Novel> {
        let core = &self.core;
        info!("正在获取小说: {}", novel_id);

        let mut novel = core
            .indexer
            .fetch_novel_info(core.client.as_ref(), novel_id)
            .await?;
        let catalog = core
            .indexer
            .fetch_catalog(core.client.as_ref(), novel_id)
            .await?;

        let pending = catalog
            .volume_ids
            .iter()
            .filter(|id| !skip_volumes.contains(id))
            .count();
        core.emit(SpiderEvent::VolumesDiscovered { total: pending });
        info!("共发现 {} 卷，待获取 {} 卷", catalog.volume_ids.len(), pending);

        let shared = self.core.clone();
        let novel_title = novel.title.clone();
        novel.volumes = core
            .scheduler
            .run(&catalog.volume_ids, skip_volumes, move |position, volume_id| {
                let core = shared.clone();
                let novel_title = novel_title.clone();
                async move {
                    let result = core
                        .load_volume(novel_id, volume_id, &novel_title, position, skip_content)
                        .await;
                    if let Err(e) = &result {
                        core.emit(SpiderEvent::VolumeFailed {
                            volume_id,
                            error: e.to_string(),
                        });
                    }
                    result
                }
            })
            .await;

        Ok(novel)
    }

    async fn fetch_volume(
        &self,
        novel_id: u64,
        volume_id: u64,
        skip_content: bool,
    ) -> Result<Volume> {
        let core = &self.core;
        let catalog = core
            .indexer
            .fetch_catalog(core.client.as_ref(), novel_id)
            .await?;
        let position = catalog.position(volume_id).ok_or_else(|| {
            SpiderError::Parse(format!(
                "Volume {} not found in catalog of novel {}",
                volume_id, novel_id
            ))
        })?;

        core.load_volume(
            novel_id,
            volume_id,
            &catalog.novel_title,
            position,
            skip_content,
        )
        .await
    }

    /// 单独抓取章节；会话留在池中供同卷后续调用复用，由 `close` 统一释放
    async fn fetch_chapter(
        &self,
        novel_id: u64,
        volume_id: u64,
        chapter_id: u64,
    ) -> Result<Chapter> {
        let core = &self.core;
        let chapter = Chapter {
            id: chapter_id,
            novel_id,
            volume_id,
            url: core.indexer.chapter_url(novel_id, chapter_id),
            ..Default::default()
        };
        let renderer = core
            .sessions
            .acquire(SessionKey::new(novel_id, volume_id))
            .await?;
        core.crawl_chapter(renderer.as_ref(), chapter).await
    }

    fn style_css(&self) -> &str {
        STYLE_CSS
    }

    fn extra_files(&self) -> Vec<ExtraFile> {
        Vec::new()
    }

    async fn close(&self) -> Result<()> {
        self.core.sessions.close_all().await
    }
}
