//! 下载引擎
//!
//! 负责协调任务的生命周期：发现 -> 缓存过滤 -> 采集 -> 缓存 -> 打包

pub mod scheduler;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use strum::{Display, EnumString};
use tracing::{error, info};

use crate::core::cache::VolumeCache;
use crate::core::epub::EpubGenerator;
use crate::core::error::Result;
use crate::core::event::{EventSender, SpiderEvent};
use crate::core::model::Volume;
use crate::core::text;
use crate::interfaces::Site;
use crate::utils::sanitize_filename;

/// 打包格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputType {
    #[default]
    Epub,
    Text,
}

impl OutputType {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputType::Epub => "epub",
            OutputType::Text => "txt",
        }
    }
}

/// 打包产物文件名：`{小说} {卷}.{扩展名}`
pub fn output_filename(volume: &Volume, output_type: OutputType) -> String {
    let stem = format!("{} {}", volume.novel_title, volume.title);
    format!(
        "{}.{}",
        sanitize_filename(&stem),
        output_type.extension()
    )
}

/// 下载引擎
pub struct ScrapeEngine {
    site: Arc<dyn Site>,
    cache: VolumeCache,
    output_dir: PathBuf,
    output_type: OutputType,
    events: Option<EventSender>,
}

impl ScrapeEngine {
    pub fn new(site: Arc<dyn Site>, output_dir: impl AsRef<Path>, output_type: OutputType) -> Self {
        let output_dir = output_dir.as_ref().to_path_buf();
        Self {
            site,
            cache: VolumeCache::new(&output_dir),
            output_dir,
            output_type,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Option<EventSender>) -> Self {
        self.events = events;
        self
    }

    fn emit(&self, event: SpiderEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    /// 下载整本 (`volume_id` 为空) 或单卷，返回打包产物路径
    pub async fn run(&self, novel_id: u64, volume_id: Option<u64>) -> Result<Vec<PathBuf>> {
        self.emit(SpiderEvent::TaskStarted {
            novel_id,
            title: format!("{} #{}", self.site.id(), novel_id),
        });

        let result = match volume_id {
            Some(volume_id) => self
                .download_volume(novel_id, volume_id)
                .await
                .map(|p| vec![p]),
            None => self.download_novel(novel_id).await,
        };

        match &result {
            Ok(paths) => {
                info!("任务完成，共生成 {} 个文件", paths.len());
                self.emit(SpiderEvent::TaskCompleted {
                    title: novel_id.to_string(),
                });
            }
            Err(e) => {
                error!("任务执行失败: {}", e);
                self.emit(SpiderEvent::TaskFailed {
                    error: e.to_string(),
                });
            }
        }
        result
    }

    /// 已有缓存的卷不再采集，其余卷采集后写入缓存并打包
    pub async fn download_novel(&self, novel_id: u64) -> Result<Vec<PathBuf>> {
        let volume_ids = self.site.discover_volumes(novel_id).await?;

        let mut skip = HashSet::new();
        for &volume_id in &volume_ids {
            if self.cache.contains(novel_id, volume_id).await {
                skip.insert(volume_id);
            }
        }
        if !skip.is_empty() {
            info!("跳过已缓存的 {} 卷", skip.len());
        }

        let novel = self.site.fetch_novel(novel_id, false, &skip).await?;

        let mut outputs = Vec::with_capacity(novel.volumes.len());
        for volume in &novel.volumes {
            self.cache.store(volume).await?;
            outputs.push(self.pack(volume).await?);
        }
        Ok(outputs)
    }

    /// 优先读取缓存
    pub async fn download_volume(&self, novel_id: u64, volume_id: u64) -> Result<PathBuf> {
        let volume = match self.cache.load(novel_id, volume_id).await? {
            Some(volume) => {
                info!("使用缓存: {} (卷 ID: {})", volume.title, volume_id);
                volume
            }
            None => {
                let volume = self.site.fetch_volume(novel_id, volume_id, false).await?;
                self.cache.store(&volume).await?;
                volume
            }
        };
        self.pack(&volume).await
    }

    async fn pack(&self, volume: &Volume) -> Result<PathBuf> {
        let path = self
            .output_dir
            .join(output_filename(volume, self.output_type));
        info!("正在打包: {:?}", path);

        let path = match self.output_type {
            OutputType::Epub => {
                let extra_files = self.site.extra_files();
                EpubGenerator::new(volume, self.site.style_css(), &extra_files)
                    .run(&path)
                    .await?
            }
            OutputType::Text => text::write_volume(volume, &path).await?,
        };

        self.emit(SpiderEvent::PackGenerated {
            path: path.display().to_string(),
        });
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::error::SpiderError;
    use crate::core::event::create_event_channel;
    use crate::core::model::{Chapter, ChapterContent, ExtraFile, Novel};

    /// 记录调用的内存站点
    #[derive(Default)]
    struct StubSite {
        skipped: Mutex<Vec<HashSet<u64>>>,
        volume_fetches: Mutex<usize>,
    }

    fn volume(volume_id: u64) -> Volume {
        Volume {
            id: volume_id,
            novel_id: 1,
            novel_title: "小说".into(),
            title: format!("第{}卷", volume_id),
            chapters: vec![Chapter {
                id: volume_id * 10,
                title: "序章".into(),
                content: Some(ChapterContent {
                    html: "<p>正文</p>".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[async_trait]
    impl Site for StubSite {
        fn id(&self) -> &str {
            "stub"
        }

        async fn discover_volumes(&self, _novel_id: u64) -> Result<Vec<u64>> {
            Ok(vec![1, 2, 3])
        }

        async fn fetch_novel(
            &self,
            novel_id: u64,
            _skip_content: bool,
            skip_volumes: &HashSet<u64>,
        ) -> Result<Novel> {
            self.skipped.lock().push(skip_volumes.clone());
            Ok(Novel {
                id: novel_id,
                volumes: [1, 2, 3]
                    .into_iter()
                    .filter(|id| !skip_volumes.contains(id))
                    .map(volume)
                    .collect(),
                ..Default::default()
            })
        }

        async fn fetch_volume(
            &self,
            _novel_id: u64,
            volume_id: u64,
            _skip_content: bool,
        ) -> Result<Volume> {
            *self.volume_fetches.lock() += 1;
            if volume_id == 404 {
                return Err(SpiderError::Parse("missing".into()));
            }
            Ok(volume(volume_id))
        }

        async fn fetch_chapter(&self, _: u64, _: u64, _: u64) -> Result<Chapter> {
            Ok(Chapter::default())
        }

        fn style_css(&self) -> &str {
            "p {}"
        }

        fn extra_files(&self) -> Vec<ExtraFile> {
            Vec::new()
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_output_type_and_filename() {
        assert_eq!("EPUB".parse::<OutputType>().unwrap(), OutputType::Epub);
        assert_eq!("text".parse::<OutputType>().unwrap(), OutputType::Text);
        assert!("pdf".parse::<OutputType>().is_err());
        assert_eq!(OutputType::Text.to_string(), "text");

        let mut v = volume(1);
        v.title = "上/下".into();
        assert_eq!(output_filename(&v, OutputType::Text), "小说 上_下.txt");
    }

    #[tokio::test]
    async fn test_download_novel_skips_cached_volumes() {
        let dir = tempfile::tempdir().unwrap();
        let site = Arc::new(StubSite::default());
        let engine = ScrapeEngine::new(site.clone(), dir.path(), OutputType::Text);

        VolumeCache::new(dir.path()).store(&volume(2)).await.unwrap();

        let outputs = engine.download_novel(1).await.unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(site.skipped.lock()[0], HashSet::from([2]));
        assert!(dir.path().join("volume-1-1.json").exists());
        assert!(dir.path().join("volume-1-3.json").exists());
        assert!(dir.path().join("小说 第3卷.txt").exists());
        assert!(!dir.path().join("小说 第2卷.txt").exists());
    }

    #[tokio::test]
    async fn test_download_volume_uses_cache() {
        let dir = tempfile::tempdir().unwrap();
        let site = Arc::new(StubSite::default());
        let engine = ScrapeEngine::new(site.clone(), dir.path(), OutputType::Text);

        let first = engine.download_volume(1, 7).await.unwrap();
        let second = engine.download_volume(1, 7).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*site.volume_fetches.lock(), 1);
        assert_eq!(
            std::fs::read_to_string(first).unwrap(),
            "序章\n正文\n\n"
        );
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = create_event_channel();
        let engine = ScrapeEngine::new(Arc::new(StubSite::default()), dir.path(), OutputType::Epub)
            .with_events(Some(tx));

        assert!(engine.run(1, Some(404)).await.is_err());

        let mut saw_failure = false;
        while let Some(event) = rx.try_recv() {
            if let SpiderEvent::TaskFailed { error } = event {
                saw_failure = error.contains("missing");
            }
        }
        assert!(saw_failure);
    }

    #[tokio::test]
    async fn test_run_packs_epub() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ScrapeEngine::new(Arc::new(StubSite::default()), dir.path(), OutputType::Epub);
        let paths = engine.run(1, Some(5)).await.unwrap();
        assert_eq!(paths, vec![dir.path().join("小说 第5卷.epub")]);
        assert!(paths[0].exists());
    }
}
