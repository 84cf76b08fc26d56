//! 卷缓存
//!
//! 每卷一个 `volume-{novel}-{volume}.json`，字节字段以 base64 编码。

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::core::error::Result;
use crate::core::model::Volume;
use crate::utils::{file_exists, save_file};

pub struct VolumeCache {
    dir: PathBuf,
}

impl VolumeCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, novel_id: u64, volume_id: u64) -> PathBuf {
        self.dir
            .join(format!("volume-{}-{}.json", novel_id, volume_id))
    }

    pub async fn contains(&self, novel_id: u64, volume_id: u64) -> bool {
        file_exists(self.path(novel_id, volume_id)).await
    }

    /// 缓存不存在时返回 `None`
    pub async fn load(&self, novel_id: u64, volume_id: u64) -> Result<Option<Volume>> {
        let path = self.path(novel_id, volume_id);
        if !file_exists(&path).await {
            return Ok(None);
        }
        let data = fs::read(&path).await?;
        let volume = serde_json::from_slice(&data)?;
        debug!("已读取缓存: {:?}", path);
        Ok(Some(volume))
    }

    pub async fn store(&self, volume: &Volume) -> Result<PathBuf> {
        let path = self.dir.join(volume.cache_filename());
        let data = serde_json::to_vec(volume)?;
        save_file(&path, &data).await?;
        debug!("已写入缓存: {:?}", path);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::core::model::{Chapter, ChapterContent};

    fn sample() -> Volume {
        let mut images = IndexMap::new();
        images.insert("a.png".to_string(), vec![1, 2, 3]);
        Volume {
            id: 236194,
            novel_id: 4126,
            novel_title: "女仆".into(),
            series_idx: 2,
            title: "第１章".into(),
            chapters: vec![Chapter {
                id: 236197,
                title: "第１话".into(),
                content: Some(ChapterContent {
                    html: "<p>正文</p>".into(),
                    images,
                }),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VolumeCache::new(dir.path().join("nested"));
        assert!(!cache.contains(4126, 236194).await);
        assert!(cache.load(4126, 236194).await.unwrap().is_none());

        let path = cache.store(&sample()).await.unwrap();
        assert!(path.ends_with("volume-4126-236194.json"));
        assert!(cache.contains(4126, 236194).await);

        let loaded = cache.load(4126, 236194).await.unwrap().unwrap();
        assert_eq!(loaded.series_idx, 2);
        assert_eq!(loaded.novel_title, "女仆");
        let content = loaded.chapters[0].content.as_ref().unwrap();
        assert_eq!(content.html, "<p>正文</p>");
        assert_eq!(content.images["a.png"], vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_corrupt_cache_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = VolumeCache::new(dir.path());
        std::fs::write(cache.path(1, 2), b"{not json").unwrap();
        let err = cache.load(1, 2).await.unwrap_err();
        assert!(matches!(
            err,
            crate::core::error::SpiderError::Serialization(_)
        ));
    }
}
