//! Bilinovel 索引器
//!
//! 负责小说信息、目录页与卷页的解析

use reqwest::header::HeaderMap;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::SiteSelectors;
use super::selectors::{CHAPTER_URL_RE, VOLUME_URL_RE};
use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, Novel, Volume};
use crate::interfaces::Fetch;
use crate::utils::to_absolute_url;

/// 目录页解析结果
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub novel_title: String,
    /// 目录顺序即卷序
    pub volume_ids: Vec<u64>,
}

impl Catalog {
    /// 卷在目录中的位置 (0 起)
    pub fn position(&self, volume_id: u64) -> Option<usize> {
        self.volume_ids.iter().position(|&id| id == volume_id)
    }
}

/// Bilinovel 索引器
pub struct BilinovelIndexer {
    base: Url,
}

impl BilinovelIndexer {
    /// 创建新的索引器
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    /// 规范化 URL
    #[inline]
    fn normalize(&self, path: &str) -> String {
        to_absolute_url(&self.base, path)
    }

    pub fn novel_url(&self, novel_id: u64) -> String {
        self.normalize(&format!("/novel/{}.html", novel_id))
    }

    pub fn catalog_url(&self, novel_id: u64) -> String {
        self.normalize(&format!("/novel/{}/catalog", novel_id))
    }

    pub fn volume_url(&self, novel_id: u64, volume_id: u64) -> String {
        self.normalize(&format!("/novel/{}/vol_{}.html", novel_id, volume_id))
    }

    pub fn chapter_url(&self, novel_id: u64, chapter_id: u64) -> String {
        self.normalize(&format!("/novel/{}/{}.html", novel_id, chapter_id))
    }

    // ------------------------------------------------------------------
    // 解析
    // ------------------------------------------------------------------

    fn first_text(doc: &Html, selector: &Selector) -> String {
        doc.select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }

    /// 作者在前，插画师在后
    fn authors(doc: &Html) -> Vec<String> {
        let s = SiteSelectors::get();
        doc.select(&s.author)
            .chain(doc.select(&s.illustrator))
            .map(|a| a.text().collect::<String>().trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }

    /// 解析小说信息页 (不含卷)
    pub fn parse_novel(&self, html: &str, novel_id: u64) -> Result<Novel> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let title = Self::first_text(&doc, &s.book_title);
        if title.is_empty() {
            return Err(SpiderError::Parse(format!(
                "Novel title not found: {}",
                novel_id
            )));
        }

        Ok(Novel {
            id: novel_id,
            title,
            description: Self::first_text(&doc, &s.book_summary),
            authors: Self::authors(&doc),
            volumes: Vec::new(),
        })
    }

    /// 解析目录页，保持卷的目录顺序
    pub fn parse_catalog(&self, html: &str, novel_id: u64) -> Result<Catalog> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let mut volume_ids = Vec::new();
        for anchor in doc.select(&s.volume_cover) {
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let Some(caps) = VOLUME_URL_RE.captures(href) else {
                continue;
            };
            // 只接受属于本小说的卷
            if caps[1].parse::<u64>()? != novel_id {
                continue;
            }
            volume_ids.push(caps[2].parse::<u64>()?);
        }

        Ok(Catalog {
            novel_title: Self::first_text(&doc, &s.book_title),
            volume_ids,
        })
    }

    /// 链接不符合章节 URL 格式时 ID 记为 0，抓取正文时才报错
    fn parse_chapter_link(&self, link: ElementRef, novel_id: u64, volume_id: u64) -> Result<Chapter> {
        let href = link.value().attr("href").unwrap_or_default();
        let url = self.normalize(href);

        let id = match CHAPTER_URL_RE.captures(&url) {
            Some(caps) => caps[2].parse()?,
            None => 0,
        };

        Ok(Chapter {
            id,
            novel_id,
            volume_id,
            title: link.text().collect::<String>().trim().to_string(),
            url,
            content: None,
        })
    }

    /// 解析卷页：元数据与章节列表 (不含正文与封面字节)
    pub fn parse_volume(&self, html: &str, novel_id: u64, volume_id: u64) -> Result<Volume> {
        let doc = Html::parse_document(html);
        let s = SiteSelectors::get();

        let chapters = doc
            .select(&s.chapter_link)
            .map(|link| self.parse_chapter_link(link, novel_id, volume_id))
            .collect::<Result<Vec<_>>>()?;

        let cover_url = doc
            .select(&s.book_cover)
            .next()
            .and_then(|img| img.value().attr("src"))
            .map(|src| self.normalize(src))
            .unwrap_or_default();

        Ok(Volume {
            id: volume_id,
            novel_id,
            title: Self::first_text(&doc, &s.book_title),
            description: Self::first_text(&doc, &s.book_summary),
            authors: Self::authors(&doc),
            cover_url,
            url: self.volume_url(novel_id, volume_id),
            chapters,
            ..Default::default()
        })
    }

    // ------------------------------------------------------------------
    // 抓取
    // ------------------------------------------------------------------

    pub async fn fetch_novel_info(&self, client: &dyn Fetch, novel_id: u64) -> Result<Novel> {
        let html = client
            .get_text(&self.novel_url(novel_id), &HeaderMap::new())
            .await?;
        self.parse_novel(&html, novel_id)
    }

    pub async fn fetch_catalog(&self, client: &dyn Fetch, novel_id: u64) -> Result<Catalog> {
        let html = client
            .get_text(&self.catalog_url(novel_id), &HeaderMap::new())
            .await?;
        self.parse_catalog(&html, novel_id)
    }

    pub async fn fetch_volume_page(
        &self,
        client: &dyn Fetch,
        novel_id: u64,
        volume_id: u64,
    ) -> Result<Volume> {
        let html = client
            .get_text(&self.volume_url(novel_id, volume_id), &HeaderMap::new())
            .await?;
        self.parse_volume(&html, novel_id, volume_id)
    }
}
