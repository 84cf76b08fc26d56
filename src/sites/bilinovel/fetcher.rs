//! Bilinovel 章节抓取器 (Chapter Page Crawler)
//!
//! 逐页抓取章节：请求原始页面、交给渲染会话执行、提取正文与图片、
//! 判断是否存在续页。分页严格按顺序进行，每页是否继续取决于上一页的渲染结果。

use std::sync::Arc;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue, REFERER};
use scraper::Html;
use tracing::{debug, info, warn};
use url::Url;

use super::SiteSelectors;
use super::font::GlyphOutlineMapper;
use super::selectors::{
    CONTENT_ROOT, DECORATIONS, NEXT_PAGE_ANCHOR, NEXT_URL_RE, OBFUSCATED_FONT_MARKER,
    OBFUSCATION_ATTR_PREFIX, PAGE_SUFFIX_RE,
};
use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, ChapterContent};
use crate::interfaces::{Fetch, RenderJob, Renderer};
use crate::utils::{generate_filename, to_absolute_url};

const PAGE_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7";
const PAGE_ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en-GB;q=0.8,en;q=0.7,zh-TW;q=0.6";
const PAGE_COOKIE: &str = "night=1;";

/// 章节页请求头：简体、非移动端跳转、夜间模式
pub fn page_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(PAGE_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(PAGE_ACCEPT_LANGUAGE));
    headers.insert(COOKIE, HeaderValue::from_static(PAGE_COOKIE));
    headers
}

/// 图片请求头：固定 Referer
pub fn image_headers(base: &Url) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let referer = base.as_str().trim_end_matches('/');
    if let Ok(value) = HeaderValue::from_str(referer) {
        headers.insert(REFERER, value);
    }
    headers
}

/// 第 n 页的地址：第 1 页无后缀，其后为 `{stem}_{n}.html`
pub fn page_url(chapter_url: &str, page: usize) -> String {
    if page <= 1 {
        return chapter_url.to_string();
    }
    let stem = chapter_url.strip_suffix(".html").unwrap_or(chapter_url);
    format!("{}_{}.html", stem, page)
}

/// 去掉 `_n.html` / `.html` 后缀，只保留路径部分
fn normalized_path(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string());
    PAGE_SUFFIX_RE.replace(&path, "").into_owned()
}

/// 续页判定：显式的 "下一頁" 按钮，或 `ReadParams.url_next` 仍指向本章节
pub fn has_next_page(raw: &str, rendered: &str, current_url: &str) -> Result<bool> {
    let anchor = raw.contains(NEXT_PAGE_ANCHOR) || rendered.contains(NEXT_PAGE_ANCHOR);

    let next = NEXT_URL_RE
        .captures(rendered)
        .or_else(|| NEXT_URL_RE.captures(raw))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| {
            SpiderError::Parse(format!("Next page metadata not found: {}", current_url))
        })?;
    let same_chapter = !next.is_empty() && normalized_path(&next) == normalized_path(current_url);

    if anchor != same_chapter {
        debug!(
            "续页信号不一致 (anchor: {}, url_next: {}): {}",
            anchor, same_chapter, current_url
        );
    }
    Ok(anchor || same_chapter)
}

/// 单页提取结果
#[derive(Debug, Default)]
pub struct ExtractedPage {
    pub title: Option<String>,
    pub html: String,
    /// (文件名, 图片地址)，按出现顺序
    pub images: Vec<(String, String)>,
}

/// 抓取状态机
#[derive(Debug)]
enum CrawlState {
    FetchingPage(usize),
    Rendering {
        page: usize,
        url: String,
        raw: String,
    },
    ExtractingContent {
        page: usize,
        url: String,
        raw: String,
        rendered: String,
    },
    CheckingContinuation {
        page: usize,
        url: String,
        raw: String,
        rendered: String,
    },
    Done,
}

/// 站点特定正文获取器
pub struct BilinovelFetcher {
    /// 站点基准 URL
    base: Url,
    fonts: Option<Arc<GlyphOutlineMapper>>,
    text_only: bool,
}

impl BilinovelFetcher {
    pub fn new(base: Url, fonts: Option<Arc<GlyphOutlineMapper>>, text_only: bool) -> Self {
        Self {
            base,
            fonts,
            text_only,
        }
    }

    /// 按状态机抓取章节的全部分页
    pub async fn fetch_chapter(
        &self,
        client: &dyn Fetch,
        renderer: &dyn Renderer,
        mut chapter: Chapter,
    ) -> Result<Chapter> {
        if chapter.id == 0 {
            return Err(SpiderError::Parse(format!(
                "Chapter id not found in: {}",
                chapter.url
            )));
        }
        info!("正在获取章节: {} (ID: {})", chapter.title, chapter.id);

        let mut content = chapter.content.take().unwrap_or_default();
        let mut state = CrawlState::FetchingPage(1);

        loop {
            state = match state {
                CrawlState::FetchingPage(page) => {
                    let url = page_url(&chapter.url, page);
                    debug!("获取分页 {}: {}", page, url);
                    let raw = client.get_text(&url, &page_headers()).await?;
                    CrawlState::Rendering { page, url, raw }
                }
                CrawlState::Rendering { page, url, raw } => {
                    let rendered = renderer
                        .render(RenderJob {
                            html: &raw,
                            root: CONTENT_ROOT,
                            chapter_id: chapter.id,
                        })
                        .await?;
                    CrawlState::ExtractingContent {
                        page,
                        url,
                        raw,
                        rendered,
                    }
                }
                CrawlState::ExtractingContent {
                    page,
                    url,
                    raw,
                    rendered,
                } => {
                    let extracted = self.extract_page(&rendered, page)?;
                    if let Some(title) = extracted.title.filter(|t| !t.is_empty()) {
                        chapter.title = title;
                    }
                    content.push_page(&extracted.html);
                    self.fetch_images(client, &mut content, extracted.images)
                        .await;
                    CrawlState::CheckingContinuation {
                        page,
                        url,
                        raw,
                        rendered,
                    }
                }
                CrawlState::CheckingContinuation {
                    page,
                    url,
                    raw,
                    rendered,
                } => {
                    if has_next_page(&raw, &rendered, &url)? {
                        CrawlState::FetchingPage(page + 1)
                    } else {
                        debug!("章节 {} 共 {} 页", chapter.id, page);
                        CrawlState::Done
                    }
                }
                CrawlState::Done => break,
            };
        }

        chapter.content = Some(content);
        Ok(chapter)
    }

    /// 获取图片；单张失败只记录并跳过
    async fn fetch_images(
        &self,
        client: &dyn Fetch,
        content: &mut ChapterContent,
        images: Vec<(String, String)>,
    ) {
        let headers = image_headers(&self.base);
        for (filename, url) in images {
            if content.images.contains_key(&filename) {
                continue;
            }
            match client.get_bytes(&url, &headers).await {
                Ok(bytes) => {
                    content.images.insert(filename, bytes);
                }
                Err(e) => match e.status() {
                    Some(status) => warn!("图片获取失败 ({})，已跳过 {}", status, url),
                    None => warn!("图片获取失败，已跳过 {}: {}", url, e),
                },
            }
        }
    }

    /// 从渲染后的页面中提取正文片段
    ///
    /// 装饰节点移除、混淆字体还原、图片引用改写、混淆属性清理。
    pub fn extract_page(&self, rendered: &str, page: usize) -> Result<ExtractedPage> {
        let s = SiteSelectors::get();
        let (title, fragment) = {
            let doc = Html::parse_document(rendered);
            let title = (page == 1).then(|| {
                doc.select(&s.chapter_title)
                    .next()
                    .map(|el| el.text().collect::<String>().trim().to_string())
                    .unwrap_or_default()
            });
            let root = doc
                .select(&s.content)
                .next()
                .ok_or_else(|| SpiderError::Parse("Chapter content root not found".into()))?;
            (title, root.inner_html())
        };

        let stripped = strip_decorations(&fragment)?;

        let remap = if rendered.contains(OBFUSCATED_FONT_MARKER) {
            match &self.fonts {
                Some(mapper) => last_paragraph(&stripped)
                    .map(|(index, text)| (index, mapper.remap_text(&text))),
                None => {
                    warn!("检测到混淆字体，但未配置字体文件，跳过还原");
                    None
                }
            }
        } else {
            None
        };

        let mut images = Vec::new();
        let html = self.rewrite_content(&stripped, remap, &mut images)?;

        Ok(ExtractedPage {
            title,
            html,
            images,
        })
    }

    fn rewrite_content(
        &self,
        fragment: &str,
        remap: Option<(usize, String)>,
        images: &mut Vec<(String, String)>,
    ) -> Result<String> {
        let mut paragraph_index = 0usize;
        let text_only = self.text_only;
        let base = &self.base;

        let output = rewrite_str(
            fragment,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("p", |el| {
                        if let Some((target, text)) = &remap
                            && *target == paragraph_index
                        {
                            el.set_inner_content(text, ContentType::Text);
                        }
                        paragraph_index += 1;
                        Ok(())
                    }),
                    element!("img", |el| {
                        if text_only {
                            el.remove();
                            return Ok(());
                        }

                        let src = el
                            .get_attribute("data-src")
                            .filter(|v| !v.is_empty())
                            .or_else(|| el.get_attribute("src").filter(|v| !v.is_empty()));
                        let Some(src) = src else {
                            return Ok(());
                        };

                        let url = to_absolute_url(base, &src);
                        let filename = generate_filename(&url);
                        el.set_attribute("src", &filename)?;
                        el.set_attribute("alt", &url)?;
                        el.remove_attribute("class");
                        images.push((filename, url));
                        Ok(())
                    }),
                    element!("*", |el| {
                        let obfuscated: Vec<String> = el
                            .attributes()
                            .iter()
                            .map(|a| a.name())
                            .filter(|name| name.starts_with(OBFUSCATION_ATTR_PREFIX))
                            .collect();
                        for name in obfuscated {
                            el.remove_attribute(&name);
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::new()
            },
        )?;

        Ok(output.trim().to_string())
    }
}

/// 移除广告等装饰节点
fn strip_decorations(fragment: &str) -> Result<String> {
    let handlers = DECORATIONS
        .iter()
        .map(|selector| {
            element!(*selector, |el| {
                el.remove();
                Ok(())
            })
        })
        .collect();

    Ok(rewrite_str(
        fragment,
        RewriteStrSettings {
            element_content_handlers: handlers,
            ..RewriteStrSettings::new()
        },
    )?)
}

/// 最后一个段落的序号与文本
fn last_paragraph(fragment: &str) -> Option<(usize, String)> {
    let doc = Html::parse_fragment(fragment);
    let s = SiteSelectors::get();
    let paragraphs: Vec<_> = doc.select(&s.paragraph).collect();
    let last = paragraphs.last()?;
    Some((paragraphs.len() - 1, last.text().collect()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    const FIXTURE: &str = include_str!("testdata/chapter_236197.html");

    fn base() -> Url {
        Url::parse("https://www.bilinovel.com").unwrap()
    }

    fn fetcher() -> BilinovelFetcher {
        BilinovelFetcher::new(base(), None, false)
    }

    /// 内存中的传输层
    #[derive(Default)]
    struct MemoryFetch {
        pages: HashMap<String, String>,
        images: HashMap<String, Vec<u8>>,
        requested: Mutex<Vec<String>>,
        referers: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetch for MemoryFetch {
        async fn get_text(&self, url: &str, _headers: &HeaderMap) -> Result<String> {
            self.requested.lock().push(url.to_string());
            self.pages.get(url).cloned().ok_or_else(|| SpiderError::Fetch {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
        }

        async fn get_bytes(&self, url: &str, headers: &HeaderMap) -> Result<Vec<u8>> {
            if let Some(r) = headers.get(REFERER).and_then(|v| v.to_str().ok()) {
                self.referers.lock().push(r.to_string());
            }
            self.images.get(url).cloned().ok_or_else(|| SpiderError::Fetch {
                url: url.to_string(),
                status: reqwest::StatusCode::NOT_FOUND,
            })
        }
    }

    /// 原样返回的渲染器
    struct PassThrough;

    #[async_trait]
    impl Renderer for PassThrough {
        async fn render(&self, job: RenderJob<'_>) -> Result<String> {
            Ok(job.html.to_string())
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn chapter_page(title: &str, body: &str, next: &str, with_anchor: bool) -> String {
        let anchor = if with_anchor { NEXT_PAGE_ANCHOR } else { "" };
        format!(
            r#"<html><body><script>var ReadParams={{url_previous:'/novel/1/9.html',url_next:'{next}',url_index:'/novel/1/catalog'}};</script>
<h1 id="atitle">{title}</h1><div id="acontent">{body}</div><div id="footlink">{anchor}</div></body></html>"#
        )
    }

    fn chapter(id: u64) -> Chapter {
        Chapter {
            id,
            novel_id: 1,
            volume_id: 2,
            title: "目录标题".into(),
            url: format!("https://www.bilinovel.com/novel/1/{}.html", id),
            content: None,
        }
    }

    #[test]
    fn test_page_url() {
        let url = "https://www.bilinovel.com/novel/4126/236197.html";
        assert_eq!(page_url(url, 1), url);
        assert_eq!(
            page_url(url, 2),
            "https://www.bilinovel.com/novel/4126/236197_2.html"
        );
        assert_eq!(
            page_url(url, 12),
            "https://www.bilinovel.com/novel/4126/236197_12.html"
        );
    }

    #[test]
    fn test_headers() {
        let h = page_headers();
        assert_eq!(h.get(COOKIE).unwrap(), "night=1;");
        assert!(h.get(ACCEPT_LANGUAGE).unwrap().to_str().unwrap().starts_with("zh-CN"));
        assert_eq!(
            image_headers(&base()).get(REFERER).unwrap(),
            "https://www.bilinovel.com"
        );
    }

    #[test]
    fn test_has_next_page_fixture() {
        let url = "https://www.bilinovel.com/novel/4126/236197.html";
        assert!(has_next_page(FIXTURE, FIXTURE, url).unwrap());
    }

    #[test]
    fn test_has_next_page_by_metadata_only() {
        let page = chapter_page("t", "<p>x</p>", "/novel/1/5_3.html", false);
        assert!(has_next_page(&page, &page, "https://www.bilinovel.com/novel/1/5_2.html").unwrap());

        // 指向下一章节
        let last = chapter_page("t", "<p>x</p>", "/novel/1/6.html", false);
        assert!(!has_next_page(&last, &last, "https://www.bilinovel.com/novel/1/5_2.html").unwrap());

        // 前缀相同但章节不同
        let other = chapter_page("t", "<p>x</p>", "/novel/1/55.html", false);
        assert!(!has_next_page(&other, &other, "https://www.bilinovel.com/novel/1/5.html").unwrap());
    }

    #[test]
    fn test_has_next_page_missing_metadata() {
        let err = has_next_page("<html></html>", "<html></html>", "https://x/novel/1/2.html")
            .unwrap_err();
        assert!(matches!(err, SpiderError::Parse(_)));
    }

    #[test]
    fn test_extract_fixture_strips_ads_and_captures_title() {
        let page = fetcher().extract_page(FIXTURE, 1).unwrap();
        assert_eq!(page.title.as_deref(), Some("第１话 目标成为女仆的少女"));
        assert!(!page.html.contains("cgo"));
        assert!(!page.html.contains("adsbygoogle"));
        assert!(page.html.starts_with("<p>「欢迎回来，老爷。」</p>"));
        assert!(page.images.is_empty());

        let later = fetcher().extract_page(FIXTURE, 2).unwrap();
        assert!(later.title.is_none());
    }

    #[test]
    fn test_extract_rewrites_images_and_obfuscation_attrs() {
        let body = r#"<p data-k7f="1" class="keep">段落</p>
<img class="imagecontent lazyload" src="/loading.gif" data-src="https://img3.readpai.com/4/4126/236197/268121.jpg">
<img src="//img3.readpai.com/a.png">
<img>
<center>广告</center><div class="google-auto-placed"><p>广告段落</p></div>"#;
        let html = chapter_page("t", body, "/novel/1/6.html", false);

        let page = fetcher().extract_page(&html, 1).unwrap();
        let jpg = generate_filename("https://img3.readpai.com/4/4126/236197/268121.jpg");
        let png = generate_filename("https://img3.readpai.com/a.png");

        assert_eq!(
            page.images,
            vec![
                (jpg.clone(), "https://img3.readpai.com/4/4126/236197/268121.jpg".to_string()),
                (png.clone(), "https://img3.readpai.com/a.png".to_string()),
            ]
        );
        assert!(page.html.contains(&format!(r#"src="{}""#, jpg)));
        assert!(page.html.contains(r#"alt="https://img3.readpai.com/4/4126/236197/268121.jpg""#));
        assert!(!page.html.contains("lazyload"));
        assert!(!page.html.contains("data-k7f"));
        assert!(page.html.contains(r#"class="keep""#));
        assert!(!page.html.contains("广告"));
    }

    #[test]
    fn test_extract_text_only_drops_images() {
        let body = r#"<p>一</p><img data-src="https://img.example.com/a.jpg">"#;
        let html = chapter_page("t", body, "/novel/1/6.html", false);
        let page = BilinovelFetcher::new(base(), None, true)
            .extract_page(&html, 1)
            .unwrap();
        assert!(page.images.is_empty());
        assert!(!page.html.contains("<img"));
    }

    #[test]
    fn test_extract_remaps_last_paragraph() {
        let mapper = GlyphOutlineMapper::from_outlines(
            [('\u{E001}', "A".to_string()), ('\u{E002}', "B".to_string())],
            [('女', "A".to_string()), ('仆', "B".to_string())],
        );
        let body = "<p>\u{E001}保持原样</p><p>\u{E001}\u{E002}?</p><div class=\"cgo\"><p>广告</p></div>";
        let html = chapter_page("t", body, "/novel/1/6.html", false).replace(
            "<body>",
            r#"<body><style>#acontent p:last-of-type { font-family: "read" !important; }</style>"#,
        );

        let with_font = BilinovelFetcher::new(base(), Some(Arc::new(mapper)), false);
        let page = with_font.extract_page(&html, 1).unwrap();
        assert_eq!(page.html, "<p>\u{E001}保持原样</p><p>女仆</p>");

        // 未配置字体时原样保留
        let page = fetcher().extract_page(&html, 1).unwrap();
        assert!(page.html.contains("<p>\u{E001}\u{E002}?</p>"));
    }

    #[test]
    fn test_extract_missing_root() {
        let err = fetcher().extract_page("<html><body></body></html>", 1).unwrap_err();
        assert!(matches!(err, SpiderError::Parse(_)));
    }

    #[tokio::test]
    async fn test_single_page_chapter() {
        let mut fetch = MemoryFetch::default();
        fetch.pages.insert(
            "https://www.bilinovel.com/novel/1/5.html".into(),
            chapter_page("第一话", "<p>唯一一页</p>", "/novel/1/6.html", false),
        );

        let chapter = fetcher()
            .fetch_chapter(&fetch, &PassThrough, chapter(5))
            .await
            .unwrap();

        assert_eq!(chapter.title, "第一话");
        assert_eq!(chapter.content.unwrap().html, "<p>唯一一页</p>");
        assert_eq!(fetch.requested.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_multi_page_chapter_merges_in_order() {
        let mut fetch = MemoryFetch::default();
        fetch.pages.insert(
            "https://www.bilinovel.com/novel/1/5.html".into(),
            chapter_page(
                "第一话",
                r#"<p>第一页</p><img data-src="https://img.example.com/a.jpg">"#,
                "/novel/1/5_2.html",
                true,
            ),
        );
        fetch.pages.insert(
            "https://www.bilinovel.com/novel/1/5_2.html".into(),
            chapter_page(
                "第一话（2/3）",
                r#"<p>第二页</p><img data-src="https://img.example.com/a.jpg"><img data-src="https://img.example.com/missing.jpg">"#,
                "/novel/1/5_3.html",
                false,
            ),
        );
        fetch.pages.insert(
            "https://www.bilinovel.com/novel/1/5_3.html".into(),
            chapter_page("第一话（3/3）", "  <p>第三页</p>\n", "/novel/1/6.html", false),
        );
        fetch
            .images
            .insert("https://img.example.com/a.jpg".into(), vec![1, 2, 3]);

        let chapter = fetcher()
            .fetch_chapter(&fetch, &PassThrough, chapter(5))
            .await
            .unwrap();

        assert_eq!(chapter.title, "第一话");
        let content = chapter.content.unwrap();
        let a = generate_filename("https://img.example.com/a.jpg");
        assert_eq!(
            content.html,
            format!(
                r#"<p>第一页</p><img data-src="https://img.example.com/a.jpg" src="{a}" alt="https://img.example.com/a.jpg"><p>第二页</p><img data-src="https://img.example.com/a.jpg" src="{a}" alt="https://img.example.com/a.jpg"><img data-src="https://img.example.com/missing.jpg" src="{}" alt="https://img.example.com/missing.jpg"><p>第三页</p>"#,
                generate_filename("https://img.example.com/missing.jpg")
            )
        );
        // 同一地址只保存一次，获取失败的图片被跳过
        assert_eq!(content.images.len(), 1);
        assert_eq!(content.images[&a], vec![1, 2, 3]);
        assert!(fetch.referers.lock().iter().all(|r| r == "https://www.bilinovel.com"));
        assert_eq!(
            *fetch.requested.lock(),
            vec![
                "https://www.bilinovel.com/novel/1/5.html",
                "https://www.bilinovel.com/novel/1/5_2.html",
                "https://www.bilinovel.com/novel/1/5_3.html",
            ]
        );
    }

    #[tokio::test]
    async fn test_chapter_without_id_fails_before_fetching() {
        let fetch = MemoryFetch::default();
        let mut unmatched = chapter(0);
        unmatched.url = "https://www.bilinovel.com/novel/1/intro.html".into();

        let err = fetcher()
            .fetch_chapter(&fetch, &PassThrough, unmatched)
            .await
            .unwrap_err();
        assert!(matches!(err, SpiderError::Parse(ref m) if m.contains("intro.html")));
        assert!(fetch.requested.lock().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_error_aborts_chapter() {
        let mut fetch = MemoryFetch::default();
        fetch.pages.insert(
            "https://www.bilinovel.com/novel/1/5.html".into(),
            chapter_page("第一话", "<p>一</p>", "/novel/1/5_2.html", true),
        );

        let err = fetcher()
            .fetch_chapter(&fetch, &PassThrough, chapter(5))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
    }
}
