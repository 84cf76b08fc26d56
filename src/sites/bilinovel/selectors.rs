//! Bilinovel 选择器
//!
//! 预编译的 CSS 选择器与正则

use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use scraper::Selector;

/// 站点选择器集合
pub struct SiteSelectors {
    pub book_title: Selector,
    pub book_summary: Selector,
    pub author: Selector,
    pub illustrator: Selector,
    pub book_cover: Selector,
    pub volume_cover: Selector,
    pub chapter_link: Selector,
    pub chapter_title: Selector,
    pub content: Selector,
    pub paragraph: Selector,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            book_title: Selector::parse(".book-title").unwrap(),
            book_summary: Selector::parse(".book-summary>content").unwrap(),
            author: Selector::parse(".authorname>a").unwrap(),
            illustrator: Selector::parse(".illname>a").unwrap(),
            book_cover: Selector::parse(".book-cover[src]").unwrap(),
            volume_cover: Selector::parse("a.volume-cover-img").unwrap(),
            chapter_link: Selector::parse(".chapter-li.jsChapter a").unwrap(),
            chapter_title: Selector::parse("#atitle").unwrap(),
            content: Selector::parse(CONTENT_ROOT).unwrap(),
            paragraph: Selector::parse("p").unwrap(),
        })
    }
}

/// 正文根节点
pub const CONTENT_ROOT: &str = "#acontent";

/// 正文中需要剔除的装饰节点 (广告等)
pub const DECORATIONS: [&str; 3] = [".cgo", "center", ".google-auto-placed"];

/// 使用混淆字体的标记
pub const OBFUSCATED_FONT_MARKER: &str = r#"font-family: "read""#;

/// 显式的 "下一页" 按钮
pub const NEXT_PAGE_ANCHOR: &str =
    r#"<a onclick="window.location.href = ReadParams.url_next;">下一頁</a>"#;

/// 混淆属性前缀
pub const OBFUSCATION_ATTR_PREFIX: &str = "data-k";

pub static NEXT_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"url_next:\s?['"]([^'"]*?)['"]"#).unwrap());

pub static PAGE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(_\d+)?\.html$").unwrap());

pub static CHAPTER_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/novel/(\d+)/(\d+)\.html").unwrap());

pub static VOLUME_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/novel/(\d+)/vol_(\d+)\.html").unwrap());
