//! 领域模型 (Domain Model)
//!
//! Novel → Volume → Chapter 的有序文档树，供打包与 JSON 缓存消费。

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::utils::serde_base64;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Novel {
    pub id: u64,
    pub title: String,
    pub description: String,
    /// 作者在前，插画师在后
    pub authors: Vec<String>,
    pub volumes: Vec<Volume>,
}

/// 卷信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Volume {
    pub id: u64,
    pub novel_id: u64,
    pub novel_title: String,
    /// 目录页中的位置 (0 起)，与并发完成顺序无关
    pub series_idx: usize,
    pub title: String,
    pub description: String,
    pub authors: Vec<String>,
    pub cover_url: String,
    #[serde(default, with = "serde_base64::option")]
    pub cover: Option<Vec<u8>>,
    pub url: String,
    pub chapters: Vec<Chapter>,
}

impl Volume {
    pub fn cache_filename(&self) -> String {
        format!("volume-{}-{}.json", self.novel_id, self.id)
    }
}

/// 章节信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chapter {
    pub id: u64,
    pub novel_id: u64,
    pub volume_id: u64,
    pub title: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<ChapterContent>,
}

impl Chapter {
    pub fn filename(&self) -> String {
        format!("chap_{}", self.id)
    }
}

/// 逐页拼接的正文与其引用的图片
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChapterContent {
    pub html: String,
    /// 文件名 (内容寻址) → 原始字节
    #[serde(default, with = "serde_base64::map")]
    pub images: IndexMap<String, Vec<u8>>,
}

impl ChapterContent {
    /// 追加一页内容，去除页首尾空白
    pub fn push_page(&mut self, html: &str) {
        self.html.push_str(html.trim());
    }
}

/// 站点提供的附加打包资源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraFile {
    pub name: String,
    #[serde(with = "serde_base64")]
    pub data: Vec<u8>,
}
