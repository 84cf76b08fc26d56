//! 纯文本打包
//!
//! 章节标题后接段落文本，每段一行，章节之间空一行。

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use scraper::{Html, Selector};

use crate::core::error::Result;
use crate::core::model::Volume;
use crate::utils::save_file;

fn paragraph_selector() -> &'static Selector {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    SELECTOR.get_or_init(|| Selector::parse("p").unwrap())
}

/// 提取正文段落文本，跳过空段
pub fn paragraphs(html: &str) -> Vec<String> {
    let fragment = Html::parse_fragment(html);
    fragment
        .select(paragraph_selector())
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
        .collect()
}

pub fn render_volume(volume: &Volume) -> String {
    let mut out = String::new();
    for chapter in &volume.chapters {
        out.push_str(chapter.title.trim());
        out.push('\n');
        if let Some(content) = &chapter.content {
            for line in paragraphs(&content.html) {
                out.push_str(&line);
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

pub async fn write_volume(volume: &Volume, output_path: &Path) -> Result<PathBuf> {
    save_file(output_path, render_volume(volume).as_bytes()).await?;
    Ok(output_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{Chapter, ChapterContent};

    fn chapter(title: &str, html: Option<&str>) -> Chapter {
        Chapter {
            title: title.into(),
            content: html.map(|h| ChapterContent {
                html: h.into(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_volume() {
        let volume = Volume {
            chapters: vec![
                chapter(
                    "第１话",
                    Some(r#"<p>「欢迎回来，老爷。」</p><p>  </p><img src="a.jpg"><p>美丽的<b>行礼</b>后</p>"#),
                ),
                chapter("第２话", None),
            ],
            ..Default::default()
        };

        assert_eq!(
            render_volume(&volume),
            "第１话\n「欢迎回来，老爷。」\n美丽的行礼后\n\n第２话\n\n"
        );
    }

    #[tokio::test]
    async fn test_write_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b.txt");
        let volume = Volume {
            chapters: vec![chapter("序章", Some("<p>一</p>"))],
            ..Default::default()
        };
        write_volume(&volume, &path).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "序章\n一\n\n");
    }
}
