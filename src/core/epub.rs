//! EPUB 编译引擎 (EPUB Compilation Engine)
//!
//! 将单卷 (Volume/Chapter) 序列化为 EPUB 容器：元数据、样式表、封面、
//! 每章一个 XHTML 文档以及 `Images/` 下的插图资源。

use std::path::{Path, PathBuf};

use epub_builder::{EpubBuilder, EpubContent, ZipLibrary};
use lol_html::{RewriteStrSettings, element, rewrite_str};
use mime_guess::MimeGuess;
use tracing::debug;

use crate::core::error::{Result, SpiderError};
use crate::core::model::{Chapter, ExtraFile, Volume};

const CHAPTER_DIR: &str = "Text";
const IMAGE_DIR: &str = "Images";
const LANGUAGE: &str = "zh";

fn package_err(e: impl std::fmt::Display) -> SpiderError {
    SpiderError::Package(e.to_string())
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn guess_mime(name: &str) -> &'static str {
    MimeGuess::from_path(name).first_raw().unwrap_or("image/jpeg")
}

/// 章节内图片引用指向 `Images/` 下的资源
fn relink_images(html: &str) -> Result<String> {
    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("img[src]", |el| {
                if let Some(src) = el.get_attribute("src")
                    && !src.contains('/')
                {
                    el.set_attribute("src", &format!("../{}/{}", IMAGE_DIR, src))?;
                }
                Ok(())
            })],
            ..RewriteStrSettings::new()
        },
    )?;
    Ok(output)
}

/// EPUB 文档生成器
pub struct EpubGenerator<'a> {
    volume: &'a Volume,
    style: &'a str,
    extra_files: &'a [ExtraFile],
}

impl<'a> EpubGenerator<'a> {
    pub fn new(volume: &'a Volume, style: &'a str, extra_files: &'a [ExtraFile]) -> Self {
        Self {
            volume,
            style,
            extra_files,
        }
    }

    /// 书名：`{小说} {卷}`
    pub fn title(&self) -> String {
        format!("{} {}", self.volume.novel_title, self.volume.title)
            .trim()
            .to_string()
    }

    /// 执行文档编译流水线并写入 `output_path`
    pub async fn run(&self, output_path: &Path) -> Result<PathBuf> {
        let builder = self.build()?;

        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let final_path = output_path.to_path_buf();
        let target = final_path.clone();
        // ZIP 压缩放到阻塞线程池
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&target)?;
            let mut builder = builder;
            builder.generate(file).map_err(package_err)?;
            Ok(())
        })
        .await
        .map_err(|e| SpiderError::Package(format!("Worker join error: {}", e)))??;

        Ok(final_path)
    }

    fn build(&self) -> Result<EpubBuilder<ZipLibrary>> {
        let mut builder =
            EpubBuilder::new(ZipLibrary::new().map_err(package_err)?).map_err(package_err)?;

        self.configure_metadata(&mut builder)?;
        for chapter in &self.volume.chapters {
            self.add_chapter(&mut builder, chapter)?;
        }
        self.add_image_items(&mut builder)?;

        for extra in self.extra_files {
            builder
                .add_resource(&extra.name, extra.data.as_slice(), guess_mime(&extra.name))
                .map_err(package_err)?;
        }

        Ok(builder)
    }

    /// 注入书籍元数据 (Dublin Core Metadata)
    fn configure_metadata(&self, builder: &mut EpubBuilder<ZipLibrary>) -> Result<()> {
        let volume = self.volume;

        builder.set_title(self.title());
        for author in &volume.authors {
            builder.add_author(author);
        }
        if !volume.description.is_empty() {
            builder.set_description(vec![volume.description.clone()]);
        }
        builder.set_lang(LANGUAGE);
        builder
            .stylesheet(self.style.as_bytes())
            .map_err(package_err)?;

        if let Some(cover) = &volume.cover {
            let ext = Path::new(&volume.cover_url)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("jpg");
            let name = format!("{}/cover.{}", IMAGE_DIR, ext);
            let mime = guess_mime(&name);
            builder
                .add_cover_image(&name, cover.as_slice(), mime)
                .map_err(package_err)?;
        }

        Ok(())
    }

    fn add_chapter(&self, builder: &mut EpubBuilder<ZipLibrary>, chapter: &Chapter) -> Result<()> {
        let file_name = format!("{}/{}.xhtml", CHAPTER_DIR, chapter.filename());
        let body = match &chapter.content {
            Some(content) => relink_images(&content.html)?,
            None => String::new(),
        };

        let xhtml = wrap_html(
            &chapter.title,
            &format!("<h1>{}</h1>\n{}", escape(&chapter.title), body),
        );

        builder
            .add_content(EpubContent::new(&file_name, xhtml.as_bytes()).title(&chapter.title))
            .map_err(package_err)?;
        Ok(())
    }

    /// 插图按章节顺序打包，同名资源只写入一次
    fn add_image_items(&self, builder: &mut EpubBuilder<ZipLibrary>) -> Result<()> {
        let mut written = std::collections::HashSet::new();
        for content in self.volume.chapters.iter().filter_map(|c| c.content.as_ref()) {
            for (name, data) in &content.images {
                if !written.insert(name.as_str()) {
                    continue;
                }
                let dest = format!("{}/{}", IMAGE_DIR, name);
                builder
                    .add_resource(&dest, data.as_slice(), guess_mime(name))
                    .map_err(package_err)?;
            }
        }
        debug!("已打包 {} 张图片", written.len());
        Ok(())
    }
}

/// XHTML 1.1 模板
fn wrap_html(title: &str, body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{}">
<head>
    <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8" />
    <title>{}</title>
    <link rel="stylesheet" type="text/css" href="../stylesheet.css" />
</head>
<body>
{}
</body>
</html>"#,
        LANGUAGE,
        escape(title),
        body
    )
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::core::model::ChapterContent;

    #[test]
    fn test_relink_images() {
        let html = r#"<p>a</p><img src="abc.jpg" alt="https://x/abc.jpg"><img src="https://x/y.png">"#;
        let out = relink_images(html).unwrap();
        assert!(out.contains(r#"<img src="../Images/abc.jpg" alt="https://x/abc.jpg">"#));
        assert!(out.contains(r#"src="https://x/y.png""#));
    }

    #[test]
    fn test_wrap_html_escapes_title() {
        let xhtml = wrap_html("A & B", "<p>x</p>");
        assert!(xhtml.contains("<title>A &amp; B</title>"));
        assert!(xhtml.contains("<p>x</p>"));
    }

    #[tokio::test]
    async fn test_generate_epub() {
        let mut images = IndexMap::new();
        images.insert("abc.png".to_string(), vec![0x89, b'P', b'N', b'G']);
        let volume = Volume {
            id: 2,
            novel_id: 1,
            novel_title: "小说".into(),
            title: "第一卷".into(),
            authors: vec!["作者".into()],
            cover_url: "https://img/cover.jpg".into(),
            cover: Some(vec![0xff, 0xd8]),
            chapters: vec![Chapter {
                id: 9,
                title: "第一话".into(),
                content: Some(ChapterContent {
                    html: r#"<p>正文</p><img src="abc.png">"#.into(),
                    images,
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out").join("小说 第一卷.epub");
        let generator = EpubGenerator::new(&volume, "body {}", &[]);
        assert_eq!(generator.title(), "小说 第一卷");

        let path = generator.run(&output).await.unwrap();
        let bytes = std::fs::read(path).unwrap();
        // ZIP 本地文件头
        assert_eq!(&bytes[..2], b"PK");
    }
}
