//! 字体字形映射 (Glyph Outline Mapper)
//!
//! 站点对章节末段使用自定义 `read` 字体，把真实字符的字形挂到任意码位上。
//! 这里按字形轮廓而非码位匹配：混淆字体中的某个码位与参考字体中
//! 轮廓完全一致的码位即为其真实字符。

use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use tracing::debug;
use ttf_parser::{Face, GlyphId, OutlineBuilder};

use crate::core::error::{Result, SpiderError};

/// 轮廓坐标归一化到的 em 大小
const NORMALIZED_EM: f32 = 1000.0;

/// 把字形轮廓序列化为规范字符串
struct OutlineKey {
    scale: f32,
    buf: String,
}

impl OutlineKey {
    fn new(units_per_em: u16) -> Self {
        Self {
            scale: NORMALIZED_EM / f32::from(units_per_em.max(1)),
            buf: String::new(),
        }
    }

    fn point(&mut self, x: f32, y: f32) {
        let _ = write!(
            self.buf,
            " {} {}",
            (x * self.scale).round() as i32,
            (y * self.scale).round() as i32
        );
    }
}

impl OutlineBuilder for OutlineKey {
    fn move_to(&mut self, x: f32, y: f32) {
        self.buf.push('M');
        self.point(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.buf.push('L');
        self.point(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.buf.push('Q');
        self.point(x1, y1);
        self.point(x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.buf.push('C');
        self.point(x1, y1);
        self.point(x2, y2);
        self.point(x, y);
    }

    fn close(&mut self) {
        self.buf.push('Z');
    }
}

/// 枚举字体中所有 Unicode 码位及其轮廓键，按码位升序
fn outline_keys(data: &[u8]) -> Result<Vec<(char, String)>> {
    let face = Face::parse(data, 0).map_err(|e| SpiderError::Font(e.to_string()))?;
    let cmap = face
        .tables()
        .cmap
        .ok_or_else(|| SpiderError::Font("font has no cmap table".into()))?;

    let mut glyphs: HashMap<u32, GlyphId> = HashMap::new();
    for subtable in cmap.subtables {
        if !subtable.is_unicode() {
            continue;
        }
        subtable.codepoints(|cp| {
            if let Some(id) = subtable.glyph_index(cp) {
                glyphs.entry(cp).or_insert(id);
            }
        });
    }

    let mut codepoints: Vec<u32> = glyphs.keys().copied().collect();
    codepoints.sort_unstable();

    let mut keys = Vec::with_capacity(codepoints.len());
    for cp in codepoints {
        let Some(c) = char::from_u32(cp) else {
            continue;
        };
        let mut key = OutlineKey::new(face.units_per_em());
        // 空轮廓 (空格等) 不参与匹配
        if face.outline_glyph(glyphs[&cp], &mut key).is_some() && !key.buf.is_empty() {
            keys.push((c, key.buf));
        }
    }
    Ok(keys)
}

#[derive(Debug, Clone, Default)]
pub struct GlyphOutlineMapper {
    mapping: HashMap<char, char>,
}

impl GlyphOutlineMapper {
    /// 由两份字体数据 (混淆字体, 参考字体) 构建
    pub fn from_fonts(obfuscated: &[u8], reference: &[u8]) -> Result<Self> {
        let mapper = Self::from_outlines(outline_keys(obfuscated)?, outline_keys(reference)?);
        debug!("字形映射已建立: {} 个码位", mapper.len());
        Ok(mapper)
    }

    /// 从磁盘读取两份字体
    pub fn load(obfuscated: &Path, reference: &Path) -> Result<Self> {
        let obfuscated = std::fs::read(obfuscated)?;
        let reference = std::fs::read(reference)?;
        Self::from_fonts(&obfuscated, &reference)
    }

    /// 由 (码位, 轮廓键) 序列构建；参考字体中同一轮廓出现多次时取码位最小者
    pub fn from_outlines<O, R>(obfuscated: O, reference: R) -> Self
    where
        O: IntoIterator<Item = (char, String)>,
        R: IntoIterator<Item = (char, String)>,
    {
        let mut by_outline: HashMap<String, char> = HashMap::new();
        for (c, key) in reference {
            by_outline
                .entry(key)
                .and_modify(|existing| {
                    if c < *existing {
                        *existing = c;
                    }
                })
                .or_insert(c);
        }

        let mapping = obfuscated
            .into_iter()
            .filter_map(|(c, key)| by_outline.get(&key).map(|&real| (c, real)))
            .collect();

        Self { mapping }
    }

    /// 返回码位对应的真实字符；不在替换集中时返回 `None`
    pub fn map(&self, c: char) -> Option<char> {
        self.mapping.get(&c).copied()
    }

    /// 逐字符映射，无法映射的字符被丢弃
    pub fn remap_text(&self, text: &str) -> String {
        text.chars().filter_map(|c| self.map(c)).collect()
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
