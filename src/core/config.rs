//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 与 `SPIDER__*` 环境变量的反序列化及其层级结构映射，所有字段均有默认值。

use std::path::{Path, PathBuf};

use bon::Builder;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::error::{Result, SpiderError};

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 缓存与打包产物输出目录
    #[serde(default = "default_output_path")]
    #[builder(default = default_output_path())]
    pub output_path: String,

    /// 自动化浏览器 (Chromium) 相关配置
    #[serde(default)]
    #[builder(default)]
    pub browser: BrowserConfig,

    /// 调度与网络参数
    #[serde(default)]
    #[builder(default)]
    pub spider: SpiderConfig,

    /// 站点配置
    #[serde(default)]
    #[builder(default)]
    pub site: SiteConfig,

    /// 混淆字体资源
    #[serde(default)]
    #[builder(default)]
    pub fonts: FontConfig,
}

/// 浏览器引擎配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct BrowserConfig {
    /// 为 false 时使用无浏览器的段落重排回退路径
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 是否以无头模式 (Headless) 运行
    #[serde(default = "default_true")]
    pub headless: bool,
    /// 自定义可执行文件路径
    pub chrome_path: Option<String>,
    /// 等待内容根节点可见的超时 (秒)
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,
}

/// 调度引擎参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SpiderConfig {
    /// 并行采集的卷数上限
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// 每个主机的空闲连接池上限
    #[serde(default = "default_pool_size")]
    pub pool_max_idle_per_host: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// 站点配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SiteConfig {
    /// 站点域名 (镜像站点可覆盖)
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 仅保留文本，丢弃插图
    #[serde(default)]
    pub text_only: bool,
}

/// 字体轮廓文件路径
#[derive(Debug, Deserialize, Builder, Clone, Default)]
pub struct FontConfig {
    /// 站点下发的混淆字体 (`read`)
    pub obfuscated: Option<PathBuf>,
    /// 用于比对轮廓的参考字体
    pub reference: Option<PathBuf>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            headless: true,
            chrome_path: None,
            render_timeout_secs: default_render_timeout(),
        }
    }
}

impl Default for SpiderConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            pool_max_idle_per_host: default_pool_size(),
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            text_only: false,
        }
    }
}

fn default_output_path() -> String {
    "novels".to_string()
}
fn default_true() -> bool {
    true
}
fn default_render_timeout() -> u64 {
    10
}
fn default_concurrency() -> usize {
    3
}
fn default_pool_size() -> usize {
    50
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_timeout() -> u64 {
    30
}
fn default_base_url() -> String {
    "https://www.bilinovel.com".to_string()
}

impl AppConfig {
    /// 从工作目录下的 `config.toml` 及环境变量加载配置
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("config.toml"))
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(Environment::with_prefix("SPIDER").separator("__"))
            .build()
            .map_err(SpiderError::Config)?;
        settings.try_deserialize().map_err(SpiderError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_missing_file() {
        let cfg = AppConfig::load_from(Path::new("definitely-missing-config.toml")).unwrap();
        assert_eq!(cfg.output_path, "novels");
        assert_eq!(cfg.spider.concurrency, 3);
        assert_eq!(cfg.spider.pool_max_idle_per_host, 50);
        assert_eq!(cfg.browser.render_timeout_secs, 10);
        assert!(cfg.browser.enabled);
        assert!(cfg.browser.headless);
        assert_eq!(cfg.site.base_url, "https://www.bilinovel.com");
        assert!(cfg.fonts.obfuscated.is_none());
    }

    #[test]
    fn test_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
output_path = "out"

[spider]
concurrency = 7

[browser]
enabled = false

[fonts]
obfuscated = "fonts/read.ttf"
reference = "fonts/MI LANTING.ttf"
"#,
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.output_path, "out");
        assert_eq!(cfg.spider.concurrency, 7);
        assert_eq!(cfg.spider.timeout_secs, 30);
        assert!(!cfg.browser.enabled);
        assert_eq!(
            cfg.fonts.reference.as_deref(),
            Some(Path::new("fonts/MI LANTING.ttf"))
        );
    }

    #[test]
    fn test_builder_defaults() {
        let cfg = AppConfig::builder().output_path("tmp".into()).build();
        assert_eq!(cfg.output_path, "tmp");
        assert_eq!(cfg.spider.concurrency, 3);
        assert!(!cfg.site.text_only);
    }
}
