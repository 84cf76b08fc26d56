//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、遥测层初始化、依赖注入及系统生命周期管理。

mod core;
mod engine;
mod interfaces;
mod network;
mod sites;
mod ui;
mod utils;

use std::io;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::config::AppConfig;
use crate::core::event::create_event_channel;
use crate::engine::{OutputType, ScrapeEngine};
use crate::interfaces::{RenderBackend, Site};
use crate::network::browser::{BrowserService, DEFAULT_UA};
use crate::network::context::ServiceContext;
use crate::network::service::HttpService;
use crate::network::session::Session;
use crate::sites::SiteRegistry;
use crate::sites::bilinovel::StaticBackend;
use crate::ui::{Ui, get_multi};

const SITE_ID: &str = "bilinovel";

/// 进度条感知的日志写入器 (TUI-aware Log Writer)
///
/// 确保非同步日志输出不会破坏终端进度条的渲染布局。
struct IndicatifWriter;

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let _ = get_multi().println(s.trim_end());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&self) -> Self::Writer {
        IndicatifWriter
    }
}

/// 命令行界面脚手架 (CLI Scaffolding)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 下载整本小说或单卷
    Download {
        /// 小说 ID
        #[arg(short, long)]
        novel_id: u64,
        /// 卷 ID (省略时下载整本)
        #[arg(short, long)]
        volume_id: Option<u64>,
        /// 缓存与产物输出目录
        #[arg(short, long)]
        output_path: Option<String>,
        /// 打包格式: epub | text
        #[arg(short = 't', long, default_value_t = OutputType::Epub)]
        output_type: OutputType,
        /// 并行采集的卷数
        #[arg(long)]
        concurrency: Option<usize>,
        /// 是否以无头模式运行浏览器
        #[arg(long)]
        headless: Option<bool>,
        /// 仅保留文本，丢弃插图
        #[arg(long)]
        text_only: bool,
        /// 输出调试日志
        #[arg(long)]
        debug: bool,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Download {
            novel_id,
            volume_id,
            output_path,
            output_type,
            concurrency,
            headless,
            text_only,
            debug,
        } => {
            init_tracing(debug);

            // 命令行参数覆盖配置文件
            let mut config = AppConfig::load()?;
            if let Some(path) = output_path {
                config.output_path = path;
            }
            if let Some(n) = concurrency {
                config.spider.concurrency = n;
            }
            if let Some(h) = headless {
                config.browser.headless = h;
            }
            config.site.text_only |= text_only;
            let config = Arc::new(config);

            // 建立 UI 事件反馈链路 (Event feedback loop)
            let (event_sender, event_receiver) = create_event_channel();
            let ui_handle = Ui::run(event_receiver);

            // 任务域限制，确保事件发送端在等待 UI 前全部释放
            let outcome = {
                let session = Arc::new(Session::new());
                session.set_ua(DEFAULT_UA.into());
                let http = Arc::new(HttpService::new(&config, session)?);

                let renderer: Arc<dyn RenderBackend> = if config.browser.enabled {
                    Arc::new(BrowserService::new(config.clone()))
                } else {
                    tracing::warn!("浏览器已禁用，使用无浏览器回退渲染 (隐藏诱饵节点不会被移除)");
                    Arc::new(StaticBackend::new())
                };

                let ctx = ServiceContext::new(http, renderer, config.clone())
                    .with_events(event_sender.clone());

                let registry = SiteRegistry::new();
                let site: Arc<dyn Site> = match registry.create(SITE_ID, ctx) {
                    Some(site) => site?,
                    None => anyhow::bail!(
                        "Unknown site identifier: {} (available: {:?})",
                        SITE_ID,
                        registry.list()
                    ),
                };

                let engine = ScrapeEngine::new(site.clone(), &config.output_path, output_type)
                    .with_events(Some(event_sender));

                // 信号处理与优雅退出 (Signal Handling)
                let outcome = tokio::select! {
                    result = engine.run(novel_id, volume_id) => result.map(|_| ()),
                    _ = tokio::signal::ctrl_c() => {
                        tracing::warn!("收到中断信号，正在退出...");
                        Ok(())
                    }
                };

                if let Err(e) = site.close().await {
                    tracing::warn!("资源释放失败: {}", e);
                }
                tracing::info!("Execution flow completed for novel: {}", novel_id);
                outcome
            };

            // Await UI shutdown after event sender closure
            let _ = ui_handle.await;
            outcome?;
        }
    }

    Ok(())
}
