//! 终端进度渲染引擎 (Terminal UI Progress Engine)
//!
//! 基于 `indicatif` 实现非阻塞式进度条编排：任务状态、卷进度与章节进度。

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::event::{EventReceiver, SpiderEvent};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
#[derive(Default)]
pub struct UiState {
    /// 全局任务主状态条
    main_bar: Option<ProgressBar>,
    /// 卷进度条 (整本下载时)
    volume_bar: Option<ProgressBar>,
    /// 章节进度条，总数随卷开始逐步累加
    chapter_bar: Option<ProgressBar>,
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::default())))
}

fn bar_style(color: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.{color}}} [{{bar:40.{color}/blue}}] {{pos}}/{{len}} {{msg}}"
        ))
        .unwrap()
        .progress_chars("█▉▊▋▌▍▎▏  ")
}

/// 进度协调器 (Progress Orchestrator)
pub struct Ui;

impl Ui {
    /// 激活事件监听循环，发送端全部释放后退出
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    /// 执行 UI 状态转换与渲染更新
    fn handle_event(event: SpiderEvent) {
        let multi = get_multi();
        let state = get_state();
        let mut ui = state.write();

        match event {
            SpiderEvent::TaskStarted { title, .. } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_message(format!("📚 {}", title));
                bar.enable_steady_tick(Duration::from_millis(100));
                ui.main_bar = Some(bar);
            }
            SpiderEvent::VolumesDiscovered { total } => {
                let bar = multi.add(ProgressBar::new(total as u64));
                bar.set_style(bar_style("magenta"));
                bar.set_message("卷");
                ui.volume_bar = Some(bar);
            }
            SpiderEvent::VolumeStarted {
                title, chapters, ..
            } => {
                let bar = ui.chapter_bar.get_or_insert_with(|| {
                    let bar = multi.add(ProgressBar::new(0));
                    bar.set_style(bar_style("cyan"));
                    bar
                });
                bar.inc_length(chapters as u64);
                if let Some(ref main) = ui.main_bar {
                    main.set_message(format!("📖 {}", truncate_string(&title, 30)));
                }
            }
            SpiderEvent::ChapterCompleted { title, .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.inc(1);
                    bar.set_message(truncate_string(&title, 30));
                }
            }
            SpiderEvent::VolumeCompleted { .. } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.inc(1);
                }
            }
            SpiderEvent::VolumeFailed { volume_id, error } => {
                if let Some(ref bar) = ui.volume_bar {
                    bar.inc(1);
                }
                let _ = multi.println(format!("⚠️ 卷 {} 已跳过: {}", volume_id, error));
            }
            SpiderEvent::PackGenerated { path } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("📦 {}", path));
                }
            }
            SpiderEvent::TaskCompleted { .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.finish_with_message("✅ DOWNLOADED");
                }
                if let Some(ref bar) = ui.volume_bar {
                    bar.finish();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.finish_with_message("✅ TASK FINISHED");
                }
            }
            SpiderEvent::TaskFailed { error } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.abandon_with_message(format!("❌ FAILED: {}", error));
                }
            }
        }
    }
}

/// 执行语义化字符串截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}
