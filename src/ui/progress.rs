//! 终端进度渲染 (Terminal UI Progress)
//!
//! 基于 `indicatif` 的非阻塞进度条，消费引擎发出的 [`DownloadEvent`]。

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::event::{DownloadEvent, EventReceiver};

/// 全局 TUI 容器 (Singleton)
static MULTI: OnceLock<MultiProgress> = OnceLock::new();

/// 获取全局进度容器实例
pub fn get_multi() -> &'static MultiProgress {
    MULTI.get_or_init(MultiProgress::new)
}

/// TUI 状态容器
#[derive(Default)]
pub struct UiState {
    /// 任务主状态条
    main_bar: Option<ProgressBar>,
    /// 章节进度条
    chapter_bar: Option<ProgressBar>,
}

static STATE: OnceLock<Arc<RwLock<UiState>>> = OnceLock::new();

fn get_state() -> &'static Arc<RwLock<UiState>> {
    STATE.get_or_init(|| Arc::new(RwLock::new(UiState::default())))
}

/// 进度协调器
pub struct Ui;

impl Ui {
    /// 启动事件监听循环，发送端全部关闭后退出
    pub fn run(receiver: EventReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = receiver.recv_async().await {
                Self::handle_event(event);
            }
        })
    }

    fn handle_event(event: DownloadEvent) {
        let multi = get_multi();
        let state = get_state();
        let mut ui = state.write();

        match event {
            DownloadEvent::TaskStarted { title, book_id } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style);
                bar.set_message(format!("📚 {} ({})", title, book_id));
                bar.enable_steady_tick(Duration::from_millis(100));
                ui.main_bar = Some(bar);
            }
            DownloadEvent::ChaptersDiscovered { total, pending } => {
                let style = ProgressStyle::default_bar()
                    .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  ");

                let bar = multi.add(ProgressBar::new(total as u64));
                bar.set_style(style);
                bar.set_position(total.saturating_sub(pending) as u64);
                ui.chapter_bar = Some(bar);
            }
            DownloadEvent::BatchProgress {
                batch,
                batches,
                succeeded,
            } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("📦 批量 {}/{}: 成功 {} 章", batch, batches, succeeded));
                }
            }
            DownloadEvent::RoundStarted {
                round,
                rounds,
                pending,
            } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("🔁 第 {}/{} 轮，待下载 {} 章", round, rounds, pending));
                }
            }
            DownloadEvent::ChapterCompleted { title, .. } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.inc(1);
                    bar.set_message(truncate_string(&title, 30));
                }
            }
            DownloadEvent::RoundFinished {
                round, remaining, ..
            } => {
                if remaining > 0
                    && let Some(ref bar) = ui.main_bar
                {
                    bar.set_message(format!("⚠️ 第 {} 轮结束，仍缺 {} 章", round, remaining));
                }
            }
            DownloadEvent::OutputWritten { path } => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message(format!("📖 已写出 {}", path));
                }
            }
            DownloadEvent::Interrupted => {
                if let Some(ref bar) = ui.main_bar {
                    bar.set_message("⏹ 已中断，正在保存进度...");
                }
            }
            DownloadEvent::TaskCompleted { summary } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.finish_and_clear();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.finish_with_message(format!("✅ {}", summary));
                }
            }
            DownloadEvent::TaskFailed { error } => {
                if let Some(ref bar) = ui.chapter_bar {
                    bar.abandon();
                }
                if let Some(ref bar) = ui.main_bar {
                    bar.abandon_with_message(format!("❌ {}", error));
                }
            }
            DownloadEvent::ChapterFailed { .. } | DownloadEvent::ProgressSaved { .. } => {}
        }
    }
}

/// 按字符截断
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
