//! 事件系统定义
//!
//! 用于 Engine 与 UI 之间的完全解耦通信，也是下载进度的回调接口。

use flume::{Receiver, Sender};

/// 下载事件类型
#[derive(Debug, Clone)]
pub enum DownloadEvent {
    /// 任务开始
    TaskStarted { book_id: String, title: String },

    /// 发现章节总数
    ChaptersDiscovered { total: usize, pending: usize },

    /// 批量接口进度
    BatchProgress {
        batch: usize,
        batches: usize,
        succeeded: usize,
    },

    /// 新一轮单章下载开始
    RoundStarted {
        round: u32,
        rounds: u32,
        pending: usize,
    },

    /// 章节下载完成
    ChapterCompleted { index: usize, title: String },

    /// 章节本轮下载失败
    ChapterFailed { index: usize, title: String },

    /// 本轮结束
    RoundFinished {
        round: u32,
        succeeded: usize,
        remaining: usize,
    },

    /// 进度已落盘
    ProgressSaved { saved: usize },

    /// 成品已写出
    OutputWritten { path: String },

    /// 收到取消信号
    Interrupted,

    /// 任务完成 (含部分缺失)
    TaskCompleted { summary: String },

    /// 任务失败
    TaskFailed { error: String },
}

/// 事件发送器
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<DownloadEvent>,
}

impl EventSender {
    pub fn new(tx: Sender<DownloadEvent>) -> Self {
        Self { tx }
    }

    /// 发送事件
    pub fn emit(&self, event: DownloadEvent) {
        let _ = self.tx.send(event);
    }

    /// 发送章节完成事件
    pub fn chapter_completed(&self, index: usize, title: &str) {
        self.emit(DownloadEvent::ChapterCompleted {
            index,
            title: title.to_string(),
        });
    }

    /// 发送章节失败事件
    pub fn chapter_failed(&self, index: usize, title: &str) {
        self.emit(DownloadEvent::ChapterFailed {
            index,
            title: title.to_string(),
        });
    }
}

/// 事件接收器
pub struct EventReceiver {
    rx: Receiver<DownloadEvent>,
}

impl EventReceiver {
    pub fn new(rx: Receiver<DownloadEvent>) -> Self {
        Self { rx }
    }

    /// 非阻塞接收事件
    pub fn try_recv(&self) -> Option<DownloadEvent> {
        self.rx.try_recv().ok()
    }

    /// 异步接收事件
    pub async fn recv_async(&self) -> Option<DownloadEvent> {
        self.rx.recv_async().await.ok()
    }
}

/// 创建事件通道
pub fn create_event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = flume::unbounded();
    (EventSender::new(tx), EventReceiver::new(rx))
}
