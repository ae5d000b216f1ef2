//! 引擎运行时上下文 (Runtime Context)
//!
//! 一轮并发抓取中所有 worker 共享的只读资源。

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use super::fetcher::ChapterFetcher;

/// 任务执行运行时上下文
pub struct RuntimeContext {
    /// 章节抓取器
    pub fetcher: Arc<ChapterFetcher>,
    /// 并发控制信号量 (Throttling)
    pub semaphore: Arc<Semaphore>,
    /// 取消信号
    pub cancel: CancellationToken,
}

impl RuntimeContext {
    pub fn new(fetcher: Arc<ChapterFetcher>, workers: usize, cancel: CancellationToken) -> Self {
        Self {
            fetcher,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            cancel,
        }
    }
}
