//! 任务单元定义

use std::sync::Arc;

use tracing::debug;

use crate::core::model::{Chapter, ChapterResult};

use super::context::RuntimeContext;

/// 单章任务的结果，作为消息交还给协调者
#[derive(Debug)]
pub enum TaskOutcome {
    Fetched {
        chapter_id: String,
        result: ChapterResult,
    },
    Failed(Chapter),
    /// 取消后未执行
    Skipped,
}

/// 单章下载任务
#[derive(Debug, Clone)]
pub struct ChapterTask {
    chapter: Chapter,
}

impl std::fmt::Display for ChapterTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "下载章节 {} - {}", self.chapter.index, self.chapter.title)
    }
}

impl ChapterTask {
    pub fn new(chapter: Chapter) -> Self {
        Self { chapter }
    }

    /// 执行任务
    pub async fn run(self, ctx: Arc<RuntimeContext>) -> TaskOutcome {
        let Ok(_permit) = ctx.semaphore.acquire().await else {
            return TaskOutcome::Skipped;
        };

        if ctx.cancel.is_cancelled() {
            debug!("已取消，跳过: {}", self);
            return TaskOutcome::Skipped;
        }

        match ctx.fetcher.fetch(&self.chapter.id).await {
            Some(raw) => TaskOutcome::Fetched {
                result: ChapterResult::new(&self.chapter, raw.title, raw.content),
                chapter_id: self.chapter.id,
            },
            None => TaskOutcome::Failed(self.chapter),
        }
    }
}
