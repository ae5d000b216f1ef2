//! 内容源定义
//!
//! 每种适配器变体 (请求形态 + 响应信封) 实现 [`ContentSource`]；
//! Fetcher 只根据 [`FetchOutcome`] 的取值决定是否切换到下一个源。

use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::error::Result;

/// 内容源返回的原始章节 (尚未规范化)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawChapter {
    pub title: String,
    pub content: String,
}

impl RawChapter {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }
}

/// 单次抓取的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// 取得非空正文
    Found(RawChapter),
    /// 该源失败 (传输错误、非 2xx、信封异常、正文为空)，应尝试下一个源
    Failed(String),
}

impl FetchOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        FetchOutcome::Failed(reason.into())
    }

    /// 空正文视为失败
    pub fn from_content(title: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        if content.trim().is_empty() {
            FetchOutcome::failed("empty content")
        } else {
            FetchOutcome::Found(RawChapter::new(title, content))
        }
    }
}

/// 单章内容源 Trait
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// 适配器名称 (用于日志)
    fn name(&self) -> &str;

    /// 抓取单章
    async fn fetch(&self, chapter_id: &str) -> FetchOutcome;
}

/// 批量内容源 Trait
///
/// 返回的映射中缺失的 id 视为该章失败。整个请求失败时返回 `Err`，由调用方把整批章节移入失败集合。
#[async_trait]
pub trait BatchSource: Send + Sync {
    fn name(&self) -> &str;

    /// 单次请求允许的最大章节数
    fn max_batch_size(&self) -> usize;

    async fn fetch_batch(&self, chapter_ids: &[String]) -> Result<HashMap<String, RawChapter>>;
}
