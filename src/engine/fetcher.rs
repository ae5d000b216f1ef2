//! 章节抓取器 (Chapter Fetcher)
//!
//! 按注册表顺序依次尝试内容源，第一个给出非空正文的源胜出；
//! 注册表为空时使用内置回退源。

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::debug;

use crate::interfaces::{ContentSource, FetchOutcome, RawChapter};
use crate::sources::normalizer::normalize;

pub struct ChapterFetcher {
    sources: Vec<Arc<dyn ContentSource>>,
    fallback: Arc<dyn ContentSource>,
    jitter: (Duration, Duration),
}

impl ChapterFetcher {
    pub fn new(
        sources: Vec<Arc<dyn ContentSource>>,
        fallback: Arc<dyn ContentSource>,
        jitter: (Duration, Duration),
    ) -> Self {
        Self {
            sources,
            fallback,
            jitter,
        }
    }

    fn candidates(&self) -> &[Arc<dyn ContentSource>] {
        if self.sources.is_empty() {
            std::slice::from_ref(&self.fallback)
        } else {
            &self.sources
        }
    }

    /// 抓取并规范化单章，所有源都失败时返回 None
    pub async fn fetch(&self, chapter_id: &str) -> Option<RawChapter> {
        for source in self.candidates() {
            self.pause().await;

            match source.fetch(chapter_id).await {
                FetchOutcome::Found(raw) => {
                    let content = normalize(&raw.content);
                    if content.is_empty() {
                        debug!("[{}] 章节 {} 规范化后为空，切换下一个源", source.name(), chapter_id);
                        continue;
                    }
                    return Some(RawChapter::new(raw.title.trim(), content));
                }
                FetchOutcome::Failed(reason) => {
                    debug!("[{}] 章节 {} 失败: {}，切换下一个源", source.name(), chapter_id, reason);
                }
            }
        }

        debug!("章节 {} 所有内容源均失败", chapter_id);
        None
    }

    /// 请求前的随机抖动，错开各 worker 的请求节奏
    async fn pause(&self) {
        let (min, max) = self.jitter;
        if max.is_zero() {
            return;
        }
        let millis = {
            let (lo, hi) = (min.as_millis() as u64, max.as_millis() as u64);
            if hi > lo {
                rand::rng().random_range(lo..=hi)
            } else {
                hi
            }
        };
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;

    /// 记录调用顺序的内容源
    struct Scripted {
        name: String,
        outcome: FetchOutcome,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ContentSource for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch(&self, _chapter_id: &str) -> FetchOutcome {
            self.log.lock().push(self.name.clone());
            self.outcome.clone()
        }
    }

    fn scripted(name: &str, outcome: FetchOutcome, log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn ContentSource> {
        Arc::new(Scripted {
            name: name.into(),
            outcome,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn tries_sources_in_order_until_content() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sources = vec![
            scripted("one", FetchOutcome::failed("malformed json"), &log),
            scripted("two", FetchOutcome::from_content("", "   "), &log),
            scripted("three", FetchOutcome::Found(RawChapter::new("题", "<p idx=\"1\">正文</p>")), &log),
            scripted("four", FetchOutcome::Found(RawChapter::new("", "不应使用")), &log),
        ];
        let fallback = scripted("fallback", FetchOutcome::failed("unused"), &log);

        let fetcher = ChapterFetcher::new(sources, fallback, (Duration::ZERO, Duration::ZERO));
        let raw = fetcher.fetch("1").await.unwrap();

        assert_eq!(raw, RawChapter::new("题", "    正文"));
        assert_eq!(*log.lock(), ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn skips_content_that_normalizes_to_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sources = vec![
            scripted("tags", FetchOutcome::Found(RawChapter::new("", "<br/><div></div>")), &log),
            scripted("text", FetchOutcome::Found(RawChapter::new("", "正文")), &log),
        ];
        let fallback = scripted("fallback", FetchOutcome::failed("unused"), &log);

        let fetcher = ChapterFetcher::new(sources, fallback, (Duration::ZERO, Duration::ZERO));
        assert_eq!(fetcher.fetch("1").await.unwrap().content, "    正文");
        assert_eq!(*log.lock(), ["tags", "text"]);
    }

    #[tokio::test]
    async fn empty_registry_uses_fallback_only() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let fallback = scripted("fallback", FetchOutcome::failed("down"), &log);

        let fetcher = ChapterFetcher::new(Vec::new(), fallback, (Duration::ZERO, Duration::ZERO));
        assert!(fetcher.fetch("1").await.is_none());
        assert_eq!(*log.lock(), ["fallback"]);
    }

    #[tokio::test]
    async fn fallback_is_ignored_when_sources_exist() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sources = vec![scripted("only", FetchOutcome::failed("down"), &log)];
        let fallback = scripted("fallback", FetchOutcome::Found(RawChapter::new("", "x")), &log);

        let fetcher = ChapterFetcher::new(sources, fallback, (Duration::from_millis(1), Duration::from_millis(2)));
        assert!(fetcher.fetch("1").await.is_none());
        assert_eq!(*log.lock(), ["only"]);
    }
}
