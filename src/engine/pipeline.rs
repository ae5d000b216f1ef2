//! 下载引擎调度器
//!
//! 负责协调任务的生命周期：解析目录 -> 加载进度 -> (批量抓取) -> 多轮并发抓取 -> 输出。
//! 结果以 sequence index 为键汇总在协调者手中，worker 之间不共享可变状态；
//! 进度文件只由协调者写入。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use bon::Builder;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::DownloaderConfig;
use crate::core::error::{DownloadError, Result};
use crate::core::event::{DownloadEvent, EventSender};
use crate::core::model::{Chapter, ChapterResult, Cover, Manuscript, Metadata, OutputFormat};
use crate::core::output::write_output;
use crate::core::store::{ProgressStore, StoredChapter};
use crate::interfaces::{BatchSource, Indexer};
use crate::sources::normalizer::normalize;

use super::context::RuntimeContext;
use super::fetcher::ChapterFetcher;
use super::task::{ChapterTask, TaskOutcome};

/// 单次下载任务参数
#[derive(Debug, Clone, Builder)]
pub struct DownloadRequest {
    #[builder(into)]
    pub book_id: String,
    #[builder(default)]
    pub format: OutputFormat,
    #[builder(into)]
    pub output_dir: PathBuf,
    /// 起始章节 (从 1 开始，含)
    pub start: Option<usize>,
    /// 结束章节 (含)
    pub end: Option<usize>,
}

impl DownloadRequest {
    /// 截取章节范围，越界时收敛到有效区间；sequence index 保持不变
    fn select(&self, chapters: &[Chapter]) -> Vec<Chapter> {
        let len = chapters.len();
        let start = self.start.unwrap_or(1).max(1);
        let end = self.end.unwrap_or(len).min(len);
        if start > end {
            return Vec::new();
        }
        chapters[start - 1..end].to_vec()
    }
}

/// 任务最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Success,
    SuccessWithOmissions,
    Failure,
}

/// 任务报告
#[derive(Debug, Clone)]
pub struct JobReport {
    pub status: JobStatus,
    pub total: usize,
    pub succeeded: usize,
    pub output: Option<PathBuf>,
    pub interrupted: bool,
}

impl JobReport {
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.succeeded)
    }

    pub fn is_failure(&self) -> bool {
        self.status == JobStatus::Failure
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.status {
            JobStatus::Success => "下载完成",
            JobStatus::SuccessWithOmissions => "部分完成",
            JobStatus::Failure => "下载失败",
        };
        write!(f, "{}: 成功 {}/{} 章", label, self.succeeded, self.total)?;
        if self.failed() > 0 {
            write!(f, "，缺失 {} 章", self.failed())?;
        }
        if self.interrupted {
            write!(f, " (已中断)")?;
        }
        if let Some(path) = &self.output {
            write!(f, "，文件: {}", path.display())?;
        }
        Ok(())
    }
}

/// 协调者持有的任务状态
///
/// `chapters` 是整本书的目录，`selected` 是本次要下载的范围；
/// 已保存的章节无论是否在范围内都进入 `results` 并参与成品渲染。
struct JobState {
    chapters: Vec<Chapter>,
    selected: Vec<Chapter>,
    results: BTreeMap<usize, ChapterResult>,
    persisted: BTreeSet<String>,
    /// 已抓取但尚未落盘的正文
    unsaved: Vec<StoredChapter>,
    /// 成品是否落后于 results
    dirty: bool,
    artifact: Option<PathBuf>,
    interrupted: bool,
}

impl JobState {
    fn record(&mut self, chapter_id: String, result: ChapterResult) {
        self.unsaved.push(StoredChapter {
            id: chapter_id,
            api_title: result.api_title.clone(),
            content: result.content.clone(),
        });
        self.results.insert(result.index, result);
        self.dirty = true;
    }

    /// 范围内尚无结果的章节，保持 sequence index 顺序
    fn pending(&self) -> Vec<Chapter> {
        self.selected
            .iter()
            .filter(|c| !self.results.contains_key(&c.index))
            .cloned()
            .collect()
    }

    /// 范围内已有结果的章节数
    fn selected_done(&self) -> usize {
        self.selected
            .iter()
            .filter(|c| self.results.contains_key(&c.index))
            .count()
    }

    /// 整本书是否都已下载
    fn book_complete(&self) -> bool {
        self.chapters.iter().all(|c| self.results.contains_key(&c.index))
    }
}

/// 成品相关的只读信息
struct OutputTarget<'a> {
    request: &'a DownloadRequest,
    metadata: Metadata,
    cover: Option<Cover>,
    store: ProgressStore,
}

/// 下载引擎
pub struct DownloadEngine {
    indexer: Arc<dyn Indexer>,
    fetcher: Arc<ChapterFetcher>,
    batch: Option<Arc<dyn BatchSource>>,
    settings: DownloaderConfig,
    events: Option<EventSender>,
    cancel: CancellationToken,
}

impl DownloadEngine {
    pub fn new(
        indexer: Arc<dyn Indexer>,
        fetcher: Arc<ChapterFetcher>,
        batch: Option<Arc<dyn BatchSource>>,
        settings: DownloaderConfig,
    ) -> Self {
        Self {
            indexer,
            fetcher,
            batch,
            settings,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn emit(&self, event: DownloadEvent) {
        if let Some(ref sender) = self.events {
            sender.emit(event);
        }
    }

    /// 执行下载流程
    ///
    /// 只有章节目录解析失败会返回 `Err`；全部章节失败以 [`JobStatus::Failure`] 报告。
    pub async fn run(&self, request: &DownloadRequest) -> Result<JobReport> {
        // 1. 解析目录
        let (chapters, selected) = match self.resolve(request).await {
            Ok(c) => c,
            Err(e) => {
                self.fail_task(e.to_string());
                return Err(e);
            }
        };

        let (metadata, cover) = self.describe(request).await;
        self.emit(DownloadEvent::TaskStarted {
            book_id: request.book_id.clone(),
            title: metadata.title.clone(),
        });

        let target = OutputTarget {
            request,
            metadata,
            cover,
            store: ProgressStore::new(&request.output_dir, &request.book_id),
        };

        // 2. 加载进度
        let mut state = self.load_progress(&target.store, chapters, selected).await;
        let todo = state.pending();
        self.emit(DownloadEvent::ChaptersDiscovered {
            total: state.selected.len(),
            pending: todo.len(),
        });
        info!(
            "开始下载：《{}》, 总章节数: {}, 本次范围: {}, 待下载: {}",
            target.metadata.title,
            state.chapters.len(),
            state.selected.len(),
            todo.len()
        );

        if todo.is_empty() {
            info!("所有章节已是最新，无需下载");
        } else {
            // 3. 批量抓取
            if let Some(batch) = &self.batch
                && !self.cancel.is_cancelled()
            {
                self.batch_phase(batch.as_ref(), &mut state, &target, &todo).await?;
                self.persist(&mut state, &target).await?;
            }

            // 4. 多轮并发抓取
            self.round_phase(&mut state, &target).await?;
        }

        // 5. 收尾
        self.finalize(state, &target).await
    }

    /// 返回整本书的目录以及本次范围
    async fn resolve(&self, request: &DownloadRequest) -> Result<(Vec<Chapter>, Vec<Chapter>)> {
        debug!("正在获取章节列表...");
        let chapters = self.indexer.fetch_chapters(&request.book_id).await?;
        if chapters.is_empty() {
            return Err(DownloadError::NoChapters(
                "未找到任何章节，请检查小说ID是否正确".into(),
            ));
        }

        let selected = request.select(&chapters);
        if selected.is_empty() {
            return Err(DownloadError::NoChapters("章节范围为空".into()));
        }
        Ok((chapters, selected))
    }

    /// 元数据失败不影响下载
    async fn describe(&self, request: &DownloadRequest) -> (Metadata, Option<Cover>) {
        let metadata = match self.indexer.fetch_metadata(&request.book_id).await {
            Ok(m) => m,
            Err(e) => {
                warn!("获取书籍信息失败，使用占位信息: {}", e);
                Metadata::placeholder(&request.book_id)
            }
        };

        let cover = if request.format == OutputFormat::Epub {
            self.indexer.fetch_cover(&metadata).await
        } else {
            None
        };

        (metadata, cover)
    }

    async fn load_progress(
        &self,
        store: &ProgressStore,
        chapters: Vec<Chapter>,
        selected: Vec<Chapter>,
    ) -> JobState {
        let progress = store.load().await;

        let results: BTreeMap<usize, ChapterResult> = chapters
            .iter()
            .filter_map(|chapter| {
                let stored = progress.chapters.get(&chapter.id)?;
                Some((
                    chapter.index,
                    ChapterResult::new(chapter, stored.api_title.clone(), stored.content.clone()),
                ))
            })
            .collect();

        if !progress.is_empty() {
            info!("已加载进度: {} 个章节已下载", results.len());
        }

        JobState {
            chapters,
            selected,
            results,
            persisted: progress.ids(),
            unsaved: Vec::new(),
            dirty: false,
            artifact: None,
            interrupted: false,
        }
    }

    /// 批量阶段：整批失败或缺失的章节留给单章轮次
    async fn batch_phase(
        &self,
        batch: &dyn BatchSource,
        state: &mut JobState,
        target: &OutputTarget<'_>,
        todo: &[Chapter],
    ) -> Result<()> {
        info!("正在使用 {} 批量接口下载，响应慢是正常现象", batch.name());
        let size = batch.max_batch_size().max(1);
        let batches = todo.len().div_ceil(size);

        for (i, chunk) in todo.chunks(size).enumerate() {
            let ids: Vec<String> = chunk.iter().map(|c| c.id.clone()).collect();

            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    state.interrupted = true;
                    break;
                }
                fetched = batch.fetch_batch(&ids) => fetched,
            };

            let mut succeeded = 0;
            match fetched {
                Ok(map) => {
                    for chapter in chunk {
                        let content = map.get(&chapter.id).map(|raw| (raw, normalize(&raw.content)));
                        match content {
                            Some((raw, content)) if !content.is_empty() => {
                                self.chapter_completed(chapter);
                                state.record(
                                    chapter.id.clone(),
                                    ChapterResult::new(chapter, raw.title.trim(), content),
                                );
                                succeeded += 1;
                            }
                            _ => self.chapter_failed(chapter),
                        }
                    }
                }
                Err(e) => {
                    warn!("第 {}/{} 批下载失败，切换到单章下载: {}", i + 1, batches, e);
                }
            }

            self.emit(DownloadEvent::BatchProgress {
                batch: i + 1,
                batches,
                succeeded,
            });

            if succeeded > 0 {
                self.save_progress(state, target).await?;
            }
        }

        Ok(())
    }

    /// 单章轮次：每轮只处理上一轮失败的章节
    async fn round_phase(&self, state: &mut JobState, target: &OutputTarget<'_>) -> Result<()> {
        let rounds = self.settings.retry_rounds.max(1);

        for round in 1..=rounds {
            if state.interrupted {
                break;
            }
            if self.cancel.is_cancelled() {
                state.interrupted = true;
                break;
            }

            let pending = state.pending();
            if pending.is_empty() {
                break;
            }

            self.emit(DownloadEvent::RoundStarted {
                round,
                rounds,
                pending: pending.len(),
            });
            info!("第 {}/{} 轮: 待下载 {} 个章节", round, rounds, pending.len());

            let before = state.results.len();
            self.run_round(state, pending).await;
            let succeeded = state.results.len() - before;
            let remaining = state.pending().len();

            self.persist(state, target).await?;
            self.emit(DownloadEvent::RoundFinished {
                round,
                succeeded,
                remaining,
            });

            if remaining == 0 || state.interrupted {
                break;
            }

            if round < rounds {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => {
                        state.interrupted = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.settings.retry_delay()) => {}
                }
            }
        }

        Ok(())
    }

    /// 执行一轮并发抓取；取消后不再等待在途请求，但保留已完成的结果
    async fn run_round(&self, state: &mut JobState, pending: Vec<Chapter>) {
        let ctx = Arc::new(RuntimeContext::new(
            self.fetcher.clone(),
            self.settings.workers,
            self.cancel.clone(),
        ));

        let mut join_set = JoinSet::new();
        for chapter in pending {
            join_set.spawn(ChapterTask::new(chapter).run(ctx.clone()));
        }

        loop {
            let joined = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    state.interrupted = true;
                    break;
                }
                joined = join_set.join_next() => joined,
            };

            match joined {
                Some(res) => self.absorb(state, res),
                None => break,
            }
        }

        if state.interrupted {
            warn!("检测到中断，正在保存已下载内容...");
            while let Some(res) = join_set.try_join_next() {
                self.absorb(state, res);
            }
            join_set.detach_all();
        }
    }

    fn absorb(&self, state: &mut JobState, res: std::result::Result<TaskOutcome, JoinError>) {
        match res {
            Ok(TaskOutcome::Fetched { chapter_id, result }) => {
                self.emit(DownloadEvent::ChapterCompleted {
                    index: result.index,
                    title: result.base_title.clone(),
                });
                state.record(chapter_id, result);
            }
            Ok(TaskOutcome::Failed(chapter)) => self.chapter_failed(&chapter),
            Ok(TaskOutcome::Skipped) => {}
            Err(e) => error!("并发调度错误: {}", e),
        }
    }

    /// 落盘进度，并在结果有变化时重写成品
    async fn persist(&self, state: &mut JobState, target: &OutputTarget<'_>) -> Result<()> {
        self.save_progress(state, target).await?;
        if state.selected_done() > 0 && (state.dirty || state.artifact.is_none()) {
            self.write_artifact(state, target).await?;
        }
        Ok(())
    }

    async fn save_progress(&self, state: &mut JobState, target: &OutputTarget<'_>) -> Result<()> {
        if state.unsaved.is_empty() {
            return Ok(());
        }

        let new_chapters = std::mem::take(&mut state.unsaved);
        state
            .persisted
            .extend(new_chapters.iter().map(|c| c.id.clone()));
        target.store.save(&new_chapters, &state.persisted).await?;

        debug!("进度已保存: {} 个章节", state.persisted.len());
        self.emit(DownloadEvent::ProgressSaved {
            saved: state.persisted.len(),
        });
        Ok(())
    }

    async fn write_artifact(&self, state: &mut JobState, target: &OutputTarget<'_>) -> Result<()> {
        let manuscript = Manuscript {
            metadata: target.metadata.clone(),
            cover: target.cover.clone(),
            chapters: state.results.values().cloned().collect(),
        };

        let path = write_output(&manuscript, target.request.format, &target.request.output_dir).await?;
        self.emit(DownloadEvent::OutputWritten {
            path: path.display().to_string(),
        });

        state.artifact = Some(path);
        state.dirty = false;
        Ok(())
    }

    async fn finalize(&self, mut state: JobState, target: &OutputTarget<'_>) -> Result<JobReport> {
        if state.interrupted {
            self.emit(DownloadEvent::Interrupted);
        }

        let total = state.selected.len();
        let succeeded = state.selected_done();

        if succeeded == 0 {
            let report = JobReport {
                status: JobStatus::Failure,
                total,
                succeeded,
                output: None,
                interrupted: state.interrupted,
            };
            self.fail_task(report.to_string());
            return Ok(report);
        }

        self.persist(&mut state, target).await?;

        if state.book_complete() {
            target.store.clear().await?;
            debug!("已清理进度文件: {}", target.store.progress_file().display());
        } else {
            info!("进度文件已保留，可再次运行以续传缺失章节");
        }

        let status = if succeeded == total {
            JobStatus::Success
        } else {
            JobStatus::SuccessWithOmissions
        };

        let report = JobReport {
            status,
            total,
            succeeded,
            output: state.artifact.clone(),
            interrupted: state.interrupted,
        };
        info!("{}", report);
        self.emit(DownloadEvent::TaskCompleted {
            summary: report.to_string(),
        });
        Ok(report)
    }

    fn chapter_completed(&self, chapter: &Chapter) {
        if let Some(ref sender) = self.events {
            sender.chapter_completed(chapter.index, &chapter.title);
        }
    }

    fn chapter_failed(&self, chapter: &Chapter) {
        debug!("章节下载失败: {} ({})", chapter.title, chapter.id);
        if let Some(ref sender) = self.events {
            sender.chapter_failed(chapter.index, &chapter.title);
        }
    }

    fn fail_task(&self, error: String) {
        error!("任务执行失败: {}", error);
        self.emit(DownloadEvent::TaskFailed { error });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::Path;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::core::event::create_event_channel;
    use crate::interfaces::{ContentSource, FetchOutcome, RawChapter};

    struct MockIndexer {
        chapters: Vec<Chapter>,
    }

    #[async_trait]
    impl Indexer for MockIndexer {
        async fn fetch_metadata(&self, _book_id: &str) -> Result<Metadata> {
            Ok(Metadata {
                title: "测试书".into(),
                author: "测试作者".into(),
                description: "简介".into(),
                cover_url: None,
                language: "zh-CN".into(),
            })
        }

        async fn fetch_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
            if self.chapters.is_empty() {
                return Err(DownloadError::NoChapters(book_id.to_string()));
            }
            Ok(self.chapters.clone())
        }
    }

    /// 按 id 返回固定正文的内容源，可注入延迟与取消
    #[derive(Default)]
    struct MockSource {
        contents: HashMap<String, String>,
        delays: HashMap<String, Duration>,
        cancel_on: Option<(String, CancellationToken)>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn serving(ids: &[&str]) -> Self {
            Self {
                contents: ids
                    .iter()
                    .map(|id| (id.to_string(), format!("正文{}", id)))
                    .collect(),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl ContentSource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        async fn fetch(&self, chapter_id: &str) -> FetchOutcome {
            self.calls.lock().push(chapter_id.to_string());
            if let Some(delay) = self.delays.get(chapter_id) {
                tokio::time::sleep(*delay).await;
            }
            if let Some((id, token)) = &self.cancel_on
                && id == chapter_id
            {
                token.cancel();
            }
            match self.contents.get(chapter_id) {
                Some(content) => FetchOutcome::Found(RawChapter::new("", content.as_str())),
                None => FetchOutcome::failed("mock error"),
            }
        }
    }

    struct MockBatch {
        contents: HashMap<String, String>,
        fail: bool,
        size: usize,
        calls: Mutex<Vec<Vec<String>>>,
        /// 每次调用时记录该目录下进度文件中的 id
        observe: Option<PathBuf>,
        seen: Mutex<Vec<Option<Vec<String>>>>,
    }

    impl MockBatch {
        fn new(contents: &[(&str, &str)], fail: bool, size: usize) -> Self {
            Self {
                contents: contents
                    .iter()
                    .map(|(id, c)| (id.to_string(), c.to_string()))
                    .collect(),
                fail,
                size,
                calls: Mutex::new(Vec::new()),
                observe: None,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl BatchSource for MockBatch {
        fn name(&self) -> &str {
            "mock-batch"
        }

        fn max_batch_size(&self) -> usize {
            self.size
        }

        async fn fetch_batch(&self, chapter_ids: &[String]) -> Result<HashMap<String, RawChapter>> {
            self.calls.lock().push(chapter_ids.to_vec());
            if let Some(dir) = &self.observe {
                self.seen.lock().push(progress_ids(dir));
            }
            if self.fail {
                return Err(DownloadError::Status(502));
            }
            Ok(chapter_ids
                .iter()
                .filter_map(|id| {
                    self.contents
                        .get(id)
                        .map(|c| (id.clone(), RawChapter::new("", c.as_str())))
                })
                .collect())
        }
    }

    fn chapters(ids: &[&str]) -> Vec<Chapter> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| Chapter::new(i, *id, format!("第{}章", i + 1)))
            .collect()
    }

    fn settings(rounds: u32) -> DownloaderConfig {
        DownloaderConfig {
            workers: 3,
            retry_rounds: rounds,
            retry_delay_ms: 0,
            jitter_min_ms: 0,
            jitter_max_ms: 0,
            ..DownloaderConfig::default()
        }
    }

    fn engine(
        ids: &[&str],
        sources: Vec<Arc<dyn ContentSource>>,
        fallback: Arc<dyn ContentSource>,
        batch: Option<Arc<dyn BatchSource>>,
        rounds: u32,
    ) -> DownloadEngine {
        let fetcher = ChapterFetcher::new(sources, fallback, (Duration::ZERO, Duration::ZERO));
        DownloadEngine::new(
            Arc::new(MockIndexer {
                chapters: chapters(ids),
            }),
            Arc::new(fetcher),
            batch,
            settings(rounds),
        )
    }

    fn request(dir: &Path) -> DownloadRequest {
        DownloadRequest::builder().book_id("book").output_dir(dir).build()
    }

    fn unused() -> Arc<dyn ContentSource> {
        Arc::new(MockSource::default())
    }

    fn progress_ids(dir: &Path) -> Option<Vec<String>> {
        let store = ProgressStore::new(dir, "book");
        let text = std::fs::read_to_string(store.progress_file()).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn read_output(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("测试书.txt")).unwrap()
    }

    #[tokio::test]
    async fn empty_registry_falls_back_and_keeps_partial_progress() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = Arc::new(MockSource::serving(&["1", "3"]));

        let report = engine(&["1", "2", "3"], Vec::new(), fallback.clone(), None, 3)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::SuccessWithOmissions);
        assert_eq!((report.succeeded, report.total), (2, 3));
        assert_eq!(
            read_output(dir.path()),
            "小说名: 测试书\n作者: 测试作者\n内容简介: 简介\n\n第1章\n    正文1\n\n第3章\n    正文3\n\n"
        );
        assert_eq!(progress_ids(dir.path()).unwrap(), ["1", "3"]);

        let calls = fallback.calls();
        assert_eq!(calls.iter().filter(|id| *id == "2").count(), 3);
        assert_eq!(calls.iter().filter(|id| *id == "1").count(), 1);
    }

    #[tokio::test]
    async fn output_order_ignores_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let source = MockSource {
            delays: [
                ("1".to_string(), Duration::from_millis(60)),
                ("2".to_string(), Duration::from_millis(30)),
                ("3".to_string(), Duration::from_millis(1)),
            ]
            .into(),
            ..MockSource::serving(&["1", "2", "3"])
        };

        let (tx, rx) = create_event_channel();
        let report = engine(&["1", "2", "3"], vec![Arc::new(source)], unused(), None, 1)
            .with_events(tx)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        let text = read_output(dir.path());
        let positions: Vec<_> = ["正文1", "正文2", "正文3"]
            .iter()
            .map(|c| text.find(c).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));

        let mut completed = Vec::new();
        while let Some(event) = rx.try_recv() {
            if let DownloadEvent::ChapterCompleted { index, .. } = event {
                completed.push(index);
            }
        }
        assert_eq!(completed, [2, 1, 0]);
        assert!(progress_ids(dir.path()).is_none());
    }

    #[tokio::test]
    async fn resume_skips_persisted_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["1", "2", "3"];

        let first = engine(&ids, vec![Arc::new(MockSource::serving(&["1", "3"]))], unused(), None, 1)
            .run(&request(dir.path()))
            .await
            .unwrap();
        assert_eq!(first.status, JobStatus::SuccessWithOmissions);

        let second_source = Arc::new(MockSource::serving(&ids));
        let second = engine(&ids, vec![second_source.clone()], unused(), None, 1)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(second.status, JobStatus::Success);
        assert_eq!(second_source.calls(), ["2"]);
        assert!(progress_ids(dir.path()).is_none());

        let fresh = tempfile::tempdir().unwrap();
        engine(&ids, vec![Arc::new(MockSource::serving(&ids))], unused(), None, 1)
            .run(&request(fresh.path()))
            .await
            .unwrap();
        assert_eq!(read_output(dir.path()), read_output(fresh.path()));
    }

    #[tokio::test]
    async fn total_failure_writes_no_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::default());
        let fallback = Arc::new(MockSource::serving(&["1", "2"]));

        let report = engine(&["1", "2"], vec![source.clone()], fallback.clone(), None, 2)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Failure);
        assert!(report.output.is_none());
        assert!(!dir.path().join("测试书.txt").exists());
        assert_eq!(source.calls().len(), 4);
        assert!(fallback.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_omissions_demote_to_single_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Arc::new(MockBatch::new(&[("A", "甲"), ("C", "丙")], false, 290));
        let single = Arc::new(MockSource::default());

        let report = engine(&["A", "B", "C"], vec![single.clone()], unused(), Some(batch.clone()), 2)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::SuccessWithOmissions);
        assert_eq!(*batch.calls.lock(), [vec!["A".to_string(), "B".to_string(), "C".to_string()]]);
        assert_eq!(single.calls(), ["B", "B"]);
        assert_eq!(progress_ids(dir.path()).unwrap(), ["A", "C"]);
    }

    #[tokio::test]
    async fn failed_batch_chunks_fall_back_to_single_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Arc::new(MockBatch::new(&[], true, 2));
        let single = Arc::new(MockSource::serving(&["1", "2", "3"]));

        let report = engine(&["1", "2", "3"], vec![single.clone()], unused(), Some(batch.clone()), 1)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        assert_eq!(batch.calls.lock().len(), 2);
        assert_eq!(single.calls().len(), 3);
    }

    #[tokio::test]
    async fn each_batch_chunk_is_saved_before_the_next() {
        let dir = tempfile::tempdir().unwrap();
        let batch = Arc::new(MockBatch {
            observe: Some(dir.path().to_path_buf()),
            ..MockBatch::new(&[("1", "甲"), ("2", "乙"), ("3", "丙")], false, 1)
        });

        let report = engine(&["1", "2", "3"], Vec::new(), unused(), Some(batch.clone()), 1)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        assert_eq!(
            *batch.seen.lock(),
            [
                None,
                Some(vec!["1".to_string()]),
                Some(vec!["1".to_string(), "2".to_string()])
            ]
        );
        assert!(progress_ids(dir.path()).is_none());
    }

    #[tokio::test]
    async fn cancellation_keeps_completed_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancellationToken::new();
        let source = MockSource {
            delays: [("3".to_string(), Duration::from_secs(30))].into(),
            cancel_on: Some(("1".to_string(), cancel.clone())),
            ..MockSource::serving(&["1", "2", "3"])
        };

        let report = engine(&["1", "2", "3"], vec![Arc::new(source)], unused(), None, 3)
            .with_cancellation(cancel)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert!(report.interrupted);
        assert_eq!(report.status, JobStatus::SuccessWithOmissions);

        let saved = progress_ids(dir.path()).unwrap();
        assert!(saved.contains(&"1".to_string()));
        assert!(!saved.contains(&"3".to_string()));
        assert!(read_output(dir.path()).contains("正文1"));
    }

    #[tokio::test]
    async fn nothing_to_do_renders_stored_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path(), "book");
        let stored: Vec<StoredChapter> = ["1", "2"]
            .iter()
            .map(|id| StoredChapter {
                id: id.to_string(),
                api_title: String::new(),
                content: format!("    旧{}", id),
            })
            .collect();
        let ids: BTreeSet<String> = ["1".to_string(), "2".to_string()].into();
        store.save(&stored, &ids).await.unwrap();

        let source = Arc::new(MockSource::default());
        let report = engine(&["1", "2"], vec![source.clone()], unused(), None, 3)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        assert!(source.calls().is_empty());
        assert!(read_output(dir.path()).contains("第2章\n    旧2"));
        assert!(progress_ids(dir.path()).is_none());
    }

    #[tokio::test]
    async fn range_limits_downloaded_chapters() {
        let dir = tempfile::tempdir().unwrap();
        let source = Arc::new(MockSource::serving(&["1", "2", "3"]));
        let request = DownloadRequest::builder()
            .book_id("book")
            .output_dir(dir.path())
            .start(2)
            .end(9)
            .build();

        let report = engine(&["1", "2", "3"], vec![source.clone()], unused(), None, 1)
            .run(&request)
            .await
            .unwrap();

        assert_eq!(report.status, JobStatus::Success);
        assert_eq!(report.total, 2);
        let mut calls = source.calls();
        calls.sort();
        assert_eq!(calls, ["2", "3"]);
        assert!(!read_output(dir.path()).contains("正文1"));
        assert_eq!(progress_ids(dir.path()).unwrap(), ["2", "3"]);
    }

    #[tokio::test]
    async fn range_run_keeps_progress_of_the_rest_of_the_book() {
        let dir = tempfile::tempdir().unwrap();
        let ids = ["1", "2", "3", "4"];

        let first = engine(&ids, vec![Arc::new(MockSource::serving(&["1", "2"]))], unused(), None, 1)
            .run(&request(dir.path()))
            .await
            .unwrap();
        assert_eq!(first.status, JobStatus::SuccessWithOmissions);
        assert_eq!(progress_ids(dir.path()).unwrap(), ["1", "2"]);

        let range = DownloadRequest::builder()
            .book_id("book")
            .output_dir(dir.path())
            .start(3)
            .end(3)
            .build();
        let range_source = Arc::new(MockSource::serving(&ids));
        let second = engine(&ids, vec![range_source.clone()], unused(), None, 1)
            .run(&range)
            .await
            .unwrap();

        assert_eq!(second.status, JobStatus::Success);
        assert_eq!((second.succeeded, second.total), (1, 1));
        assert_eq!(range_source.calls(), ["3"]);
        assert_eq!(progress_ids(dir.path()).unwrap(), ["1", "2", "3"]);
        let text = read_output(dir.path());
        assert!(text.contains("正文1") && text.contains("正文3"));
        assert!(!text.contains("正文4"));

        let full_source = Arc::new(MockSource::serving(&ids));
        let third = engine(&ids, vec![full_source.clone()], unused(), None, 1)
            .run(&request(dir.path()))
            .await
            .unwrap();

        assert_eq!(third.status, JobStatus::Success);
        assert_eq!(full_source.calls(), ["4"]);
        assert!(progress_ids(dir.path()).is_none());
        assert!(read_output(dir.path()).contains("正文4"));
    }

    #[tokio::test]
    async fn resolver_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = create_event_channel();

        let result = engine(&[], Vec::new(), unused(), None, 1)
            .with_events(tx)
            .run(&request(dir.path()))
            .await;

        assert!(matches!(result, Err(DownloadError::NoChapters(_))));
        let mut failed = false;
        while let Some(event) = rx.try_recv() {
            failed |= matches!(event, DownloadEvent::TaskFailed { .. });
        }
        assert!(failed);
    }

    #[test]
    fn report_summary_mentions_counts() {
        let report = JobReport {
            status: JobStatus::SuccessWithOmissions,
            total: 3,
            succeeded: 2,
            output: Some(PathBuf::from("out/书.txt")),
            interrupted: false,
        };
        assert_eq!(report.to_string(), "部分完成: 成功 2/3 章，缺失 1 章，文件: out/书.txt");
        assert_eq!(report.failed(), 1);
    }
}
