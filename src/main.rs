//! 应用程序入口 (Application Entrypoint)
//!
//! 负责 CLI 指令解析、日志层初始化、依赖注入及信号处理。

mod core;
mod engine;
mod interfaces;
mod network;
mod registry;
mod sources;
mod ui;
mod utils;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::core::config::AppConfig;
use crate::core::event::create_event_channel;
use crate::core::model::OutputFormat;
use crate::engine::{ChapterFetcher, DownloadEngine, DownloadRequest};
use crate::network::HttpService;
use crate::registry::{EndpointCache, prepare_registry};
use crate::sources::SourceRegistry;
use crate::sources::fanqie::{FanqieIndexer, SearchClient};
use crate::ui::{Ui, get_multi};

/// 进度条感知的日志写入器
///
/// 确保日志输出不会破坏终端进度条的渲染布局。
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

/// 番茄小说下载器
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, global = true, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 下载小说，已下载的章节会自动跳过
    Download {
        /// 小说 ID
        book_id: String,
        /// 输出格式 (txt / epub)
        #[arg(short, long)]
        format: Option<OutputFormat>,
        /// 输出目录
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 起始章节 (从 1 开始)
        #[arg(long)]
        start: Option<usize>,
        /// 结束章节 (含)
        #[arg(long)]
        end: Option<usize>,
        /// 并发 worker 数
        #[arg(short, long)]
        workers: Option<usize>,
        /// 重试轮次
        #[arg(short, long)]
        retries: Option<u32>,
        /// 忽略端点缓存，重新发现内容源
        #[arg(long)]
        refresh_sources: bool,
    },
    /// 按关键词搜索书籍
    Search {
        keyword: String,
        /// 已浏览的条数，每页 10 条
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// 管理内容源端点缓存
    Sources {
        #[command(subcommand)]
        action: SourcesAction,
    },
}

#[derive(Subcommand)]
enum SourcesAction {
    /// 查看缓存的端点
    List,
    /// 重新发现并写入缓存
    Refresh,
    /// 删除缓存
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(IndicatifWriter)
        .with_target(false)
        .with_ansi(true)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load_from(&cli.config)?;

    match cli.command {
        Commands::Download {
            book_id,
            format,
            output,
            start,
            end,
            workers,
            retries,
            refresh_sources,
        } => {
            if let Some(workers) = workers {
                config.downloader.workers = workers;
            }
            if let Some(retries) = retries {
                config.downloader.retry_rounds = retries;
            }

            let request = DownloadRequest::builder()
                .book_id(book_id)
                .format(format.unwrap_or(config.format))
                .output_dir(output.unwrap_or_else(|| PathBuf::from(&config.output_dir)))
                .maybe_start(start)
                .maybe_end(end)
                .build();

            download(config, request, refresh_sources).await
        }
        Commands::Search { keyword, offset } => {
            search(&config, &keyword, offset).await?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sources { action } => {
            manage_sources(&config, action).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn download(config: AppConfig, request: DownloadRequest, refresh: bool) -> anyhow::Result<ExitCode> {
    let http = HttpService::new(config.downloader.request_timeout())?;

    // 依赖项初始化与注入
    let endpoints = prepare_registry(&config, &http, refresh).await;
    let sources = SourceRegistry::new();
    let content_sources = sources.build_all(&http, &endpoints);
    let fallback = sources.fallback(&http, &config.site.fallback_url);
    let batch = sources.batch(&http, &endpoints);
    info!(
        "内容源: {} 个{}",
        content_sources.len(),
        if batch.is_some() { " (含批量接口)" } else { "" }
    );

    let fetcher = Arc::new(ChapterFetcher::new(content_sources, fallback, config.downloader.jitter()));
    let indexer = Arc::new(FanqieIndexer::new(
        http,
        &config.site.base_url,
        config.site.request_attempts,
        config.downloader.retry_delay(),
    )?);

    // 信号处理与优雅退出
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("收到中断信号，正在保存进度...");
            shutdown.cancel();
        }
    });

    let (event_sender, event_receiver) = create_event_channel();
    let ui_handle = Ui::run(event_receiver);

    let result = {
        let engine = DownloadEngine::new(indexer, fetcher, batch, config.downloader.clone())
            .with_events(event_sender)
            .with_cancellation(cancel);
        engine.run(&request).await
    };

    // 发送端随 engine 释放后 UI 循环退出
    let _ = ui_handle.await;

    match result {
        Ok(report) if !report.is_failure() => Ok(ExitCode::SUCCESS),
        Ok(_) => Ok(ExitCode::FAILURE),
        Err(e) => {
            error!("下载失败: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn search(config: &AppConfig, keyword: &str, offset: usize) -> anyhow::Result<()> {
    let http = HttpService::new(config.downloader.request_timeout())?;
    let client = SearchClient::new(http, &config.site.search_url)?;
    let page = client.search(keyword, offset).await?;

    if page.items.is_empty() {
        info!("未找到与「{}」相关的书籍", keyword);
        return Ok(());
    }

    for hit in &page.items {
        info!(
            "{:<20} 《{}》 {} | {} | {} 字",
            hit.book_id, hit.book_name, hit.author, hit.category, hit.word_number
        );
    }
    if page.has_more {
        info!("更多结果: search {} --offset {}", keyword, page.next_offset);
    }
    Ok(())
}

async fn manage_sources(config: &AppConfig, action: SourcesAction) -> anyhow::Result<()> {
    let cache = EndpointCache::new(config.discovery.cache_file(), config.discovery.cache_ttl_days);

    match action {
        SourcesAction::List => {
            let Some(entry) = cache.inspect().await else {
                info!("暂无端点缓存: {}", cache.path().display());
                return Ok(());
            };

            let age = registry::cache::describe_age(entry.saved_at, chrono::Utc::now());
            info!(
                "端点缓存 ({}保存{}): {}",
                age,
                if entry.expired { "，已过期" } else { "" },
                cache.path().display()
            );
            for endpoint in entry.registry.list_endpoints() {
                info!("  {:<12} {}", endpoint.name, endpoint.url_template);
            }
            if let Some(batch) = entry.registry.batch()
                && let Some(url) = batch.url()
            {
                info!("  批量接口: {} (每批 {} 章)", url, batch.max_batch_size);
            }
        }
        SourcesAction::Refresh => {
            let http = HttpService::new(config.downloader.request_timeout())?;
            let registry = prepare_registry(config, &http, true).await;
            info!("已发现 {} 个内容源", registry.list_endpoints().len());
        }
        SourcesAction::Clear => {
            if cache.clear().await? {
                info!("已删除端点缓存: {}", cache.path().display());
            } else {
                info!("端点缓存不存在");
            }
        }
    }

    Ok(())
}
