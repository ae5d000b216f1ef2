//! 错误处理体系 (Error Handling System)
//!
//! 定义下载领域的错误类型以及全局 Result 别名。
//! 单个内容源的失败不会以错误形式向上传播，而是在 Fetcher 内部转换为 `FetchOutcome::Failed`。

use thiserror::Error;

/// 全局错误定义 (Download Domain Errors)
#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Middleware error: {0}")]
    Middleware(#[from] reqwest_middleware::Error),

    /// 非 2xx 响应
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Parsing error: {0}")]
    Parse(String),

    /// 章节目录解析失败，整个任务无法继续
    #[error("No chapters found: {0}")]
    NoChapters(String),

    #[error("EPUB error: {0}")]
    Epub(String),
}

/// 全局 Result 别名
pub type Result<T> = std::result::Result<T, DownloadError>;

impl From<url::ParseError> for DownloadError {
    fn from(e: url::ParseError) -> Self {
        DownloadError::Parse(format!("invalid url: {}", e))
    }
}
