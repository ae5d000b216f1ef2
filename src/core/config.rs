//! 配置管理系统 (Configuration Management)
//!
//! 负责 `config.toml` 的反序列化及其层级结构映射，支持 `FANQIE_` 前缀环境变量覆盖与默认值回退机制。

use std::path::{Path, PathBuf};
use std::time::Duration;

use bon::Builder;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::core::error::{DownloadError, Result};
use crate::core::model::OutputFormat;

/// 全局应用配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct AppConfig {
    /// 输出目录 (成品与进度文件所在位置)
    #[serde(default = "default_output_dir")]
    #[builder(default = default_output_dir())]
    pub output_dir: String,

    /// 默认输出格式
    #[serde(default)]
    #[builder(default)]
    pub format: OutputFormat,

    /// 下载调度参数
    #[serde(default)]
    #[builder(default)]
    pub downloader: DownloaderConfig,

    /// 内容源发现服务配置
    #[serde(default)]
    #[builder(default)]
    pub discovery: DiscoveryConfig,

    /// 批量接口调优参数
    #[serde(default)]
    #[builder(default)]
    pub batch: BatchTuning,

    /// 站点地址配置
    #[serde(default)]
    #[builder(default)]
    pub site: SiteConfig,
}

/// 调度引擎参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct DownloaderConfig {
    /// 单章并发 worker 数
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 重试轮次上限
    #[serde(default = "default_retry_rounds")]
    pub retry_rounds: u32,
    /// 单次请求超时 (秒)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// 轮次之间的等待 (毫秒)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// 请求前随机抖动下限 (毫秒)
    #[serde(default = "default_jitter_min")]
    pub jitter_min_ms: u64,
    /// 请求前随机抖动上限 (毫秒)
    #[serde(default = "default_jitter_max")]
    pub jitter_max_ms: u64,
}

/// 内容源发现配置
#[derive(Debug, Deserialize, Builder, Clone, Default)]
pub struct DiscoveryConfig {
    /// 发现服务地址，缺省时只使用内置回退源
    pub server_url: Option<String>,
    /// `X-Auth-Token`
    pub auth_token: Option<String>,
    /// 人机验证令牌 (带外获取，原样透传)
    pub verification_token: Option<String>,
    /// 端点缓存文件路径，缺省时落在系统缓存目录
    pub cache_path: Option<String>,
    /// 缓存有效期 (天)
    #[serde(default = "default_cache_ttl_days")]
    #[builder(default = default_cache_ttl_days())]
    pub cache_ttl_days: u64,
}

/// 批量接口调优参数
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct BatchTuning {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_batch_timeout")]
    pub timeout_secs: u64,
}

/// 站点地址配置
#[derive(Debug, Deserialize, Builder, Clone)]
pub struct SiteConfig {
    /// 书籍页面与目录接口所在域名
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 注册表为空时使用的内置 fqweb 地址模板
    #[serde(default = "default_fallback_url")]
    pub fallback_url: String,
    /// 关键词搜索接口
    #[serde(default = "default_search_url")]
    pub search_url: String,
    /// 书籍页面与目录请求的尝试次数，与章节重试轮次无关
    #[serde(default = "default_request_attempts")]
    pub request_attempts: u32,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            retry_rounds: default_retry_rounds(),
            request_timeout_secs: default_request_timeout(),
            retry_delay_ms: default_retry_delay(),
            jitter_min_ms: default_jitter_min(),
            jitter_max_ms: default_jitter_max(),
        }
    }
}

impl DownloaderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// 抖动区间，保证下限不超过上限
    pub fn jitter(&self) -> (Duration, Duration) {
        let min = self.jitter_min_ms.min(self.jitter_max_ms);
        (
            Duration::from_millis(min),
            Duration::from_millis(self.jitter_max_ms),
        )
    }
}

impl Default for BatchTuning {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            timeout_secs: default_batch_timeout(),
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            fallback_url: default_fallback_url(),
            search_url: default_search_url(),
            request_attempts: default_request_attempts(),
        }
    }
}

impl DiscoveryConfig {
    /// 解析端点缓存路径
    pub fn cache_file(&self) -> PathBuf {
        if let Some(path) = &self.cache_path {
            return PathBuf::from(path);
        }
        directories::ProjectDirs::from("", "", "fanqie-dl")
            .map(|dirs| dirs.cache_dir().join("saved_apis.json"))
            .unwrap_or_else(|| PathBuf::from("saved_apis.json"))
    }
}

fn default_output_dir() -> String {
    "downloads".to_string()
}
fn default_workers() -> usize {
    4
}
fn default_retry_rounds() -> u32 {
    3
}
fn default_request_timeout() -> u64 {
    15
}
fn default_retry_delay() -> u64 {
    1000
}
fn default_jitter_min() -> u64 {
    100
}
fn default_jitter_max() -> u64 {
    500
}
fn default_cache_ttl_days() -> u64 {
    7
}
fn default_max_batch_size() -> usize {
    290
}
fn default_batch_timeout() -> u64 {
    10
}
fn default_base_url() -> String {
    "https://fanqienovel.com".to_string()
}
fn default_fallback_url() -> String {
    "http://fqweb.jsj66.com/content?item_id={chapter_id}".to_string()
}
fn default_search_url() -> String {
    "http://fqweb.jsj66.com/search".to_string()
}
fn default_request_attempts() -> u32 {
    3
}

impl AppConfig {
    /// 从文件系统与环境变量中加载并解析配置
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let builder = Config::builder();

        let builder = if config_path.exists() {
            builder.add_source(File::from(config_path))
        } else {
            builder
        };

        let settings = builder
            .add_source(
                Environment::with_prefix("FANQIE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(DownloadError::Config)?;
        settings.try_deserialize().map_err(DownloadError::Config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(cfg.output_dir, "downloads");
        assert_eq!(cfg.format, OutputFormat::Txt);
        assert_eq!(cfg.downloader.workers, 4);
        assert_eq!(cfg.downloader.retry_rounds, 3);
        assert_eq!(cfg.discovery.cache_ttl_days, 7);
        assert_eq!(cfg.batch.max_batch_size, 290);
        assert!(cfg.site.fallback_url.contains("{chapter_id}"));
        assert!(cfg.site.search_url.ends_with("/search"));
        assert_eq!(cfg.site.request_attempts, 3);
    }

    #[test]
    fn page_attempts_are_independent_of_retry_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[downloader]\nretry_rounds = 9\n[site]\nrequest_attempts = 2\n").unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.downloader.retry_rounds, 9);
        assert_eq!(cfg.site.request_attempts, 2);
        assert_eq!(cfg.site.base_url, "https://fanqienovel.com");
    }

    #[test]
    fn file_overrides_nested_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "format = \"epub\"\n[downloader]\nworkers = 8\nretry_rounds = 5\n[batch]\nmax_batch_size = 50\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.format, OutputFormat::Epub);
        assert_eq!(cfg.downloader.workers, 8);
        assert_eq!(cfg.downloader.retry_rounds, 5);
        assert_eq!(cfg.downloader.request_timeout_secs, 15);
        assert_eq!(cfg.batch.max_batch_size, 50);
        assert_eq!(cfg.batch.timeout_secs, 10);
    }

    #[test]
    fn jitter_bounds_are_ordered() {
        let cfg = DownloaderConfig {
            jitter_min_ms: 900,
            jitter_max_ms: 200,
            ..DownloaderConfig::default()
        };
        let (min, max) = cfg.jitter();
        assert!(min <= max);
    }
}
