//! 端点注册表 (Endpoint Registry)
//!
//! 有序的内容源描述符列表，顺序即回退优先级。一次任务内只读。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::config::BatchTuning;

/// 唯一支持批量接口的适配器变体
pub const BATCH_SOURCE: &str = "qyuing";

/// 内容源描述符
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// 适配器变体名称
    pub name: String,
    /// URL 模板，可能包含 `{chapter_id}`
    #[serde(rename = "url")]
    pub url_template: String,
    /// 固定查询参数
    #[serde(rename = "params", default, skip_serializing_if = "Option::is_none")]
    pub static_params: Option<Map<String, Value>>,
    /// 固定请求体字段
    #[serde(rename = "data", default, skip_serializing_if = "Option::is_none")]
    pub static_payload: Option<Map<String, Value>>,
}

impl EndpointDescriptor {
    pub fn new(name: impl Into<String>, url_template: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            static_params: None,
            static_payload: None,
        }
    }

    /// 以 `{chapter_id}` 模板展开 URL
    pub fn render_url(&self, chapter_id: &str) -> String {
        self.url_template.replace("{chapter_id}", chapter_id)
    }
}

/// 批量接口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_batch_name")]
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, alias = "batch_endpoint")]
    pub batch_path: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_timeout", alias = "timeout")]
    pub timeout_secs: u64,
}

fn default_batch_name() -> String {
    BATCH_SOURCE.to_string()
}
fn default_max_batch_size() -> usize {
    290
}
fn default_timeout() -> u64 {
    10
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            name: default_batch_name(),
            base_url: None,
            batch_path: None,
            token: None,
            max_batch_size: default_max_batch_size(),
            timeout_secs: default_timeout(),
        }
    }
}

impl BatchConfig {
    /// 从 qyuing 单章地址推导批量接口：去掉查询串后，最后一段路径即批量端点
    pub fn derive(single_url: &str, token: Option<String>) -> Self {
        let without_query = single_url.split('?').next().unwrap_or(single_url);
        let (base_url, endpoint) = without_query
            .rsplit_once('/')
            .unwrap_or((without_query, ""));

        Self {
            enabled: true,
            base_url: Some(base_url.to_string()),
            batch_path: Some(format!("/{}", endpoint)),
            token: token.filter(|t| !t.is_empty()),
            ..Self::default()
        }
    }

    /// 完整批量接口地址
    pub fn url(&self) -> Option<String> {
        match (&self.base_url, &self.batch_path) {
            (Some(base), Some(path)) => Some(format!("{}{}", base, path)),
            _ => None,
        }
    }
}

/// 端点注册表快照
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointRegistry {
    endpoints: Vec<EndpointDescriptor>,
    batch: BatchConfig,
}

impl EndpointRegistry {
    pub fn new(endpoints: Vec<EndpointDescriptor>, batch: BatchConfig) -> Self {
        Self { endpoints, batch }
    }

    /// 按优先级排列的端点
    pub fn list_endpoints(&self) -> &[EndpointDescriptor] {
        &self.endpoints
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// 原始批量配置 (用于缓存)
    pub fn batch_config(&self) -> &BatchConfig {
        &self.batch
    }

    /// 可用的批量配置
    ///
    /// 仅当批量开关打开、变体为 qyuing、注册表中确实存在 qyuing 端点且地址完整时有效。
    pub fn batch(&self) -> Option<&BatchConfig> {
        let has_source = self.endpoints.iter().any(|e| e.name == BATCH_SOURCE);
        (self.batch.enabled && self.batch.name == BATCH_SOURCE && has_source && self.batch.url().is_some())
            .then_some(&self.batch)
    }

    /// 应用本地调优参数
    pub fn with_tuning(mut self, tuning: &BatchTuning) -> Self {
        self.batch.max_batch_size = tuning.max_batch_size.max(1);
        self.batch.timeout_secs = tuning.timeout_secs;
        self
    }

    /// 解析发现服务返回的 `sources` 数组
    pub fn from_sources(sources: &[Value]) -> Self {
        let mut endpoints = Vec::new();
        let mut batch = BatchConfig::default();

        for source in sources {
            if !source.get("enabled").and_then(Value::as_bool).unwrap_or(false) {
                continue;
            }
            let name = source.get("name").and_then(Value::as_str).unwrap_or_default();
            let single_url = source
                .get("single_url")
                .and_then(Value::as_str)
                .unwrap_or_default();
            if name.is_empty() || single_url.is_empty() {
                warn!("跳过不完整的内容源: {}", source);
                continue;
            }

            if name == BATCH_SOURCE {
                let token = source.get("token").and_then(Value::as_str).map(str::to_string);
                batch = BatchConfig::derive(single_url, token);
                debug!("批量接口已启用: {:?}", batch.url());
            }

            let mut endpoint = EndpointDescriptor::new(name, single_url);
            endpoint.static_params = source.get("params").and_then(Value::as_object).cloned();
            endpoint.static_payload = source.get("data").and_then(Value::as_object).cloned();
            endpoints.push(endpoint);
        }

        Self { endpoints, batch }
    }
}
