//! qyuing 适配器
//!
//! 唯一支持批量接口的变体。单章接口为 GET 模板，响应信封有两种形态：
//! `{code: 0, data: {<id>: {content, title}}}`，或与 fqweb 相同的嵌套形态。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::{Value, json};
use tracing::debug;

use super::{fqweb, is_success_code, parse_json, raw_entry};
use crate::core::error::{DownloadError, Result};
use crate::interfaces::{BatchSource, ContentSource, FetchOutcome, RawChapter};
use crate::network::HttpService;
use crate::registry::{BatchConfig, EndpointDescriptor};

pub struct QyuingSource {
    http: HttpService,
    endpoint: EndpointDescriptor,
}

impl QyuingSource {
    pub fn new(http: HttpService, endpoint: EndpointDescriptor) -> Self {
        Self { http, endpoint }
    }
}

/// 解析单章信封
pub fn parse_envelope(body: &str, chapter_id: &str) -> FetchOutcome {
    let value = match parse_json(body) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };

    if let Some(entry) = value.get("data").and_then(|d| d.get(chapter_id)) {
        if value.get("code").is_some() && !is_success_code(value.get("code")) {
            return FetchOutcome::failed(format!("unexpected code: {:?}", value.get("code")));
        }
        return match raw_entry(entry) {
            Some(raw) => FetchOutcome::Found(raw),
            None => FetchOutcome::failed("empty content"),
        };
    }

    fqweb::from_value(&value)
}

/// 解析批量响应：`{data: {<id>: entry}}` 或直接 `{<id>: entry}`
pub fn parse_batch(value: &Value) -> Result<HashMap<String, RawChapter>> {
    let entries = match value.get("data") {
        Some(data) => data,
        None => value,
    };
    let entries = entries
        .as_object()
        .ok_or_else(|| DownloadError::Parse("batch response is not an object".into()))?;

    Ok(entries
        .iter()
        .filter_map(|(id, entry)| raw_entry(entry).map(|raw| (id.clone(), raw)))
        .collect())
}

#[async_trait]
impl ContentSource for QyuingSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn fetch(&self, chapter_id: &str) -> FetchOutcome {
        let url = self.endpoint.render_url(chapter_id);
        debug!("[{}] GET {}", self.name(), url);

        match self.http.get_text(&url).await {
            Ok(body) => parse_envelope(&body, chapter_id),
            Err(e) => FetchOutcome::failed(e.to_string()),
        }
    }
}

/// qyuing 批量接口
pub struct QyuingBatch {
    http: HttpService,
    url: String,
    headers: HeaderMap,
    max_batch_size: usize,
    timeout: Duration,
}

impl QyuingBatch {
    /// 配置不完整时返回 None
    pub fn new(http: HttpService, config: &BatchConfig) -> Option<Self> {
        let url = config.url()?;
        let mut headers = HeaderMap::new();
        if let Some(token) = config.token.as_deref() {
            if let Ok(value) = HeaderValue::from_str(token) {
                headers.insert(HeaderName::from_static("token"), value);
            }
        }

        Some(Self {
            http,
            url,
            headers,
            max_batch_size: config.max_batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl BatchSource for QyuingBatch {
    fn name(&self) -> &str {
        crate::registry::BATCH_SOURCE
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn fetch_batch(&self, chapter_ids: &[String]) -> Result<HashMap<String, RawChapter>> {
        debug!("[{}] POST {} ({} 章)", self.name(), self.url, chapter_ids.len());
        let body = json!({ "item_ids": chapter_ids });
        let value = self
            .http
            .post_json(&self.url, &body, self.headers.clone(), Some(self.timeout))
            .await?;
        parse_batch(&value)
    }
}
