//! fqweb 适配器
//!
//! GET 请求，章节 id 通过 `{chapter_id}` 模板或 `item_id` 查询参数传递。
//! 响应信封: `{data: {code: "0"|0, data: {content, title}}}`。

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::{is_success_code, parse_json, text_field};
use crate::core::error::Result;
use crate::interfaces::{ContentSource, FetchOutcome};
use crate::network::HttpService;
use crate::registry::EndpointDescriptor;

pub struct FqwebSource {
    http: HttpService,
    endpoint: EndpointDescriptor,
}

impl FqwebSource {
    pub fn new(http: HttpService, endpoint: EndpointDescriptor) -> Self {
        Self { http, endpoint }
    }

    fn build_url(&self, chapter_id: &str) -> Result<String> {
        if self.endpoint.url_template.contains("{chapter_id}") {
            return Ok(self.endpoint.render_url(chapter_id));
        }
        let mut url = Url::parse(&self.endpoint.url_template)?;
        url.query_pairs_mut().append_pair("item_id", chapter_id);
        Ok(url.into())
    }
}

/// 解析 fqweb 信封
pub fn parse_envelope(body: &str) -> FetchOutcome {
    let value = match parse_json(body) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };
    from_value(&value)
}

pub(crate) fn from_value(value: &Value) -> FetchOutcome {
    let Some(outer) = value.get("data") else {
        return FetchOutcome::failed("missing data");
    };
    if !is_success_code(outer.get("code")) {
        return FetchOutcome::failed(format!("unexpected code: {:?}", outer.get("code")));
    }
    match outer.get("data") {
        Some(inner) => FetchOutcome::from_content(text_field(inner, "title"), text_field(inner, "content")),
        None => FetchOutcome::failed("missing data.data"),
    }
}

#[async_trait]
impl ContentSource for FqwebSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn fetch(&self, chapter_id: &str) -> FetchOutcome {
        let url = match self.build_url(chapter_id) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::failed(e.to_string()),
        };
        debug!("[{}] GET {}", self.name(), url);

        match self.http.get_text(&url).await {
            Ok(body) => parse_envelope(&body),
            Err(e) => FetchOutcome::failed(e.to_string()),
        }
    }
}
