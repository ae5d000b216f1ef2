//! lsjk 适配器
//!
//! GET 模板，响应体是带 `<p idx="N">` 段落标记的原始 HTML，不含标题。

use async_trait::async_trait;
use tracing::debug;

use crate::interfaces::{ContentSource, FetchOutcome};
use crate::network::HttpService;
use crate::registry::EndpointDescriptor;

const PARAGRAPH_MARKER: &str = "<p idx=";

pub struct LsjkSource {
    http: HttpService,
    endpoint: EndpointDescriptor,
}

impl LsjkSource {
    pub fn new(http: HttpService, endpoint: EndpointDescriptor) -> Self {
        Self { http, endpoint }
    }
}

/// 没有段落标记的响应视为失败 (通常是错误页)
pub fn parse_body(body: &str) -> FetchOutcome {
    if !body.contains(PARAGRAPH_MARKER) {
        return FetchOutcome::failed("no paragraph markers");
    }
    FetchOutcome::from_content("", body)
}

#[async_trait]
impl ContentSource for LsjkSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn fetch(&self, chapter_id: &str) -> FetchOutcome {
        let url = self.endpoint.render_url(chapter_id);
        debug!("[{}] GET {}", self.name(), url);

        match self.http.get_text(&url).await {
            Ok(body) => parse_body(&body),
            Err(e) => FetchOutcome::failed(e.to_string()),
        }
    }
}
