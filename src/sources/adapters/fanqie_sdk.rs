//! fanqie_sdk 适配器
//!
//! POST JSON 请求体，固定查询参数来自描述符 (缺省为 SDK 默认值)。
//! 响应信封: `{data: {content, title}}`。

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;

use super::{param_value, parse_json, text_field};
use crate::core::error::Result;
use crate::interfaces::{ContentSource, FetchOutcome};
use crate::network::HttpService;
use crate::registry::EndpointDescriptor;

const DEFAULT_PARAMS: &[(&str, &str)] = &[("sdk_type", "4"), ("novelsdk_aid", "638505")];

pub struct FanqieSdkSource {
    http: HttpService,
    endpoint: EndpointDescriptor,
}

impl FanqieSdkSource {
    pub fn new(http: HttpService, endpoint: EndpointDescriptor) -> Self {
        Self { http, endpoint }
    }

    fn build_url(&self, chapter_id: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoint.render_url(chapter_id))?;
        {
            let mut query = url.query_pairs_mut();
            match &self.endpoint.static_params {
                Some(params) => {
                    for (key, value) in params {
                        query.append_pair(key, &param_value(value));
                    }
                }
                None => {
                    for (key, value) in DEFAULT_PARAMS {
                        query.append_pair(key, value);
                    }
                }
            }
        }
        Ok(url.into())
    }

    /// 静态载荷在前，固定字段覆盖同名键
    fn build_body(&self, chapter_id: &str) -> Value {
        let mut body = self.endpoint.static_payload.clone().unwrap_or_else(Map::new);
        body.insert("item_id".into(), json!(chapter_id));
        body.insert("need_book_info".into(), json!(1));
        body.insert("show_picture".into(), json!(1));
        body.insert("sdk_type".into(), json!(1));
        Value::Object(body)
    }
}

/// 解析 SDK 信封
pub fn parse_envelope(body: &str) -> FetchOutcome {
    let value = match parse_json(body) {
        Ok(v) => v,
        Err(outcome) => return outcome,
    };
    from_value(&value)
}

fn from_value(value: &Value) -> FetchOutcome {
    match value.get("data") {
        Some(data) => FetchOutcome::from_content(text_field(data, "title"), text_field(data, "content")),
        None => FetchOutcome::failed("missing data"),
    }
}

#[async_trait]
impl ContentSource for FanqieSdkSource {
    fn name(&self) -> &str {
        &self.endpoint.name
    }

    async fn fetch(&self, chapter_id: &str) -> FetchOutcome {
        let url = match self.build_url(chapter_id) {
            Ok(url) => url,
            Err(e) => return FetchOutcome::failed(e.to_string()),
        };
        debug!("[{}] POST {}", self.name(), url);

        let body = self.build_body(chapter_id);
        match self.http.post_json(&url, &body, HeaderMap::new(), None).await {
            Ok(value) => from_value(&value),
            Err(e) => FetchOutcome::failed(e.to_string()),
        }
    }
}
