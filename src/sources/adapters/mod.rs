//! 适配器变体
//!
//! 每个变体封装自己的请求构造与响应信封解析，对外只暴露 [`ContentSource`](crate::interfaces::ContentSource)。

pub mod fanqie_sdk;
pub mod fqweb;
pub mod lsjk;
pub mod qyuing;

pub use fanqie_sdk::FanqieSdkSource;
pub use fqweb::FqwebSource;
pub use lsjk::LsjkSource;
pub use qyuing::{QyuingBatch, QyuingSource};

use serde_json::Value;

use crate::interfaces::{FetchOutcome, RawChapter};

/// 读取字符串字段，缺失或类型不符时返回空串
pub(crate) fn text_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// 成功码可能是字符串 "0" 也可能是数字 0
pub(crate) fn is_success_code(code: Option<&Value>) -> bool {
    match code {
        Some(Value::String(s)) => s == "0",
        Some(Value::Number(n)) => n.as_i64() == Some(0),
        _ => false,
    }
}

/// `{content, title}` 对象或裸字符串
pub(crate) fn raw_entry(entry: &Value) -> Option<RawChapter> {
    let raw = match entry {
        Value::String(content) => RawChapter::new("", content.as_str()),
        Value::Object(_) => RawChapter::new(text_field(entry, "title"), text_field(entry, "content")),
        _ => return None,
    };
    (!raw.content.trim().is_empty()).then_some(raw)
}

/// 将响应体解析为 JSON，失败时直接给出 Failed
pub(crate) fn parse_json(body: &str) -> Result<Value, FetchOutcome> {
    serde_json::from_str(body).map_err(|e| FetchOutcome::failed(format!("malformed json: {}", e)))
}

/// JSON 值转查询参数字符串
pub(crate) fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
