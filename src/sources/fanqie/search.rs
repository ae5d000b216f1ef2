//! 关键词搜索
//!
//! GET `{search_url}?query=..&page=..`，每页 10 条，`page` 从 1 开始。
//! 响应信封: `{data: {code: "0"|0, search_tabs: [{data: [{book_data: [..]}]}]}}`。

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::core::error::Result;
use crate::network::HttpService;
use crate::sources::adapters::is_success_code;

/// 每页条数
pub const PAGE_SIZE: usize = 10;

/// 单条搜索结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchHit {
    pub book_id: String,
    pub book_name: String,
    pub author: String,
    pub category: String,
    pub abstract_text: String,
    pub score: String,
    pub serial_count: String,
    pub word_number: String,
    pub thumb_url: String,
    pub creation_status: String,
    pub tags: String,
    pub sub_info: String,
}

impl SearchHit {
    fn from_value(book: &Value) -> Self {
        let author = field(book, &["author"]);
        Self {
            book_id: field(book, &["book_id", "id"]),
            book_name: field(book, &["book_name", "name"]),
            author: if author.is_empty() { "未知作者".to_string() } else { author },
            category: field(book, &["category"]),
            abstract_text: field(book, &["abstract", "desc"]),
            score: field(book, &["score"]),
            serial_count: field(book, &["serial_count"]),
            word_number: field(book, &["word_number"]),
            thumb_url: field(book, &["thumb_url"]),
            creation_status: field(book, &["creation_status"]),
            tags: field(book, &["tags"]),
            sub_info: field(book, &["sub_info"]),
        }
    }
}

/// 一页搜索结果
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub items: Vec<SearchHit>,
    pub has_more: bool,
    pub next_offset: usize,
}

/// 按候选键顺序取第一个非空值；数字与数组也转成文本
fn field(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key))
        .map(scalar_text)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(","),
        _ => String::new(),
    }
}

/// 解析搜索信封，非成功码时返回空列表
pub fn parse_results(value: &Value) -> Vec<SearchHit> {
    let Some(outer) = value.get("data") else {
        return Vec::new();
    };
    if !is_success_code(outer.get("code")) {
        return Vec::new();
    }

    let Some(tabs) = outer.get("search_tabs").and_then(Value::as_array) else {
        return Vec::new();
    };

    tabs.iter()
        .filter_map(|tab| tab.get("data").and_then(Value::as_array))
        .flatten()
        .filter_map(|entry| entry.get("book_data").and_then(Value::as_array))
        .flatten()
        .filter(|book| book.is_object())
        .map(SearchHit::from_value)
        .collect()
}

/// 搜索客户端
pub struct SearchClient {
    http: HttpService,
    url: Url,
}

impl SearchClient {
    pub fn new(http: HttpService, url: &str) -> Result<Self> {
        Ok(Self {
            http,
            url: Url::parse(url)?,
        })
    }

    fn page_url(&self, keyword: &str, offset: usize) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .append_pair("query", keyword)
            .append_pair("page", &(offset / PAGE_SIZE + 1).to_string());
        url
    }

    /// 搜索一页，`offset` 为已浏览条数
    pub async fn search(&self, keyword: &str, offset: usize) -> Result<SearchPage> {
        let url = self.page_url(keyword, offset);
        debug!("GET {}", url);

        let value = self.http.get_json(url.as_str()).await?;
        let items = parse_results(&value);

        Ok(SearchPage {
            has_more: items.len() == PAGE_SIZE,
            next_offset: offset + PAGE_SIZE,
            items,
        })
    }
}
