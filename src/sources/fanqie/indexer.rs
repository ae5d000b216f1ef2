//! 番茄小说索引器
//!
//! 章节目录由两部分合成：目录接口给出权威的 id 顺序，书籍页面提供章节标题。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexSet;
use mime_guess::MimeGuess;
use parking_lot::Mutex;
use scraper::Html;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::SiteSelectors;
use crate::core::error::{DownloadError, Result};
use crate::core::model::{Chapter, Cover, Metadata};
use crate::interfaces::Indexer;
use crate::network::{HttpService, with_retry};
use crate::utils::{cover_file_name, to_absolute_url};

/// 番茄小说索引器
///
/// 目录与元数据都来自同一个书籍页面，最近一次取到的页面按 book id 缓存。
pub struct FanqieIndexer {
    http: HttpService,
    base: Url,
    attempts: u32,
    retry_delay: Duration,
    /// (book id, 页面 HTML)
    page_cache: Mutex<Option<(String, String)>>,
}

impl FanqieIndexer {
    pub fn new(http: HttpService, base_url: &str, attempts: u32, retry_delay: Duration) -> Result<Self> {
        Ok(Self {
            http,
            base: Url::parse(base_url)?,
            attempts: attempts.max(1),
            retry_delay,
            page_cache: Mutex::new(None),
        })
    }

    fn page_url(&self, book_id: &str) -> Result<String> {
        Ok(self.base.join(&format!("/page/{}", book_id))?.into())
    }

    fn directory_url(&self, book_id: &str) -> Result<String> {
        let mut url = self.base.join("/api/reader/directory/detail")?;
        url.query_pairs_mut().append_pair("bookId", book_id);
        Ok(url.into())
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let http = &self.http;
        with_retry(url, self.attempts, self.retry_delay, move || http.get_text(url)).await
    }

    async fn book_page(&self, book_id: &str) -> Result<String> {
        let cached = self
            .page_cache
            .lock()
            .as_ref()
            .filter(|(cached_id, _)| cached_id == book_id)
            .map(|(_, html)| html.clone());
        if let Some(html) = cached {
            return Ok(html);
        }

        let html = self.get_text(&self.page_url(book_id)?).await?;
        *self.page_cache.lock() = Some((book_id.to_string(), html.clone()));
        Ok(html)
    }
}

/// 解析书籍页面中的章节锚点，返回 (id, 标题)，保持 DOM 顺序
pub fn parse_page_chapters(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);
    let s = SiteSelectors::get();

    doc.select(&s.chapter_item)
        .enumerate()
        .filter_map(|(idx, item)| {
            let anchor = item.select(&s.anchor).next()?;
            let href = anchor.value().attr("href")?;
            let id = href.trim_end_matches('/').rsplit('/').next()?.trim();
            if id.is_empty() {
                return None;
            }

            let raw_title = anchor.text().collect::<String>().trim().to_string();
            Some((id.to_string(), retitle(&raw_title, idx + 1)))
        })
        .collect()
}

/// 统一章节编号；番外等特殊章节保留原标题
fn retitle(raw_title: &str, position: usize) -> String {
    let s = SiteSelectors::get();
    if s.special_prefix.is_match(raw_title) {
        return raw_title.to_string();
    }
    let clean = s.chapter_prefix.replace(raw_title, "");
    format!("第{}章 {}", position, clean.trim()).trim_end().to_string()
}

/// 解析目录接口的 `data.allItemIds`
pub fn parse_directory(body: &str) -> Result<Vec<String>> {
    let value: Value = serde_json::from_str(body)?;
    let ids = value
        .get("data")
        .and_then(|d| d.get("allItemIds"))
        .and_then(Value::as_array)
        .ok_or_else(|| DownloadError::Parse("directory response has no allItemIds".into()))?;

    Ok(ids
        .iter()
        .filter_map(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}

/// 按权威顺序合并标题；重复 id 只保留首次出现
pub fn merge_chapters(directory: Vec<String>, page: &[(String, String)]) -> Vec<Chapter> {
    let titles: HashMap<&str, &str> = page
        .iter()
        .map(|(id, title)| (id.as_str(), title.as_str()))
        .collect();

    let ids: IndexSet<String> = directory.into_iter().collect();

    ids.into_iter()
        .enumerate()
        .map(|(index, id)| {
            let title = titles
                .get(id.as_str())
                .map(|t| t.to_string())
                .unwrap_or_else(|| Chapter::placeholder_title(index));
            Chapter::new(index, id, title)
        })
        .collect()
}

/// 解析书籍元数据，缺失字段使用占位值
pub fn parse_metadata(html: &str, book_id: &str, base: &Url) -> Metadata {
    let doc = Html::parse_document(html);
    let s = SiteSelectors::get();
    let placeholder = Metadata::placeholder(book_id);

    let text_of = |selector: &scraper::Selector| {
        doc.select(selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
    };

    let title = text_of(&s.title)
        .map(|t| s.title_suffix.replace(&t, "").trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or(placeholder.title);

    let author = text_of(&s.author)
        .map(|a| s.author_suffix.replace(&a, "").trim().to_string())
        .filter(|a| !a.is_empty())
        .unwrap_or(placeholder.author);

    let description = text_of(&s.abstract_paragraph)
        .or_else(|| text_of(&s.abstract_block))
        .map(|d| {
            let d = s.abstract_prefix.replace(&d, "");
            s.whitespace.replace_all(&d, " ").trim().to_string()
        })
        .filter(|d| !d.is_empty())
        .unwrap_or(placeholder.description);

    let og_image = doc
        .select(&s.og_image)
        .filter_map(|m| m.value().attr("content"))
        .find(|c| c.contains("http"))
        .map(str::to_string);

    let cover_url = og_image.or_else(|| {
        s.cover_imgs.iter().find_map(|selector| {
            doc.select(selector)
                .filter_map(|img| img.value().attr("src"))
                .find(|src| !src.is_empty())
                .map(|src| to_absolute_url(base, src))
        })
    });

    Metadata {
        title,
        author,
        description,
        cover_url,
        language: placeholder.language,
    }
}

#[async_trait]
impl Indexer for FanqieIndexer {
    async fn fetch_metadata(&self, book_id: &str) -> Result<Metadata> {
        let html = self.book_page(book_id).await?;
        Ok(parse_metadata(&html, book_id, &self.base))
    }

    async fn fetch_chapters(&self, book_id: &str) -> Result<Vec<Chapter>> {
        let page_html = self
            .book_page(book_id)
            .await
            .map_err(|e| DownloadError::NoChapters(format!("书籍页面获取失败: {}", e)))?;
        let page = parse_page_chapters(&page_html);
        debug!("页面解析到 {} 个章节标题", page.len());

        let body = self
            .get_text(&self.directory_url(book_id)?)
            .await
            .map_err(|e| DownloadError::NoChapters(format!("目录接口请求失败: {}", e)))?;
        let directory = parse_directory(&body)
            .map_err(|e| DownloadError::NoChapters(format!("目录接口响应无效: {}", e)))?;

        let chapters = merge_chapters(directory, &page);
        if chapters.is_empty() {
            return Err(DownloadError::NoChapters(format!("书籍 {} 没有章节", book_id)));
        }
        Ok(chapters)
    }

    async fn fetch_cover(&self, metadata: &Metadata) -> Option<Cover> {
        let url = metadata.cover_url.as_deref()?;

        let (bytes, content_type) = match self.http.get_bytes(url).await {
            Ok(resp) => resp,
            Err(e) => {
                warn!("封面下载失败: {}", e);
                return None;
            }
        };
        if bytes.is_empty() {
            return None;
        }

        let mime = content_type
            .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_string())
            .filter(|ct| ct.starts_with("image/"))
            .or_else(|| MimeGuess::from_path(url.split('?').next().unwrap_or(url)).first_raw().map(str::to_string))
            .unwrap_or_else(|| "image/jpeg".to_string());

        Some(Cover {
            file_name: cover_file_name(url, &mime),
            mime,
            bytes: bytes.to_vec(),
        })
    }
}
