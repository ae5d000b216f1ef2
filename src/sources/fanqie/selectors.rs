//! 番茄小说选择器
//!
//! 预编译的 CSS 选择器与正则

use std::sync::OnceLock;

use regex::Regex;
use scraper::Selector;

/// 站点选择器集合
pub struct SiteSelectors {
    pub chapter_item: Selector,
    pub anchor: Selector,
    pub title: Selector,
    pub author: Selector,
    pub abstract_paragraph: Selector,
    pub abstract_block: Selector,
    pub og_image: Selector,
    pub cover_imgs: Vec<Selector>,
    /// 已有的 "第X章" 前缀
    pub chapter_prefix: Regex,
    /// 无需重编号的特殊章节
    pub special_prefix: Regex,
    pub title_suffix: Regex,
    pub author_suffix: Regex,
    pub abstract_prefix: Regex,
    pub whitespace: Regex,
}

static SELECTORS: OnceLock<SiteSelectors> = OnceLock::new();

impl SiteSelectors {
    /// 获取全局选择器实例
    pub fn get() -> &'static SiteSelectors {
        SELECTORS.get_or_init(|| SiteSelectors {
            chapter_item: Selector::parse("div.chapter-item").unwrap(),
            anchor: Selector::parse("a").unwrap(),
            title: Selector::parse("h1").unwrap(),
            author: Selector::parse(".author-name-text").unwrap(),
            abstract_paragraph: Selector::parse(".page-abstract-content p").unwrap(),
            abstract_block: Selector::parse(".page-abstract-content").unwrap(),
            og_image: Selector::parse("meta[property='og:image']").unwrap(),
            cover_imgs: vec![
                Selector::parse(".book-cover img").unwrap(),
                Selector::parse(".muye-book-cover img").unwrap(),
            ],
            chapter_prefix: Regex::new(r"^第[一二三四五六七八九十百千\d]+章\s*").unwrap(),
            special_prefix: Regex::new(r"^(番外|特别篇|if线)").unwrap(),
            title_suffix: Regex::new(r"[-|_].*$").unwrap(),
            author_suffix: Regex::new(r"\s*/\s*著").unwrap(),
            abstract_prefix: Regex::new(r"^作品简介\s*").unwrap(),
            whitespace: Regex::new(r"\s+").unwrap(),
        })
    }
}
