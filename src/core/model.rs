use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// 输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Txt,
    Epub,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Txt => "txt",
            OutputFormat::Epub => "epub",
        }
    }
}

/// 书籍元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub title: String,
    pub author: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "zh-CN".to_string()
}

impl Metadata {
    /// 元数据获取失败时的占位信息
    pub fn placeholder(book_id: &str) -> Self {
        Self {
            title: format!("未知小说_{}", book_id),
            author: "未知作者".to_string(),
            description: "无简介".to_string(),
            cover_url: None,
            language: default_language(),
        }
    }
}

/// 章节描述符
///
/// `index` 即 sequence index，由目录接口的权威顺序决定，是输出排序的唯一依据。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub index: usize,
    pub id: String,
    pub title: String,
}

impl Chapter {
    pub fn new(index: usize, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            index,
            id: id.into(),
            title: title.into(),
        }
    }

    /// 目录页缺失标题时的占位标题
    pub fn placeholder_title(index: usize) -> String {
        format!("Chapter {}", index + 1)
    }
}

/// 单章抓取成功的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterResult {
    pub index: usize,
    pub base_title: String,
    /// 多数内容源不返回标题，可能为空
    #[serde(default)]
    pub api_title: String,
    pub content: String,
}

impl ChapterResult {
    pub fn new(chapter: &Chapter, api_title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            index: chapter.index,
            base_title: chapter.title.clone(),
            api_title: api_title.into(),
            content: content.into(),
        }
    }

    /// 输出时使用的章节标题
    pub fn display_title(&self) -> String {
        let api_title = self.api_title.trim();
        let base_title = self.base_title.trim();
        if api_title.is_empty() || base_title.contains(api_title) {
            base_title.to_string()
        } else if base_title.is_empty() {
            api_title.to_string()
        } else {
            format!("{} {}", base_title, api_title)
        }
    }
}

/// 封面图片
#[derive(Debug, Clone)]
pub struct Cover {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
}

/// 交给打包器的有序书稿
#[derive(Debug, Clone)]
pub struct Manuscript {
    pub metadata: Metadata,
    pub cover: Option<Cover>,
    /// 已按 sequence index 升序排列
    pub chapters: Vec<ChapterResult>,
}
