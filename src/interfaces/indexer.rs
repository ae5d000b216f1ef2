//! 索引器定义
//!
//! 负责书籍元数据、权威章节目录以及封面资源的获取。

use async_trait::async_trait;

use crate::core::error::Result;
use crate::core::model::{Chapter, Cover, Metadata};

/// 索引器 Trait
#[async_trait]
pub trait Indexer: Send + Sync {
    /// 获取书籍元数据
    async fn fetch_metadata(&self, book_id: &str) -> Result<Metadata>;

    /// 获取有序、去重的章节列表
    ///
    /// 失败即致命，不允许返回被截断或重排的列表。
    async fn fetch_chapters(&self, book_id: &str) -> Result<Vec<Chapter>>;

    /// 下载封面 (可选)
    async fn fetch_cover(&self, _metadata: &Metadata) -> Option<Cover> {
        None
    }
}
