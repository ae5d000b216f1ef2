//! 下载进度存储
//!
//! 进度文件只记录已持久化的章节 id (JSON 数组)；章节正文另存于同名旁路目录，
//! 续传时据此重建已完成的章节。只有协调者会写入。

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::core::error::Result;
use crate::utils::{sanitize_filename, write_atomic};

/// 已持久化的章节正文
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredChapter {
    pub id: String,
    #[serde(default)]
    pub api_title: String,
    pub content: String,
}

/// 已持久化的章节 id 集合
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub chapters: HashMap<String, StoredChapter>,
}

impl DownloadProgress {
    pub fn ids(&self) -> BTreeSet<String> {
        self.chapters.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.chapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chapters.is_empty()
    }
}

pub struct ProgressStore {
    progress_file: PathBuf,
    chapter_dir: PathBuf,
}

impl ProgressStore {
    pub fn new(output_dir: &Path, book_id: &str) -> Self {
        let key = sanitize_filename(book_id);
        Self {
            progress_file: output_dir.join(format!("chapter_{}.json", key)),
            chapter_dir: output_dir.join(format!(".chapters_{}", key)),
        }
    }

    pub fn progress_file(&self) -> &Path {
        &self.progress_file
    }

    fn body_path(&self, id: &str) -> PathBuf {
        self.chapter_dir.join(format!("{}.json", sanitize_filename(id)))
    }

    /// 读取进度；文件缺失或损坏都视为空集合，正文缺失的 id 被丢弃
    pub async fn load(&self) -> DownloadProgress {
        let ids: Vec<String> = match fs::read_to_string(&self.progress_file).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(ids) => ids,
                Err(e) => {
                    warn!("进度文件损坏，将重新下载: {}", e);
                    return DownloadProgress::default();
                }
            },
            Err(_) => return DownloadProgress::default(),
        };

        let mut chapters = HashMap::new();
        for id in ids {
            let stored = match fs::read_to_string(self.body_path(&id)).await {
                Ok(text) => serde_json::from_str::<StoredChapter>(&text).ok(),
                Err(_) => None,
            };
            match stored {
                Some(stored) if stored.id == id => {
                    chapters.insert(id, stored);
                }
                _ => debug!("章节 {} 缺少正文，视为未下载", id),
            }
        }

        DownloadProgress { chapters }
    }

    /// 先写新增正文，再原子替换 id 集合
    pub async fn save(&self, new_chapters: &[StoredChapter], ids: &BTreeSet<String>) -> Result<()> {
        for chapter in new_chapters {
            let json = serde_json::to_vec(chapter)?;
            write_atomic(self.body_path(&chapter.id), &json).await?;
        }

        let json = serde_json::to_vec_pretty(&ids.iter().collect::<Vec<_>>())?;
        write_atomic(&self.progress_file, &json).await?;
        Ok(())
    }

    /// 删除进度文件与正文目录
    pub async fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.progress_file).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match fs::remove_dir_all(&self.chapter_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
