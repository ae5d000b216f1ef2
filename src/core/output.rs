//! 成品输出
//!
//! 打包器只接收已排序的书稿，TXT 与 EPUB 共用同一份输入。

use std::path::{Path, PathBuf};

use tracing::info;

use crate::core::epub::EpubGenerator;
use crate::core::error::{DownloadError, Result};
use crate::core::model::{Manuscript, OutputFormat};
use crate::utils::{sanitize_filename, write_atomic};

/// 成品路径：`{书名}.{txt|epub}`
pub fn artifact_path(output_dir: &Path, title: &str, format: OutputFormat) -> PathBuf {
    output_dir.join(format!("{}.{}", sanitize_filename(title), format.extension()))
}

/// 渲染纯文本
pub fn render_txt(manuscript: &Manuscript) -> String {
    let meta = &manuscript.metadata;
    let mut out = format!(
        "小说名: {}\n作者: {}\n内容简介: {}\n\n",
        meta.title, meta.author, meta.description
    );
    for chapter in &manuscript.chapters {
        out.push_str(&chapter.display_title());
        out.push('\n');
        out.push_str(&chapter.content);
        out.push_str("\n\n");
    }
    out
}

/// 写出成品，返回最终路径
pub async fn write_output(manuscript: &Manuscript, format: OutputFormat, output_dir: &Path) -> Result<PathBuf> {
    let path = artifact_path(output_dir, &manuscript.metadata.title, format);

    match format {
        OutputFormat::Txt => {
            write_atomic(&path, render_txt(manuscript).as_bytes()).await?;
        }
        OutputFormat::Epub => {
            tokio::fs::create_dir_all(output_dir).await?;
            EpubGenerator::new(manuscript)
                .run(&path)
                .await
                .map_err(|e| DownloadError::Epub(e.to_string()))?;
        }
    }

    info!("已写出 {} 个章节: {}", manuscript.chapters.len(), path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::{ChapterResult, Metadata};

    fn manuscript() -> Manuscript {
        let mut metadata = Metadata::placeholder("7");
        metadata.title = "书/名".into();
        Manuscript {
            metadata,
            cover: None,
            chapters: vec![
                ChapterResult {
                    index: 0,
                    base_title: "第1章".into(),
                    api_title: "开端".into(),
                    content: "    甲".into(),
                },
                ChapterResult {
                    index: 2,
                    base_title: "第3章".into(),
                    api_title: String::new(),
                    content: "    丙".into(),
                },
            ],
        }
    }

    #[test]
    fn txt_has_header_and_chapters_in_order() {
        assert_eq!(
            render_txt(&manuscript()),
            "小说名: 书/名\n作者: 未知作者\n内容简介: 无简介\n\n第1章 开端\n    甲\n\n第3章\n    丙\n\n"
        );
    }

    #[tokio::test]
    async fn writes_txt_with_sanitized_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_output(&manuscript(), OutputFormat::Txt, dir.path()).await.unwrap();

        assert_eq!(path, dir.path().join("书_名.txt"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("第3章\n    丙"));
    }
}
