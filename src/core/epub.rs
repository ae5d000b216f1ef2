//! EPUB 编译引擎 (EPUB Compilation Engine)
//!
//! 负责将有序书稿序列化为 EPUB 容器：元数据、封面、书籍信息页以及每章一个 XHTML 文档。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use epub_builder::{EpubBuilder, EpubContent, ReferenceType, ZipLibrary};
use quick_xml::escape::escape;

use crate::core::model::{ChapterResult, Manuscript};

/// EPUB 文档生成器
pub struct EpubGenerator<'a> {
    /// 待编译的书稿
    manuscript: &'a Manuscript,
    /// 内部文本资源路径映射
    chapter_dir: String,
}

impl<'a> EpubGenerator<'a> {
    pub fn new(manuscript: &'a Manuscript) -> Self {
        Self {
            manuscript,
            chapter_dir: "Text".to_string(),
        }
    }

    /// 执行文档编译流水线
    pub async fn run(&self, output_path: &Path) -> Result<PathBuf> {
        let mut builder = EpubBuilder::new(ZipLibrary::new().map_err(|e| anyhow::anyhow!(e))?)
            .map_err(|e| anyhow::anyhow!(e))?;

        self.configure_metadata(&mut builder)?;
        self.add_book_info(&mut builder)?;
        for chapter in &self.manuscript.chapters {
            self.add_chapter(&mut builder, chapter)?;
        }

        let final_path = output_path.to_path_buf();
        let final_path_clone = final_path.clone();
        // ZIP 压缩是 CPU 密集型任务，放到阻塞线程池
        tokio::task::spawn_blocking(move || -> Result<()> {
            let file = std::fs::File::create(&final_path_clone)
                .with_context(|| format!("Failed to create artifact: {:?}", final_path_clone))?;
            builder.generate(file).map_err(|e| anyhow::anyhow!(e))?;
            Ok(())
        })
        .await
        .map_err(|e| anyhow::anyhow!("Worker join error: {}", e))??;

        Ok(final_path)
    }

    /// 注入书籍元数据 (Dublin Core Metadata)
    fn configure_metadata(&self, builder: &mut EpubBuilder<ZipLibrary>) -> Result<()> {
        let meta = &self.manuscript.metadata;

        builder.set_title(&meta.title);
        builder.add_author(&meta.author);
        builder.set_description(vec![meta.description.clone()]);
        builder.set_languages(vec![meta.language.clone()]);

        if let Some(cover) = &self.manuscript.cover {
            builder
                .add_cover_image(&cover.file_name, cover.bytes.as_slice(), &cover.mime)
                .map_err(|e| anyhow::anyhow!(e))?;
        }

        Ok(())
    }

    /// 书籍信息页
    fn add_book_info(&self, builder: &mut EpubBuilder<ZipLibrary>) -> Result<()> {
        let meta = &self.manuscript.metadata;
        let body = format!(
            "<h1>{}</h1>\n<p>作者: {}</p>\n<div id=\"description\">\n{}\n</div>",
            escape(meta.title.as_str()),
            escape(meta.author.as_str()),
            paragraphs(&meta.description)
        );

        let file_name = format!("{}/info.xhtml", self.chapter_dir);
        let xhtml = self.wrap_html(&meta.title, &body);
        builder
            .add_content(
                EpubContent::new(&file_name, xhtml.as_bytes())
                    .title("书籍信息")
                    .reftype(ReferenceType::TitlePage),
            )
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    /// 添加章节实体并执行 HTML 内容包装
    fn add_chapter(&self, builder: &mut EpubBuilder<ZipLibrary>, chapter: &ChapterResult) -> Result<()> {
        let title = chapter.display_title();
        let file_name = format!("{}/chapter_{:05}.xhtml", self.chapter_dir, chapter.index + 1);
        let content = format!(
            "<h1>{}</h1>\n<div id=\"content\">\n{}\n</div>",
            escape(title.as_str()),
            paragraphs(&chapter.content)
        );

        let xhtml = self.wrap_html(&title, &content);
        builder
            .add_content(EpubContent::new(&file_name, xhtml.as_bytes()).title(&title))
            .map_err(|e| anyhow::anyhow!(e))?;
        Ok(())
    }

    /// 应用 XHTML 1.1 标准模板包装
    fn wrap_html(&self, title: &str, body: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{}">
<head>
    <meta http-equiv="Content-Type" content="application/xhtml+xml; charset=utf-8" />
    <title>{}</title>
</head>
<body>
{}
</body>
</html>"#,
            self.manuscript.metadata.language,
            escape(title),
            body
        )
    }
}

/// 每个非空行转为一个转义后的段落
fn paragraphs(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{}</p>", escape(line)))
        .collect::<Vec<_>>()
        .join("\n")
}
