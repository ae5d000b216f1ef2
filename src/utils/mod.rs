use std::path::Path;

use tokio::fs;
use url::Url;

pub fn to_absolute_url(base: &Url, href: &str) -> String {
    if href.is_empty() {
        return String::new();
    }

    if let Some(path_without_slashes) = href.strip_prefix("//") {
        return format!("{}://{}", base.scheme(), path_without_slashes);
    }

    if href.starts_with("http://") || href.starts_with("https://") {
        return href.to_string();
    }

    base.join(href)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| href.to_string())
}

/// 将书名转换为安全的文件名
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        "untitled".to_string()
    } else {
        cleaned.to_string()
    }
}

/// 依据 URL 推断封面文件名
pub fn cover_file_name(url: &str, mime: &str) -> String {
    let from_url = Path::new(url.split(['?', '#']).next().unwrap_or(url))
        .extension()
        .and_then(|s| s.to_str())
        .filter(|ext| ext.len() <= 5 && !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase());

    let ext = from_url.unwrap_or_else(|| {
        mime_guess::get_mime_extensions_str(mime)
            .and_then(|exts| exts.first())
            .map(|ext| ext.to_string())
            .unwrap_or_else(|| "jpg".to_string())
    });

    format!("cover.{}", ext)
}

pub async fn save_file(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, data).await?;
    Ok(())
}

/// 先写临时文件再重命名，读者不会看到写了一半的文件
pub async fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");

    save_file(&tmp, data).await?;
    fs::rename(&tmp, path).await
}
