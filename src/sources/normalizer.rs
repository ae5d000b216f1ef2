//! 正文规范化 (Content Normalizer)
//!
//! 将内容源返回的原始载荷 (HTML 片段、JSON 内嵌 HTML、转义后的尖括号) 整理为
//! 每段四个空格缩进、单换行分隔的纯文本。该过程不会失败，且对自身输出幂等。

use std::sync::OnceLock;

use regex::Regex;

/// 段落缩进
const INDENT: &str = "    ";

/// 预编译的正则集合
struct Patterns {
    paragraph: Regex,
    header: Regex,
    footer: Regex,
    article: Regex,
    tag: Regex,
    escaped: Regex,
    blank_lines: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

impl Patterns {
    fn get() -> &'static Patterns {
        PATTERNS.get_or_init(|| Patterns {
            paragraph: Regex::new(r#"(?s)<p idx="\d+">(.*?)</p>"#).unwrap(),
            header: Regex::new(r"(?s)<header>.*?</header>").unwrap(),
            footer: Regex::new(r"(?s)<footer>.*?</footer>").unwrap(),
            article: Regex::new(r"</?article>").unwrap(),
            tag: Regex::new(r"<[^>]+>").unwrap(),
            escaped: Regex::new(r"\\u003c|\\u003e").unwrap(),
            blank_lines: Regex::new(r"\n{3,}").unwrap(),
        })
    }
}

/// 规范化章节正文
pub fn normalize(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }

    let p = Patterns::get();

    // 优先使用 <p idx="N"> 段落标记，否则按行切分
    let paragraphs: Vec<&str> = p
        .paragraph
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    let paragraphs = if paragraphs.is_empty() {
        raw.lines().collect()
    } else {
        paragraphs
    };

    let text = indent_lines(paragraphs.iter().flat_map(|para| para.lines()));

    let text = strip_stable(&text, &p.header);
    let text = strip_stable(&text, &p.footer);
    let text = strip_stable(&text, &p.article);
    let text = strip_stable(&text, &p.tag);
    let text = strip_stable(&text, &p.escaped);

    let text = p.blank_lines.replace_all(&text, "\n\n");

    // 去除标签后可能出现空行或缩进被破坏，统一重排
    indent_lines(text.trim().lines())
}

/// 丢弃空行并为每一行重新施加统一缩进
fn indent_lines<'a>(lines: impl Iterator<Item = &'a str>) -> String {
    lines
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// 反复替换直到不再匹配，避免删除后拼接出新的匹配
fn strip_stable(text: &str, pattern: &Regex) -> String {
    let mut current = text.to_string();
    while pattern.is_match(&current) {
        current = pattern.replace_all(&current, "").into_owned();
    }
    current
}
