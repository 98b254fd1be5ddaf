//! Plain-text extraction for indexed documents.

use super::types::Document;
use regex::Regex;
use std::sync::LazyLock;

static SCRIPT_OR_STYLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Extract indexable text from a document.
///
/// HTML is stripped of markup and whitespace runs are collapsed. Text shorter than `min_chars`
/// characters is returned as empty so that placeholder bodies never reach the index.
pub fn extract_text(document: &Document, min_chars: usize) -> String {
    let raw = document.text_content.as_str();
    let text = if looks_like_html(document) {
        strip_html(raw)
    } else {
        raw.trim().to_string()
    };

    if text.chars().count() < min_chars {
        tracing::debug!(
            document_id = %document.id,
            chars = text.chars().count(),
            min_chars,
            "Extracted text below minimum length; treating as empty"
        );
        return String::new();
    }
    text
}

fn looks_like_html(document: &Document) -> bool {
    let by_type = document
        .file_type
        .as_deref()
        .is_some_and(|mime| mime.eq_ignore_ascii_case("text/html"));
    let by_name = document.filename.as_deref().is_some_and(|name| {
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".html") || lower.ends_with(".htm")
    });
    let trimmed = document.text_content.trim_start();
    let by_content = trimmed.starts_with('<') || trimmed.contains("<html");
    by_type || by_name || by_content
}

fn strip_html(html: &str) -> String {
    let without_blocks = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_blocks, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}
