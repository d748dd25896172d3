//! Minimal regex-based HTML field extraction. The sources we scrape are
//! simple article pages; a full DOM parser is not worth the dependency.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static HREF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static H1_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("valid regex"));

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<time[^>]+datetime\s*=\s*["']([^"']+)["']"#).expect("valid regex")
});

static META_PUBLISHED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+property\s*=\s*["']article:published_time["'][^>]+content\s*=\s*["']([^"']+)["']"#)
        .expect("valid regex")
});

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").expect("valid regex")
});

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Pull every link whose href contains `pattern`, resolved against `base_url`,
/// preserving page order and dropping duplicates.
pub fn extract_links_by_pattern(html: &str, base_url: &str, pattern: &str) -> Vec<String> {
    let base = match Url::parse(base_url) {
        Ok(b) => b,
        Err(_) => return Vec::new(),
    };

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for cap in HREF_RE.captures_iter(html) {
        let href = &cap[1];
        if !href.contains(pattern) {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            let link = resolved.to_string();
            if seen.insert(link.clone()) {
                links.push(link);
            }
        }
    }
    links
}

/// Article title: first `<h1>`, falling back to `<title>`.
pub fn extract_title(html: &str) -> Option<String> {
    let raw = H1_RE
        .captures(html)
        .or_else(|| TITLE_RE.captures(html))
        .map(|c| c[1].to_string())?;
    let title = collapse_whitespace(&decode_entities(&strip_tags_raw(&raw)));
    (!title.is_empty()).then_some(title)
}

/// Published-date hint: `<time datetime="...">` or the article:published_time
/// meta tag. Returned verbatim; the extractor owns date parsing.
pub fn extract_published_hint(html: &str) -> Option<String> {
    TIME_RE
        .captures(html)
        .or_else(|| META_PUBLISHED_RE.captures(html))
        .map(|c| c[1].trim().to_string())
}

/// Strip markup and collapse whitespace, truncating to `max_chars`.
pub fn extract_text(html: &str, max_chars: usize) -> String {
    let without_blocks = SCRIPT_STYLE_RE.replace_all(html, " ");
    let text = collapse_whitespace(&decode_entities(&strip_tags_raw(&without_blocks)));
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text,
    }
}

fn strip_tags_raw(html: &str) -> String {
    TAG_RE.replace_all(html, " ").to_string()
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_links_in_order() {
        let html = r#"
            <a href="/posts/acme-rekt/">Acme</a>
            <a href="/about">About</a>
            <a href="https://rekt.news/posts/widget-rekt/">Widget</a>
            <a href="/posts/acme-rekt/">Acme again</a>
        "#;
        let links = extract_links_by_pattern(html, "https://rekt.news/", "/posts/");
        assert_eq!(
            links,
            vec![
                "https://rekt.news/posts/acme-rekt/",
                "https://rekt.news/posts/widget-rekt/",
            ]
        );
    }

    #[test]
    fn title_prefers_h1_over_title_tag() {
        let html = "<title>Site - Post</title><h1 class=\"post\">Acme &amp; Co Drained</h1>";
        assert_eq!(extract_title(html).as_deref(), Some("Acme & Co Drained"));
    }

    #[test]
    fn published_hint_from_time_element() {
        let html = r#"<time datetime="2024-03-01T12:00:00Z">March 1</time>"#;
        assert_eq!(
            extract_published_hint(html).as_deref(),
            Some("2024-03-01T12:00:00Z")
        );
    }

    #[test]
    fn text_drops_scripts_and_truncates() {
        let html = "<p>Funds were drained.</p><script>var x = 1;</script><p>Post-mortem soon.</p>";
        let text = extract_text(html, 20);
        assert_eq!(text, "Funds were drained.");
        assert!(!text.contains("var x"));
    }
}
