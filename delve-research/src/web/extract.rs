//! HTML to text extraction and small text helpers shared by the web tools

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

/// Elements whose content never counts as visible page text
const HIDDEN_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "svg", "header", "footer", "nav", "aside",
];

static HIDDEN_BLOCKS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    HIDDEN_ELEMENTS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("valid element regex")
        })
        .collect()
});
static COMMENTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid comment regex"));
static LINKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["'](https?://[^"']+)["'][^>]*>(.*?)</a\s*>"#)
        .expect("valid link regex")
});
static BLOCK_BREAKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:br|hr|p|/p|div|/div|li|/li|tr|/tr|h[1-6]|/h[1-6]|section|/section|article|/article)\b[^>]*>")
        .expect("valid block regex")
});
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static NUMERIC_ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid entity regex"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{00A0}]+").expect("valid whitespace regex"));

static NUMBERED_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\.\s+\w+").expect("valid numbered regex"));
static BULLET_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-•*]\s+\w+").expect("valid bullet regex"));
static LIST_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:list|top|following|items|examples)\b").expect("valid keyword regex")
});

const LINK_PREVIEW_LIMIT: usize = 10;
/// Pages with this many links or more are treated as navigation-heavy and
/// get no link preview
const LINK_HEAVY_THRESHOLD: usize = 20;
const MIN_LINK_LEN: usize = 10;

/// An outbound link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub text: String,
    pub url: String,
}

/// Decode the handful of named entities common in page text plus numeric ones
pub fn decode_entities(text: &str) -> String {
    let decoded = NUMERIC_ENTITY.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x').or_else(|| raw.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse::<u32>().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    decoded
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&mdash;", "-")
        .replace("&ndash;", "-")
        .replace("&hellip;", "...")
        .replace("&amp;", "&")
}

/// Strip every tag and collapse whitespace; for short inline fragments
pub fn strip_tags(fragment: &str) -> String {
    let text = TAGS.replace_all(fragment, " ");
    let text = decode_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_links(html: &str) -> Vec<PageLink> {
    let mut seen = HashSet::new();
    LINKS
        .captures_iter(html)
        .filter_map(|caps| {
            let url = decode_entities(caps[1].trim());
            let text = strip_tags(&caps[2]);
            (url.len() > MIN_LINK_LEN && !text.is_empty() && seen.insert(url.clone()))
                .then_some(PageLink { text, url })
        })
        .collect()
}

/// Visible text of an HTML page.
///
/// Hidden and boilerplate elements are removed, block elements become line
/// breaks and blank lines are dropped. When the page has only a few
/// outbound links, up to ten of them are listed ahead of the text.
pub fn html_to_text(html: &str) -> String {
    let mut body = COMMENTS.replace_all(html, "").into_owned();
    for block in HIDDEN_BLOCKS.iter() {
        body = block.replace_all(&body, " ").into_owned();
    }

    let links = extract_links(&body);

    let body = BLOCK_BREAKS.replace_all(&body, "\n");
    let body = TAGS.replace_all(&body, " ");
    let body = decode_entities(&body);

    let text = body
        .lines()
        .map(|line| SPACES.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    if links.is_empty() || links.len() >= LINK_HEAVY_THRESHOLD {
        return text;
    }

    let mut output = String::from("IMPORTANT LINKS FOUND:\n");
    for link in links.iter().take(LINK_PREVIEW_LIMIT) {
        output.push_str(&format!("- {}: {}\n", link.text, link.url));
    }
    output.push('\n');
    output.push_str(&text);
    output
}

/// First `max_chars` characters of `text`, with no marker
pub fn clip_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Display excerpt: cut to `max_chars` characters, marking the cut with "..."
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let clipped = clip_chars(text, max_chars);
    if clipped.len() < text.len() {
        format!("{clipped}...")
    } else {
        text.to_string()
    }
}

/// Whether a page looks like it contains a list of items
pub fn contains_list(text: &str) -> bool {
    NUMBERED_ITEM.is_match(text) || BULLET_ITEM.is_match(text) || LIST_KEYWORD.is_match(text)
}

/// Lowercased host without a leading `www.`
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}
