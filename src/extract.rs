//! Plain-text extraction for fetched content (HTML pages, SRT captions).
//!
//! Fetchers hand raw bytes-as-text to this module and get back text that is
//! safe to drop into a prompt: no markup, no caption timing artifacts, and
//! bounded in length.

use regex::Regex;
use std::sync::OnceLock;

/// Maximum characters kept from a page or caption track.
pub const MAX_TEXT_CHARS: usize = 8000;
/// Maximum characters kept from a page or video title.
pub const MAX_TITLE_CHARS: usize = 200;
/// Maximum characters kept from a video description.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// How many previously kept caption lines are checked for repeats.
const CAPTION_DEDUP_WINDOW: usize = 3;

#[derive(Debug)]
pub enum ExtractError {
    /// The document had no extractable text at all.
    Empty,
    /// Content that is not text (e.g. a binary download behind a link).
    NotText(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::Empty => write!(f, "no extractable text"),
            ExtractError::NotText(ct) => write!(f, "not a text document: {}", ct),
        }
    }
}

impl std::error::Error for ExtractError {}

fn script_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex"))
}

fn style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("static regex"))
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

/// A fetched page reduced to title + text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageText {
    pub title: String,
    pub text: String,
}

/// Strips markup from an HTML document and extracts its `<title>`.
///
/// Both fields are capped ([`MAX_TITLE_CHARS`], [`MAX_TEXT_CHARS`]).
pub fn extract_page(html: &str) -> Result<PageText, ExtractError> {
    let title = title_re()
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
        .unwrap_or_default();

    let body = script_re().replace_all(html, "");
    let body = style_re().replace_all(&body, "");
    let body = tag_re().replace_all(&body, " ");
    let text = collapse_whitespace(&decode_entities(&body));

    if text.is_empty() && title.is_empty() {
        return Err(ExtractError::Empty);
    }

    Ok(PageText {
        title: truncate_chars(&title, MAX_TITLE_CHARS).to_string(),
        text: truncate_chars(&text, MAX_TEXT_CHARS).to_string(),
    })
}

/// Rejects content types that cannot be fed to [`extract_page`].
pub fn check_content_type(content_type: Option<&str>) -> Result<(), ExtractError> {
    match content_type {
        None => Ok(()),
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            if ct.starts_with("text/") || ct.contains("html") || ct.contains("xml") {
                Ok(())
            } else {
                Err(ExtractError::NotText(ct))
            }
        }
    }
}

/// Turns an SRT caption track into running text.
///
/// Drops cue numbers, `-->` timing lines and blank lines, and skips a line
/// when it repeats one of the last few kept lines (auto-captions roll).
pub fn clean_captions(srt: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for line in srt.lines() {
        let line = line.trim();
        if line.is_empty() || line.contains("-->") {
            continue;
        }
        if line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        let window_start = kept.len().saturating_sub(CAPTION_DEDUP_WINDOW);
        if kept[window_start..].contains(&line) {
            continue;
        }
        kept.push(line);
    }
    let joined = kept.join(" ");
    truncate_chars(&joined, MAX_TEXT_CHARS).to_string()
}

/// Returns at most `max` characters of `s`, never splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn collapse_whitespace(s: &str) -> String {
    whitespace_re().replace_all(s, " ").trim().to_string()
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><title> Release   notes </title>
            <style>body { color: red; }</style>
            <script type="text/javascript">var x = "<p>hidden</p>";</script></head>
            <body><h1>Deploy</h1><p>Run &amp; verify&nbsp;the <b>build</b>.</p></body></html>"#;
        let page = extract_page(html).unwrap();
        assert_eq!(page.title, "Release notes");
        assert!(page.text.contains("Deploy Run & verify the build ."));
        assert!(!page.text.contains("hidden"));
        assert!(!page.text.contains("color"));
    }

    #[test]
    fn empty_document_is_an_error() {
        assert!(matches!(
            extract_page("<html><body>  </body></html>"),
            Err(ExtractError::Empty)
        ));
    }

    #[test]
    fn text_is_capped() {
        let html = format!("<p>{}</p>", "a".repeat(MAX_TEXT_CHARS * 2));
        let page = extract_page(&html).unwrap();
        assert_eq!(page.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn caption_cleanup() {
        let srt = "1\n00:00:01,000 --> 00:00:02,000\nhello there\n\n2\n00:00:02,000 --> 00:00:03,000\nhello there\ngeneral\n\n3\n00:00:03,000 --> 00:00:04,000\nkenobi\n";
        assert_eq!(clean_captions(srt), "hello there general kenobi");
    }

    #[test]
    fn caption_repeat_outside_window_is_kept() {
        let srt = "a\nb\nc\nd\na\n";
        assert_eq!(clean_captions(srt), "a b c d a");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn content_type_filter() {
        assert!(check_content_type(None).is_ok());
        assert!(check_content_type(Some("text/html; charset=utf-8")).is_ok());
        assert!(check_content_type(Some("application/xhtml+xml")).is_ok());
        assert!(check_content_type(Some("application/pdf")).is_err());
    }
}
