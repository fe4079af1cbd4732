//! HTML-to-Markdown conversion and sanitization.
//!
//! The conversion algorithm itself is the `mdka` crate; this module is the
//! narrow interface the extractor goes through, plus two cleanup passes the
//! raw conversion needs before the text is fit for chat rendering.

use std::sync::OnceLock;

use regex::Regex;

/// Structural tags the converter can leave behind. Their markup is dropped,
/// their contents kept.
pub const DISALLOWED_TAGS: &[&str] = &["div"];

/// Convert a fragment of rich HTML into Markdown.
pub fn to_markdown(html: &str) -> String {
    mdka::from_html(html)
}

/// Run the full conversion: Markdown conversion, leftover-tag stripping,
/// and link flattening.
pub fn render(html: &str) -> String {
    flatten_url_links(&strip_container_tags(&to_markdown(html), DISALLOWED_TAGS))
}

/// Strip the given tags from `input`, keeping their contents.
///
/// Only the tag markup itself (`<div ...>`, `</div>`) is removed; text and
/// any other tags pass through untouched. Tag names are matched
/// case-insensitively.
pub fn strip_container_tags(input: &str, tags: &[&str]) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('>') {
            Some(end) => {
                let raw = &after[..end];
                let name = raw
                    .trim_start_matches('/')
                    .split(['/', ' ', '\t', '\r', '\n'])
                    .next()
                    .unwrap_or("")
                    .to_ascii_lowercase();
                if !tags.contains(&name.as_str()) {
                    out.push('<');
                    out.push_str(raw);
                    out.push('>');
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated tag: keep the raw text as-is.
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

fn url_text_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[https?://[^\]\s]+\]\((https?://[^)\s]+)\)").expect("valid link pattern")
    })
}

/// Collapse `[https://url](https://url)`-style links to the bare target.
/// Discord refuses to render a Markdown link whose text is itself a URL.
pub fn flatten_url_links(markup: &str) -> String {
    url_text_link_re().replace_all(markup, "$1").to_string()
}
