//! Strips non-indexable regions out of a page's raw HTML and pulls out the
//! title/description/keywords/body text that feed the tokenizer.
//!
//! Malformed markup (an unterminated `<script>`, `<style>`, or
//! `indexer::stop` region) is recovered locally: stripping of that region
//! kind just stops and the remainder is kept verbatim.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::collections::HashSet;

use crate::hooks::{HookRegistry, PageMetadata};
use crate::model::ExtractedPage;

static NBSP_LIKE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)&#160;|&nbsp;").unwrap());
static SHY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)&shy;").unwrap());

static SCRIPT_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>").unwrap());
static SCRIPT_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</script\s*>").unwrap());
static STYLE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>").unwrap());
static STYLE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</style\s*>").unwrap());

static STOP_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!--\s*indexer::stop\s*-->").unwrap());
static CONTINUE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!--\s*indexer::continue\s*-->").unwrap());

static HEAD_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</head\s*>").unwrap());

static META_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").unwrap());
static ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)([a-zA-Z][\w-]*)\s*=\s*"([^"]*)"|([a-zA-Z][\w-]*)\s*=\s*'([^']*)'"#).unwrap()
});
static TITLE_OR_ALT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\b(?:title|alt)\s*=\s*"([^"]*)"|\b(?:title|alt)\s*=\s*'([^']*)'"#).unwrap()
});

static BR_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\b").unwrap());
static ADJACENT_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"><").unwrap());
static ANY_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<[^>]*>").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        HtmlExtractor
    }

    /// Run the full extraction pipeline: normalize whitespace and entities,
    /// strip scripts/styles/indexer markers, split head from body, and pull
    /// out title/description/keywords/body text.
    ///
    /// `metadata.title` is the caller-supplied page title, not an HTML
    /// `<title>` tag; the document has none of its own in this data model.
    pub fn extract(
        &self,
        raw_html: &str,
        metadata: &PageMetadata<'_>,
        given_filesize: Option<&str>,
        hooks: &HookRegistry,
    ) -> ExtractedPage {
        let normalized = normalize_whitespace_entities(raw_html);
        let no_scripts = strip_balanced(&normalized, &SCRIPT_OPEN, &SCRIPT_CLOSE);
        let no_styles = strip_balanced(&no_scripts, &STYLE_OPEN, &STYLE_CLOSE);
        let mut cleaned = strip_stop_continue(&no_styles);

        let extra_terms = hooks.run(&mut cleaned, metadata);

        let (head, body) = split_head_body(&cleaned);

        let description = meta_content(&head, "description");
        let mut keywords = meta_content(&head, "keywords");

        let title_alt = extract_title_alt(&body);
        if !title_alt.is_empty() {
            if keywords.is_empty() {
                keywords = title_alt;
            } else {
                keywords.push_str(", ");
                keywords.push_str(&title_alt);
            }
        }

        let mut body_text = insert_tag_boundary_spaces(&body);
        body_text = ANY_TAG.replace_all(&body_text, " ").into_owned();

        if !extra_terms.is_empty() {
            body_text.push(' ');
            body_text.push_str(&extra_terms.join(" "));
        }

        let assembled = format!(
            "{} {} {} {}",
            metadata.title, description, body_text, keywords
        );
        let text = collapse_spaces(&decode_entities(&assembled));

        let filesize = given_filesize
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("{:.2}", raw_html.len() as f64 / 1024.0));

        ExtractedPage {
            text,
            description,
            keywords,
            filesize,
        }
    }
}

fn normalize_whitespace_entities(html: &str) -> String {
    let replaced = html.replace(['\n', '\r', '\t'], " ");
    let replaced = NBSP_LIKE.replace_all(&replaced, " ");
    SHY.replace_all(&replaced, "").into_owned()
}

/// Iteratively remove `open..close` regions, replacing each with a single
/// space. Stops (leaving the remainder verbatim) the first time an `open`
/// has no matching `close`.
fn strip_balanced(html: &str, open: &Regex, close: &Regex) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    loop {
        match open.find_at(html, pos) {
            None => {
                out.push_str(&html[pos..]);
                return out;
            }
            Some(open_m) => match close.find_at(html, open_m.end()) {
                None => {
                    log::warn!(
                        "html extraction: unterminated tag at offset {}, leaving remainder verbatim",
                        open_m.start()
                    );
                    out.push_str(&html[pos..]);
                    return out;
                }
                Some(close_m) => {
                    out.push_str(&html[pos..open_m.start()]);
                    out.push(' ');
                    pos = close_m.end();
                }
            },
        }
    }
}

/// Remove regions bracketed by nested `indexer::stop`/`indexer::continue`
/// markers. An unterminated `stop` ends processing, leaving it and
/// everything after it verbatim.
fn strip_stop_continue(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    loop {
        match STOP_MARKER.find_at(html, pos) {
            None => {
                out.push_str(&html[pos..]);
                return out;
            }
            Some(stop_m) => {
                out.push_str(&html[pos..stop_m.start()]);

                let mut depth = 1usize;
                let mut scan = stop_m.end();
                let end = loop {
                    let next_stop = STOP_MARKER.find_at(html, scan);
                    let next_continue = CONTINUE_MARKER.find_at(html, scan);
                    match (next_stop, next_continue) {
                        (_, None) => break None,
                        (Some(s), Some(c)) if s.start() < c.start() => {
                            depth += 1;
                            scan = s.end();
                        }
                        (_, Some(c)) => {
                            depth -= 1;
                            scan = c.end();
                            if depth == 0 {
                                break Some(scan);
                            }
                        }
                    }
                };

                match end {
                    Some(e) => {
                        out.push(' ');
                        pos = e;
                    }
                    None => {
                        log::warn!(
                            "html extraction: unterminated indexer::stop at offset {}, leaving remainder verbatim",
                            stop_m.start()
                        );
                        out.push_str(&html[stop_m.start()..]);
                        return out;
                    }
                }
            }
        }
    }
}

fn split_head_body(html: &str) -> (String, String) {
    match HEAD_CLOSE.find(html) {
        Some(m) => (html[..m.start()].to_string(), html[m.end()..].to_string()),
        None => (String::new(), html.to_string()),
    }
}

fn parse_attrs(tag: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for caps in ATTR.captures_iter(tag) {
        if let (Some(name), Some(value)) = (caps.get(1), caps.get(2)) {
            attrs.insert(name.as_str().to_ascii_lowercase(), value.as_str().to_string());
        } else if let (Some(name), Some(value)) = (caps.get(3), caps.get(4)) {
            attrs.insert(name.as_str().to_ascii_lowercase(), value.as_str().to_string());
        }
    }
    attrs
}

fn meta_content(head: &str, name: &str) -> String {
    for m in META_TAG.find_iter(head) {
        let attrs = parse_attrs(m.as_str());
        let matches_name = attrs
            .get("name")
            .map(|n| n.eq_ignore_ascii_case(name))
            .unwrap_or(false);

        if matches_name {
            if let Some(content) = attrs.get("content") {
                return collapse_spaces(&decode_entities(content));
            }
        }
    }
    String::new()
}

/// All `title="…"`/`alt="…"` values in document order, deduplicated.
fn extract_title_alt(body: &str) -> String {
    let mut seen = HashSet::new();
    let mut values = Vec::new();

    for caps in TITLE_OR_ALT.captures_iter(body) {
        let raw = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
        if let Some(raw) = raw {
            let decoded = collapse_spaces(&decode_entities(raw));
            if !decoded.is_empty() && seen.insert(decoded.clone()) {
                values.push(decoded);
            }
        }
    }

    values.join(", ")
}

fn insert_tag_boundary_spaces(body: &str) -> String {
    let with_br_spacing = BR_TAG.replace_all(body, " <br");
    ADJACENT_TAGS.replace_all(&with_br_spacing, "> <").into_owned()
}

fn decode_entities(s: &str) -> String {
    htmlescape::decode_html(s).unwrap_or_else(|_| s.to_string())
}

fn collapse_spaces(s: &str) -> String {
    WHITESPACE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata<'a>() -> PageMetadata<'a> {
        PageMetadata {
            url: "https://example.com/",
            pid: 1,
            title: "",
            language: "en",
            protected: false,
            groups: "",
        }
    }

    #[test]
    fn strips_script_blocks() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let page = extractor.extract(
            "<p>Hi<script>x</script>there</p>",
            &metadata(),
            None,
            &hooks,
        );
        assert_eq!(page.text, "Hi there");
    }

    #[test]
    fn strips_nested_stop_continue_markers() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let html = "<p>A<!-- indexer::stop -->B<!-- indexer::stop -->C<!-- indexer::continue -->D<!-- indexer::continue -->E</p>";
        let page = extractor.extract(html, &metadata(), None, &hooks);
        assert_eq!(page.text, "A E");
    }

    #[test]
    fn extracts_title_and_alt_into_keywords() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let page = extractor.extract(
            "<html><body><img alt=\"cat\" title=\"pet\"></body></html>",
            &metadata(),
            None,
            &hooks,
        );
        assert_eq!(page.keywords, "cat, pet");
    }

    #[test]
    fn unterminated_script_keeps_remainder_verbatim() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let page = extractor.extract("<p>Hi<script>oops</p>", &metadata(), None, &hooks);
        assert!(page.text.contains("Hi"));
    }

    #[test]
    fn computed_filesize_falls_back_to_kilobytes() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let html = "<p>hello</p>";
        let page = extractor.extract(html, &metadata(), None, &hooks);
        assert_eq!(page.filesize, format!("{:.2}", html.len() as f64 / 1024.0));
    }

    #[test]
    fn supplied_filesize_is_kept_verbatim() {
        let extractor = HtmlExtractor::new();
        let hooks = HookRegistry::new();
        let page = extractor.extract("<p>hi</p>", &metadata(), Some("12.34"), &hooks);
        assert_eq!(page.filesize, "12.34");
    }
}
