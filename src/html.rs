//! Outbound link extraction built on `lol_html`.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use lol_html::html_content::TextType;
use lol_html::{doc_text, element, HtmlRewriter, MemorySettings, OutputSink, Settings};
use regex::Regex;
use url::Url;

use crate::error::ParseError;

/// Upper bound on rewriter buffering per page.
const MAX_REWRITER_MEMORY: usize = 16 * 1024 * 1024;

/// Returns the distinct hosts `raw_html` links to, excluding `source_host`.
///
/// Both `href` targets and bare `http(s)://` URLs in visible text count; URLs
/// inside `<script>`, `<style>` and other raw-text elements do not. Relative,
/// protocol-relative and non-HTTP links are skipped.
pub fn extract_edges(raw_html: &str, source_host: &str) -> Result<BTreeSet<String>, ParseError> {
    if raw_html.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    if raw_html.contains('\0') {
        return Err(ParseError::BinaryContent);
    }

    let mut hrefs: Vec<String> = Vec::new();
    let mut text_urls: Vec<String> = Vec::new();
    let mut text_node = String::new();

    {
        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: vec![element!("a[href]", |el| {
                    if let Some(href) = el.get_attribute("href") {
                        hrefs.push(href);
                    }
                    Ok(())
                })],
                document_content_handlers: vec![doc_text!(|chunk| {
                    // Script, style and other raw-text content is not page text.
                    if !matches!(chunk.text_type(), TextType::Data) {
                        return Ok(());
                    }
                    text_node.push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        text_urls.extend(bare_urls(&text_node));
                        text_node.clear();
                    }
                    Ok(())
                })],
                memory_settings: MemorySettings {
                    max_allowed_memory_usage: MAX_REWRITER_MEMORY,
                    ..MemorySettings::default()
                },
                ..Settings::default()
            },
            NoopSink,
        );
        rewriter.write(raw_html.as_bytes())?;
        rewriter.end()?;
    }

    let source = source_host.trim().to_ascii_lowercase();
    let destinations = hrefs
        .iter()
        .chain(text_urls.iter())
        .filter_map(|link| link_host(link))
        .filter(|host| *host != source)
        .collect();
    Ok(destinations)
}

/// Host key for an absolute HTTP(S) URL: lowercase host plus any explicit
/// non-default port.
pub fn link_host(link: &str) -> Option<String> {
    let url = Url::parse(link.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

fn bare_urls(text: &str) -> impl Iterator<Item = String> + '_ {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"https?://[^\s<>"'()\[\]{}]+"#).expect("bare url pattern")
    });
    pattern.find_iter(text).map(|found| {
        found
            .as_str()
            .trim_end_matches(['.', ',', ';', ':', '!', '?'])
            .to_string()
    })
}

struct NoopSink;

impl OutputSink for NoopSink {
    fn handle_chunk(&mut self, _chunk: &[u8]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(html: &str, source: &str) -> Vec<String> {
        extract_edges(html, source).unwrap().into_iter().collect()
    }

    #[test]
    fn collects_distinct_external_hosts() {
        let html = r#"
            <a href="https://partner.org/a">A</a>
            <a href="https://partner.org/b">B</a>
            <a href="http://Other.COM/x?y=1">C</a>
        "#;
        assert_eq!(hosts(html, "example.edu"), vec!["other.com", "partner.org"]);
    }

    #[test]
    fn excludes_self_loops() {
        let html = r#"
            <a href="https://example.edu/people">People</a>
            <a href="https://EXAMPLE.edu/">Home</a>
            Mirror at https://example.edu/mirror.
        "#;
        assert!(hosts(html, "example.edu").is_empty());
    }

    #[test]
    fn skips_relative_and_non_http_links() {
        let html = r#"
            <a href="/about">About</a>
            <a href="//cdn.example.net/x.js">CDN</a>
            <a href="mailto:lab@example.edu">Mail</a>
            <a href="javascript:void(0)">JS</a>
            <a href="ftp://files.example.net/">FTP</a>
            <a>No target</a>
        "#;
        assert!(hosts(html, "example.edu").is_empty());
    }

    #[test]
    fn picks_up_bare_urls_in_text() {
        let html = "<p>Visit http://external.org for details, or (https://docs.example.net/guide).</p>";
        assert_eq!(
            hosts(html, "example.edu"),
            vec!["docs.example.net", "external.org"]
        );
    }

    #[test]
    fn ignores_urls_inside_scripts_and_styles() {
        let html = r#"
            <script>var tracker = "https://tracker.example.com/pixel.js";</script>
            <style>body { background: url(https://cdn.styles.example.net/bg.png); }</style>
            <a href="https://partner.org/">Partner</a>
        "#;
        assert_eq!(hosts(html, "example.edu"), vec!["partner.org"]);
    }

    #[test]
    fn keeps_explicit_ports() {
        assert_eq!(
            link_host("http://data.example.org:8080/path").as_deref(),
            Some("data.example.org:8080")
        );
        assert_eq!(
            link_host("https://data.example.org:443/path").as_deref(),
            Some("data.example.org")
        );
    }

    #[test]
    fn empty_body_is_a_parse_error() {
        assert_eq!(extract_edges("", "example.edu"), Err(ParseError::EmptyDocument));
    }
}
