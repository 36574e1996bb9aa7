//! Boilerplate removal: segments HTML into text blocks, classifies each block,
//! and keeps genuine prose in document order.

use ego_tree::iter::Edge;
use ego_tree::NodeRef;
use scraper::node::{Element, Node};
use scraper::{Html, Selector};
use serde::Serialize;

use crate::error::ParseError;
use crate::stoplist;

/// Tags whose content never becomes text.
const SKIP_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "head", "iframe", "object", "select",
];

/// Tags that start and end a text block.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "caption", "center", "dd", "details",
    "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "menu", "nav", "ol", "p", "pre",
    "section", "summary", "table", "td", "th", "tr", "ul",
];

/// Tags that mark page furniture.
const FURNITURE_TAGS: &[&str] = &["nav", "header", "footer", "aside", "form", "menu"];

/// Class/id tokens that mark page furniture.
const FURNITURE_TOKENS: &[&str] = &[
    "ad", "ads", "advert", "advertisement", "banner", "breadcrumb", "breadcrumbs", "cookie",
    "cookies", "footer", "masthead", "menu", "nav", "navbar", "navigation", "share", "sidebar",
    "skip", "skiplink", "social", "topbar",
];

/// Context-free verdict for a single block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockClass {
    /// Boilerplate; always dropped.
    Bad,
    /// Prose; always kept.
    Good,
    /// Too short to judge on its own.
    Short,
    /// Borderline prose.
    NearGood,
}

/// Contiguous text-bearing region of a document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    /// Whitespace-collapsed text.
    pub text: String,
    /// Fraction of the text's characters inside anchors.
    pub link_density: f64,
    /// Fraction of words found in the stop-word list.
    pub stopword_density: f64,
    /// Number of whitespace separated words.
    pub word_count: usize,
    /// True when the block sits inside navigation or other page furniture.
    pub furniture: bool,
}

impl TextBlock {
    /// Computes block statistics from collapsed text and the anchor character count.
    pub fn new(text: String, link_chars: usize, furniture: bool) -> Self {
        let char_count = text.chars().count();
        let link_density = if char_count == 0 {
            0.0
        } else {
            (link_chars as f64 / char_count as f64).min(1.0)
        };

        let mut word_count = 0usize;
        let mut stop_words = 0usize;
        for word in text.split_whitespace() {
            word_count += 1;
            if stoplist::is_stop_word(&fold_word(word)) {
                stop_words += 1;
            }
        }
        let stopword_density = if word_count == 0 {
            0.0
        } else {
            stop_words as f64 / word_count as f64
        };

        Self {
            text,
            link_density,
            stopword_density,
            word_count,
            furniture,
        }
    }
}

/// Normalization tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationConfig {
    /// Blocks with a higher link density are boilerplate.
    pub max_link_density: f64,
    /// Blocks with fewer words are SHORT (or BAD).
    pub length_low: usize,
    /// Minimum stop-word density for NEAR_GOOD.
    pub stopwords_low: f64,
    /// Minimum stop-word density for GOOD.
    pub stopwords_high: f64,
    /// Cap on the number of recorded blocks to avoid runaway memory use.
    pub max_blocks: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            max_link_density: 0.2,
            length_low: 7,
            stopwords_low: 0.10,
            stopwords_high: 0.20,
            max_blocks: 8192,
        }
    }
}

/// Stateless HTML boilerplate remover.
#[derive(Debug, Clone)]
pub struct Normalizer {
    config: NormalizationConfig,
    body: Selector,
}

impl Normalizer {
    /// Builds a new normalizer instance.
    pub fn new(config: NormalizationConfig) -> Self {
        Self {
            config,
            body: Selector::parse("body").expect("body selector"),
        }
    }

    /// Returns the underlying config reference.
    pub fn config(&self) -> &NormalizationConfig {
        &self.config
    }

    /// Strips boilerplate and returns the surviving blocks joined by single spaces.
    pub fn normalize(&self, raw_html: &str) -> Result<String, ParseError> {
        let blocks = self.segment(raw_html)?;
        let classes: Vec<BlockClass> = blocks.iter().map(|block| self.classify(block)).collect();
        let kept = context_pass(&classes);

        let text = blocks
            .iter()
            .zip(kept)
            .filter_map(|(block, keep)| keep.then_some(block.text.as_str()))
            .collect::<Vec<_>>()
            .join(" ");
        Ok(text)
    }

    /// Splits a document into text blocks along block-level tag boundaries.
    pub fn segment(&self, raw_html: &str) -> Result<Vec<TextBlock>, ParseError> {
        check_markup(raw_html)?;
        let document = Html::parse_document(raw_html);
        let root = document
            .select(&self.body)
            .next()
            .unwrap_or_else(|| document.root_element());

        let mut collector = BlockCollector::new(self.config.max_blocks);
        collector.walk(*root);
        Ok(collector.finish())
    }

    /// Context-free classification of one block.
    pub fn classify(&self, block: &TextBlock) -> BlockClass {
        let cfg = &self.config;
        if block.furniture || block.link_density > cfg.max_link_density {
            return BlockClass::Bad;
        }
        if block.text.contains('©') {
            return BlockClass::Bad;
        }
        if block.word_count < cfg.length_low {
            if block.link_density > 0.0 || block.stopword_density < cfg.stopwords_low {
                return BlockClass::Bad;
            }
            return BlockClass::Short;
        }
        if block.stopword_density >= cfg.stopwords_high {
            BlockClass::Good
        } else if block.stopword_density >= cfg.stopwords_low {
            BlockClass::NearGood
        } else {
            BlockClass::Bad
        }
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(NormalizationConfig::default())
    }
}

/// Decides which blocks survive.
///
/// GOOD blocks stay and BAD blocks go. A SHORT or NEAR_GOOD block stays only when
/// an immediate neighbour is GOOD; promotions are judged on the context-free
/// classes, so they never cascade.
pub fn context_pass(classes: &[BlockClass]) -> Vec<bool> {
    classes
        .iter()
        .enumerate()
        .map(|(idx, class)| match class {
            BlockClass::Good => true,
            BlockClass::Bad => false,
            BlockClass::Short | BlockClass::NearGood => {
                let prev = idx
                    .checked_sub(1)
                    .and_then(|prev| classes.get(prev))
                    .copied();
                let next = classes.get(idx + 1).copied();
                prev == Some(BlockClass::Good) || next == Some(BlockClass::Good)
            }
        })
        .collect()
}

fn check_markup(raw_html: &str) -> Result<(), ParseError> {
    if raw_html.trim().is_empty() {
        return Err(ParseError::EmptyDocument);
    }
    if raw_html.contains('\0') {
        return Err(ParseError::BinaryContent);
    }
    Ok(())
}

#[derive(Default)]
struct PendingBlock {
    text: String,
    link_text: String,
    furniture: bool,
}

struct BlockCollector {
    max_blocks: usize,
    blocks: Vec<TextBlock>,
    pending: PendingBlock,
    link_depth: usize,
    furniture_depth: usize,
    block_limit_hit: bool,
}

impl BlockCollector {
    fn new(max_blocks: usize) -> Self {
        Self {
            max_blocks,
            blocks: Vec::new(),
            pending: PendingBlock::default(),
            link_depth: 0,
            furniture_depth: 0,
            block_limit_hit: false,
        }
    }

    /// Walks the subtree under `root` in document order without recursing, so
    /// nesting depth is bounded only by the tree itself.
    fn walk(&mut self, root: NodeRef<'_, Node>) {
        let mut skip_depth = 0usize;
        for edge in root.traverse() {
            if self.block_limit_hit {
                return;
            }
            match edge {
                Edge::Open(node) => match node.value() {
                    Node::Element(element) => {
                        if skip_depth > 0 || SKIP_TAGS.contains(&element.name()) {
                            skip_depth += 1;
                        } else {
                            self.open_element(element);
                        }
                    }
                    Node::Text(text) if skip_depth == 0 => self.push_text(text),
                    _ => {}
                },
                Edge::Close(node) => {
                    if let Node::Element(element) = node.value() {
                        if skip_depth > 0 {
                            skip_depth -= 1;
                        } else {
                            self.close_element(element);
                        }
                    }
                }
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        self.pending.text.push_str(text);
        if self.link_depth > 0 {
            self.pending.link_text.push_str(text);
        }
        if self.furniture_depth > 0 && !text.trim().is_empty() {
            self.pending.furniture = true;
        }
    }

    fn open_element(&mut self, element: &Element) {
        let tag = element.name();
        if tag == "br" {
            self.pending.text.push(' ');
            return;
        }
        if BLOCK_TAGS.contains(&tag) {
            self.flush();
        }
        if is_furniture(element) {
            self.furniture_depth += 1;
        }
        if tag == "a" {
            self.link_depth += 1;
        }
    }

    fn close_element(&mut self, element: &Element) {
        let tag = element.name();
        if tag == "br" {
            return;
        }
        if tag == "a" {
            self.link_depth = self.link_depth.saturating_sub(1);
        }
        if is_furniture(element) {
            self.furniture_depth = self.furniture_depth.saturating_sub(1);
        }
        if BLOCK_TAGS.contains(&tag) {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        if self.block_limit_hit {
            return;
        }
        let text = collapse_whitespace(&pending.text);
        if text.is_empty() {
            return;
        }
        let link_chars = collapse_whitespace(&pending.link_text).chars().count();
        self.blocks
            .push(TextBlock::new(text, link_chars, pending.furniture));
        if self.blocks.len() >= self.max_blocks {
            self.block_limit_hit = true;
        }
    }

    fn finish(mut self) -> Vec<TextBlock> {
        self.flush();
        self.blocks
    }
}

fn is_furniture(element: &Element) -> bool {
    if FURNITURE_TAGS.contains(&element.name()) {
        return true;
    }
    if element.attr("role").is_some_and(|role| {
        matches!(role, "navigation" | "banner" | "contentinfo" | "complementary")
    }) {
        return true;
    }
    let id_tokens = element
        .id()
        .map(|id| id.split(['-', '_']).collect::<Vec<_>>())
        .unwrap_or_default();
    element
        .classes()
        .flat_map(|class| class.split(['-', '_']))
        .chain(id_tokens)
        .any(|token| FURNITURE_TOKENS.contains(&token.to_ascii_lowercase().as_str()))
}

fn collapse_whitespace(input: &str) -> String {
    let mut buf = String::with_capacity(input.len());
    let mut last_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn fold_word(word: &str) -> String {
    word.trim_matches(|ch: char| !ch.is_alphanumeric())
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use BlockClass::{Bad, Good, NearGood, Short};

    fn block(text: &str) -> TextBlock {
        TextBlock::new(text.to_string(), 0, false)
    }

    #[test]
    fn short_block_between_good_blocks_is_promoted() {
        assert_eq!(
            context_pass(&[Bad, Good, Short, Good, Bad]),
            vec![false, true, true, true, false]
        );
    }

    #[test]
    fn isolated_short_block_is_dropped() {
        assert_eq!(context_pass(&[Bad, Short, Bad]), vec![false, false, false]);
    }

    #[test]
    fn promotion_does_not_cascade() {
        assert_eq!(
            context_pass(&[Good, NearGood, Short, Short, Bad]),
            vec![true, true, false, false, false]
        );
    }

    #[test]
    fn classification_is_idempotent() {
        let normalizer = Normalizer::default();
        let samples = [
            block("The committee met on Tuesday to discuss the budget for the new lab."),
            block("Home About Contact"),
            block("Posted in news."),
            TextBlock::new("Read more about it".to_string(), 18, false),
        ];
        for sample in &samples {
            assert_eq!(normalizer.classify(sample), normalizer.classify(sample));
        }
    }

    #[test]
    fn classifies_by_density_and_length() {
        let normalizer = Normalizer::default();
        assert_eq!(
            normalizer.classify(&block(
                "The committee met on Tuesday to discuss the budget for the new lab."
            )),
            Good
        );
        assert_eq!(normalizer.classify(&block("Posted in news.")), Short);
        assert_eq!(normalizer.classify(&block("Home Research People")), Bad);
        assert_eq!(
            normalizer.classify(&TextBlock::new("Read more".to_string(), 9, false)),
            Bad
        );
        assert_eq!(
            normalizer.classify(&block("© 2024 The Regents of the University of California.")),
            Bad
        );
    }

    #[test]
    fn segments_and_measures_link_density() {
        let html = r#"<body><p>Visit <a href="http://a.org">our partner</a> today</p><div>tail</div></body>"#;
        let blocks = Normalizer::default().segment(html).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].text, "Visit our partner today");
        assert_eq!(blocks[0].word_count, 4);
        let expected = "our partner".len() as f64 / "Visit our partner today".len() as f64;
        assert!((blocks[0].link_density - expected).abs() < 1e-9);
        assert_eq!(blocks[1].text, "tail");
    }

    #[test]
    fn marks_navigation_as_furniture() {
        let html = r#"<div class="site-nav">Home About</div><nav><ul><li>People</li></ul></nav><p>Body</p>"#;
        let blocks = Normalizer::default().segment(html).unwrap();
        let flags: Vec<_> = blocks.iter().map(|b| (b.text.as_str(), b.furniture)).collect();
        assert_eq!(
            flags,
            vec![("Home About", true), ("People", true), ("Body", false)]
        );
    }

    #[test]
    fn skips_scripts_and_styles() {
        let html = "<p>Kept text</p><script>var x = 1;</script><style>p{}</style>";
        let blocks = Normalizer::default().segment(html).unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "Kept text");
    }

    #[test]
    fn footer_line_survives_only_next_to_prose() {
        let prose = "<p>The lab studies how proteins fold and what happens when the process goes wrong in the cell.</p>";
        let inline = format!("{prose}<p>Posted in news.</p>{prose}");
        let isolated = "<p>Posted in news.</p>";

        let normalizer = Normalizer::default();
        assert!(normalizer.normalize(&inline).unwrap().contains("Posted in news."));
        assert_eq!(normalizer.normalize(isolated).unwrap(), "");
    }

    #[test]
    fn deeply_nested_markup_is_walked_without_recursion() {
        let depth = 20_000;
        let html = format!(
            "{}<p>The committee met on Tuesday to discuss the budget for the new lab.</p>{}",
            "<div>".repeat(depth),
            "</div>".repeat(depth)
        );
        let text = Normalizer::default().normalize(&html).unwrap();
        assert_eq!(
            text,
            "The committee met on Tuesday to discuss the budget for the new lab."
        );
    }

    #[test]
    fn copyright_lines_are_boilerplate() {
        let normalizer = Normalizer::default();
        let blocks = normalizer
            .segment("<p>&copy; 2024 The River Lab and all of its many partners in the region.</p>")
            .unwrap();
        assert_eq!(blocks[0].text.chars().next(), Some('©'));
        assert_eq!(normalizer.classify(&blocks[0]), Bad);
    }

    #[test]
    fn rejects_empty_and_binary_bodies() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.normalize("  \n"), Err(ParseError::EmptyDocument));
        assert_eq!(
            normalizer.normalize("<p>a\0b</p>"),
            Err(ParseError::BinaryContent)
        );
    }
}
