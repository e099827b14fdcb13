use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use ego_tree::{NodeId, NodeRef};
use scraper::Node;

use super::normalize::normalize;

static CONTRIB_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\(\s*contributed by [^)]*\)\s*$").unwrap());

const BLOCK_TAGS: &[&str] = &["p", "blockquote", "li", "h1", "h2", "h3", "h4", "h5", "h6"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteFields {
    pub author: Option<String>,
    pub source: Option<String>,
    pub body: String,
}

/// How a block carries its attribution markup. The archive mixes two
/// dialects: metadata spans wrapped in a right-aligned paragraph, and bare
/// spans trailing the quote text.
enum AttributionStyle<'a> {
    Wrapped(NodeRef<'a, Node>),
    Bare(NodeRef<'a, Node>),
}

impl<'a> AttributionStyle<'a> {
    fn probe(span: NodeRef<'a, Node>) -> Self {
        let wrapper = span.ancestors().find(|a| {
            a.value().as_element().is_some_and(|el| {
                el.name() == "p"
                    && el.attr("align").is_some_and(|v| v.eq_ignore_ascii_case("right"))
            })
        });
        match wrapper {
            Some(paragraph) => AttributionStyle::Wrapped(paragraph),
            None => AttributionStyle::Bare(span),
        }
    }

    /// The node excluded from body reconstruction. For the wrapped dialect
    /// the whole paragraph is metadata, separators included.
    fn excluded_node(&self) -> NodeId {
        match self {
            AttributionStyle::Wrapped(paragraph) => paragraph.id(),
            AttributionStyle::Bare(span) => span.id(),
        }
    }
}

/// Pull author, source and body text out of one quote fragment.
///
/// Returns `None` when no body text survives extraction: an empty block is
/// page furniture, not an error.
pub fn extract_quote(fragment: &[NodeRef<'_, Node>]) -> Option<QuoteFields> {
    let author_span = find_marker_span(fragment, "author");
    let source_span = find_marker_span(fragment, "source");

    let mut excluded = HashSet::new();
    for span in [author_span, source_span].into_iter().flatten() {
        excluded.insert(AttributionStyle::probe(span).excluded_node());
    }

    let mut raw = String::new();
    for node in fragment {
        collect_text(*node, &excluded, &mut raw);
    }
    let body = normalize(&CONTRIB_RE.replace(&raw, ""));
    if body.is_empty() {
        return None;
    }

    Some(QuoteFields {
        author: author_span.map(marker_text).filter(|s| !s.is_empty()),
        source: source_span.map(marker_text).filter(|s| !s.is_empty()),
        body,
    })
}

fn find_marker_span<'a>(fragment: &[NodeRef<'a, Node>], role: &str) -> Option<NodeRef<'a, Node>> {
    fragment.iter().flat_map(|node| node.descendants()).find(|d| {
        d.value()
            .as_element()
            .is_some_and(|el| el.name() == "span" && el.classes().any(|c| c == role))
    })
}

fn marker_text(span: NodeRef<'_, Node>) -> String {
    let mut raw = String::new();
    for d in span.descendants() {
        if let Some(t) = d.value().as_text() {
            push_run(&mut raw, &t.text);
        }
    }
    normalize(&raw).replace('\n', " ")
}

/// Rebuild body text with line-break semantics: break elements become
/// newlines, block containers force a break around their content, and
/// inline runs on the same line are joined with single spaces.
fn collect_text(node: NodeRef<'_, Node>, excluded: &HashSet<NodeId>, out: &mut String) {
    if excluded.contains(&node.id()) {
        return;
    }
    match node.value() {
        Node::Text(t) => push_run(out, &t.text),
        Node::Element(el) if el.name() == "br" => out.push('\n'),
        Node::Element(el) if matches!(el.name(), "script" | "style") => {}
        Node::Element(el) if BLOCK_TAGS.contains(&el.name()) => {
            break_line(out);
            for child in node.children() {
                collect_text(child, excluded, out);
            }
            break_line(out);
        }
        Node::Element(_) => {
            for child in node.children() {
                collect_text(child, excluded, out);
            }
        }
        _ => {}
    }
}

fn push_run(out: &mut String, text: &str) {
    let mut words = text.split_whitespace();
    let Some(first) = words.next() else { return };
    if !out.is_empty() && !out.ends_with('\n') {
        out.push(' ');
    }
    out.push_str(first);
    for word in words {
        out.push(' ');
        out.push_str(word);
    }
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::segment::{quote_fragments, Fragment};
    use scraper::Html;

    fn page(content: &str) -> String {
        format!(
            "<html><body><table width=\"700\"><tr><td>nav</td><td>\
             <h1>Test Section</h1><hr size=\"1\">{content}</td></tr></table></body></html>"
        )
    }

    fn extract_first(doc: &Html) -> Option<QuoteFields> {
        let fragment: Fragment = quote_fragments(doc).unwrap().next().unwrap();
        extract_quote(&fragment)
    }

    #[test]
    fn line_breaks_become_newlines() {
        let doc = Html::parse_document(&page("Line one<br>Line two"));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.body, "Line one\nLine two");
    }

    #[test]
    fn attribution_annotation_stripped() {
        let doc = Html::parse_document(&page("Some quote (contributed by Jane Doe)"));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.body, "Some quote");
    }

    #[test]
    fn wrapped_attribution_excluded_from_body() {
        let doc = Html::parse_document(&page(
            "The quote itself<p align=\"right\">- <span class=\"author\">Jane Doe</span>, \
             <span class=\"source\">The Book</span></p>",
        ));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.author.as_deref(), Some("Jane Doe"));
        assert_eq!(fields.source.as_deref(), Some("The Book"));
        assert_eq!(fields.body, "The quote itself");
    }

    #[test]
    fn bare_spans_excluded_from_body() {
        let doc = Html::parse_document(&page(
            "The quote itself<br><span class=\"author\">John Smith</span>",
        ));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.author.as_deref(), Some("John Smith"));
        assert_eq!(fields.source, None);
        assert_eq!(fields.body, "The quote itself");
    }

    #[test]
    fn block_containers_force_line_breaks() {
        let doc = Html::parse_document(&page("One<p>Two</p>Three"));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.body, "One\nTwo\nThree");
    }

    #[test]
    fn inline_runs_joined_with_spaces() {
        let doc = Html::parse_document(&page("An <i>emphasized</i> word"));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.body, "An emphasized word");
    }

    #[test]
    fn empty_fragment_yields_no_record() {
        let doc = Html::parse_document(&page("<br> <hr width=\"50%\">Real quote"));
        let fragments: Vec<Fragment> = quote_fragments(&doc).unwrap().collect();
        assert_eq!(fragments.len(), 2);
        assert_eq!(extract_quote(&fragments[0]), None);
        assert!(extract_quote(&fragments[1]).is_some());
    }

    #[test]
    fn empty_author_span_reported_absent() {
        let doc = Html::parse_document(&page(
            "Quote text<p align=\"right\"><span class=\"author\"> </span></p>",
        ));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.author, None);
        assert_eq!(fields.body, "Quote text");
    }

    #[test]
    fn body_is_normalized() {
        let doc = Html::parse_document(&page(
            "\u{201C}Dream\u{2026}\u{201D}<br><span class=\"author\">James Dean</span>",
        ));
        let fields = extract_first(&doc).unwrap();
        assert_eq!(fields.body, "\"Dream...\"");
    }
}
