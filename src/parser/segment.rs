use std::sync::LazyLock;

use ego_tree::NodeRef;
use scraper::{Html, Node, Selector};
use thiserror::Error;

static CONTENT_CELL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"table[width="700"] td"#).unwrap());
static HEADING: LazyLock<Selector> = LazyLock::new(|| Selector::parse("h1").unwrap());

/// Anchor markup the archive pages are expected to carry. A page missing
/// one of these is a dialect mismatch, reported separately from fetch
/// failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("content cell not found (no second td in the width-700 layout table)")]
    ContentCell,
    #[error("section heading not found in content cell")]
    Heading,
    #[error("start marker not found (no thin rule after the section heading)")]
    StartMarker,
}

/// One quote block: the ordered sibling nodes between two delimiters.
pub type Fragment<'a> = Vec<NodeRef<'a, Node>>;

/// Partition the content cell's child stream into per-quote fragments.
///
/// Quotes carry no record markup of their own; boundaries are inferred from
/// incidental rules. A thin rule after the section heading opens the
/// stream, each wide rule closes a fragment, and the pagination container
/// ends it. The final fragment is emitted even without a trailing rule.
pub fn quote_fragments(doc: &Html) -> Result<Fragments<'_>, StructureError> {
    let cell = doc
        .select(&CONTENT_CELL)
        .nth(1)
        .ok_or(StructureError::ContentCell)?;
    let heading = cell
        .select(&HEADING)
        .next()
        .ok_or(StructureError::Heading)?;

    let mut cursor = heading.next_sibling();
    while let Some(node) = cursor {
        if is_thin_rule(&node) {
            return Ok(Fragments {
                cursor: node.next_sibling(),
                done: false,
            });
        }
        cursor = node.next_sibling();
    }
    Err(StructureError::StartMarker)
}

pub struct Fragments<'a> {
    cursor: Option<NodeRef<'a, Node>>,
    done: bool,
}

impl<'a> Iterator for Fragments<'a> {
    type Item = Fragment<'a>;

    fn next(&mut self) -> Option<Fragment<'a>> {
        if self.done {
            return None;
        }
        let mut group = Vec::new();
        while let Some(node) = self.cursor {
            self.cursor = node.next_sibling();
            if is_pagination_boundary(&node) {
                break;
            }
            if is_wide_rule(&node) {
                if group.is_empty() {
                    // nothing between two consecutive delimiters
                    continue;
                }
                return Some(group);
            }
            group.push(node);
        }
        self.done = true;
        if group.is_empty() {
            None
        } else {
            Some(group)
        }
    }
}

fn is_thin_rule(node: &NodeRef<'_, Node>) -> bool {
    node.value()
        .as_element()
        .is_some_and(|el| el.name() == "hr" && el.attr("size") == Some("1"))
}

fn is_wide_rule(node: &NodeRef<'_, Node>) -> bool {
    node.value()
        .as_element()
        .is_some_and(|el| el.name() == "hr" && el.attr("width") == Some("50%"))
}

fn is_pagination_boundary(node: &NodeRef<'_, Node>) -> bool {
    node.value()
        .as_element()
        .is_some_and(|el| el.name() == "div" && el.id() == Some("pagination"))
}
