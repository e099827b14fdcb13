pub mod extract;
pub mod normalize;
pub mod segment;

use scraper::Html;

use extract::QuoteFields;
use segment::StructureError;

/// Full per-page parse: segment the content stream, then extract one record
/// per fragment. Fragments with no surviving body text are dropped.
pub fn parse_quotes(html: &str) -> Result<Vec<QuoteFields>, StructureError> {
    let doc = Html::parse_document(html);
    let fragments = segment::quote_fragments(&doc)?;
    Ok(fragments
        .filter_map(|fragment| extract::extract_quote(&fragment))
        .collect())
}

// ── Tests ──
