use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use scraper::{Html, Selector};
use tracing::info;
use url::Url;

use crate::fetch::Fetcher;

const QUOTE_SCRIPT: &str = "quotes.cgi";

static ANCHOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());

#[derive(Debug, Clone)]
pub struct PageTarget {
    pub url: String,
    pub section: String,
}

/// Fetch the site index and return one rewritten target per section.
pub async fn discover_targets(
    fetcher: &Fetcher,
    index_url: &str,
    per_page: usize,
) -> Result<Vec<PageTarget>> {
    info!("Fetching section index: {}", index_url);
    let html = fetcher
        .fetch_text(index_url)
        .await
        .context("Failed to fetch section index")?;
    let targets = section_targets(&html, index_url, per_page)?;
    info!("Sections discovered: {}", targets.len());
    Ok(targets)
}

/// Collect anchors pointing at the quote-listing script and rewrite each
/// discovered query into a single-page, large-page-size form so pagination
/// never has to be walked.
pub fn section_targets(html: &str, base_url: &str, per_page: usize) -> Result<Vec<PageTarget>> {
    let base = Url::parse(base_url).context("invalid index URL")?;
    let doc = Html::parse_document(html);

    let mut seen: HashSet<String> = HashSet::new();
    let mut targets = Vec::new();
    for anchor in doc.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.contains(QUOTE_SCRIPT) {
            continue;
        }
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        let Some(section) = section_of(&resolved) else {
            continue;
        };
        if !seen.insert(section.clone()) {
            continue;
        }
        targets.push(PageTarget {
            url: single_page_url(&resolved, &section, per_page),
            section,
        });
    }
    Ok(targets)
}

/// The section name carried in a quote-listing URL, if any.
pub fn section_of(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "section")
        .map(|(_, value)| value.into_owned())
        .filter(|s| !s.is_empty())
}

fn single_page_url(url: &Url, section: &str, per_page: usize) -> String {
    let mut single = url.clone();
    single
        .query_pairs_mut()
        .clear()
        .append_pair("start", "0")
        .append_pair("section", section)
        .append_pair("per_page", &per_page.to_string());
    single.to_string()
}
