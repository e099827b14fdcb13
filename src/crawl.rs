use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::db;
use crate::discover::PageTarget;
use crate::fetch::{FetchError, Fetcher};
use crate::parser;
use crate::parser::extract::QuoteFields;
use crate::parser::segment::StructureError;

pub struct CrawlConfig {
    /// Category attached to every quote stored by this pass.
    pub category: String,
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Structure(#[from] StructureError),
    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Outcome counters for one full crawl pass.
#[derive(Debug, Default, Serialize)]
pub struct RunSummary {
    pub pages: usize,
    pub pages_failed: usize,
    pub processed: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn print(&self) {
        println!(
            "Pages: {} ok, {} failed. Quotes: {} processed, {} added, {} already known, {} failed.",
            self.pages, self.pages_failed, self.processed, self.added, self.skipped, self.failed
        );
    }

    fn absorb(&mut self, counts: PageCounts) {
        self.processed += counts.processed;
        self.added += counts.added;
        self.skipped += counts.skipped;
        self.failed += counts.failed;
    }
}

#[derive(Debug, Default)]
pub struct PageCounts {
    pub processed: usize,
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Drive the full pass over the given targets, one page at a time. Page and
/// block failures are counted, never propagated.
pub async fn run_crawl(
    conn: &Connection,
    fetcher: &Fetcher,
    targets: &[PageTarget],
    config: &CrawlConfig,
) -> RunSummary {
    let mut summary = RunSummary::default();

    let pb = ProgressBar::new(targets.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("=> "),
    );

    for target in targets {
        pb.set_message(target.section.clone());
        match process_target(conn, fetcher, target, config).await {
            Ok(counts) => {
                summary.pages += 1;
                summary.absorb(counts);
            }
            Err(e) => {
                summary.pages_failed += 1;
                match &e {
                    PageError::Structure(_) => {
                        warn!("Structure mismatch on {}: {}", target.url, e)
                    }
                    _ => warn!("Page failed, skipping {}: {}", target.url, e),
                }
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Crawl finished: {} pages ok, {} failed, {} quotes added",
        summary.pages, summary.pages_failed, summary.added
    );
    summary
}

async fn process_target(
    conn: &Connection,
    fetcher: &Fetcher,
    target: &PageTarget,
    config: &CrawlConfig,
) -> Result<PageCounts, PageError> {
    let html = fetcher.fetch_text(&target.url).await?;
    process_document(conn, &html, &target.section, config)
}

/// Run segment → extract → normalize → upsert over one fetched document.
/// A block whose write fails is skipped; its siblings still commit.
pub fn process_document(
    conn: &Connection,
    html: &str,
    section: &str,
    config: &CrawlConfig,
) -> Result<PageCounts, PageError> {
    let quotes = parser::parse_quotes(html)?;

    let category_id = db::get_or_create_category(conn, &config.category)?;
    let page_source_id = db::get_or_create_source(conn, section)?;
    let default_author = db::source_default_author(conn, page_source_id)?;

    let mut counts = PageCounts::default();
    for fields in &quotes {
        counts.processed += 1;
        match persist_quote(conn, fields, page_source_id, category_id, default_author.as_deref()) {
            Ok(true) => counts.added += 1,
            Ok(false) => counts.skipped += 1,
            Err(e) => {
                warn!("Quote block not persisted: {}", e);
                counts.failed += 1;
            }
        }
    }
    Ok(counts)
}

fn persist_quote(
    conn: &Connection,
    fields: &QuoteFields,
    page_source_id: i64,
    category_id: i64,
    default_author: Option<&str>,
) -> rusqlite::Result<bool> {
    let author_id = fields
        .author
        .as_deref()
        .or(default_author)
        .map(|name| db::get_or_create_author(conn, name))
        .transpose()?;
    let source_id = match fields.source.as_deref() {
        Some(name) => db::get_or_create_source(conn, name)?,
        None => page_source_id,
    };
    let (quote_id, created) = db::get_or_create_quote(conn, &fields.body, author_id, Some(source_id))?;
    db::add_category_if_absent(conn, quote_id, category_id)?;
    Ok(created)
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "tests/fixtures/love_and_dreams.html";

    fn fixture() -> String {
        std::fs::read_to_string(FIXTURE).unwrap()
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys=ON;").unwrap();
        db::init_schema(&conn).unwrap();
        conn
    }

    fn config() -> CrawlConfig {
        CrawlConfig {
            category: "Quotes".to_string(),
        }
    }

    fn quote_author(conn: &Connection, text_prefix: &str) -> Option<String> {
        conn.query_row(
            "SELECT a.name FROM quotes q JOIN authors a ON a.id = q.author_id
             WHERE q.text LIKE ?1 || '%'",
            [text_prefix],
            |r| r.get(0),
        )
        .ok()
    }

    #[test]
    fn first_pass_adds_every_quote() {
        let conn = test_conn();
        let counts = process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        assert_eq!(counts.processed, 3);
        assert_eq!(counts.added, 3);
        assert_eq!(counts.skipped, 0);
        assert_eq!(counts.failed, 0);
        assert_eq!(
            quote_author(&conn, "I have spread").as_deref(),
            Some("W.B. Yeats")
        );
    }

    #[test]
    fn second_pass_adds_nothing() {
        let conn = test_conn();
        process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        let counts = process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        assert_eq!(counts.added, 0);
        assert_eq!(counts.skipped, 3);
        let total: usize = conn
            .query_row("SELECT COUNT(*) FROM quotes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn missing_author_falls_back_to_source_default() {
        let conn = test_conn();
        let source_id = db::get_or_create_source(&conn, "Love and Dreams").unwrap();
        db::set_source_default_author(&conn, source_id, Some("Anonymous")).unwrap();

        process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        assert_eq!(
            quote_author(&conn, "Love is composed").as_deref(),
            Some("Anonymous")
        );
        // blocks with an explicit author are untouched by the fallback
        assert_eq!(
            quote_author(&conn, "I have spread").as_deref(),
            Some("W.B. Yeats")
        );
    }

    #[test]
    fn unauthored_without_default_stays_unauthored() {
        let conn = test_conn();
        process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        assert_eq!(quote_author(&conn, "Love is composed"), None);
    }

    #[test]
    fn explicit_source_span_wins_over_page_source() {
        let conn = test_conn();
        process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        let source: String = conn
            .query_row(
                "SELECT s.name FROM quotes q JOIN sources s ON s.id = q.source_id
                 WHERE q.text LIKE 'I have spread%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(source, "He Wishes for the Cloths of Heaven");
        let source: String = conn
            .query_row(
                "SELECT s.name FROM quotes q JOIN sources s ON s.id = q.source_id
                 WHERE q.text LIKE '%Dream as if%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(source, "Love and Dreams");
    }

    #[test]
    fn block_failure_does_not_abort_siblings() {
        let conn = test_conn();
        conn.execute_batch(
            "CREATE TRIGGER reject_yeats BEFORE INSERT ON authors
             WHEN NEW.name = 'W.B. Yeats'
             BEGIN SELECT RAISE(ABORT, 'injected failure'); END;",
        )
        .unwrap();

        let counts = process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.added, 2);
        let total: usize = conn
            .query_row("SELECT COUNT(*) FROM quotes", [], |r| r.get(0))
            .unwrap();
        assert_eq!(total, 2);
    }

    #[test]
    fn category_set_grows_monotonically() {
        let conn = test_conn();
        process_document(&conn, &fixture(), "Love and Dreams", &config()).unwrap();
        let poetry = CrawlConfig {
            category: "Poetry".to_string(),
        };
        process_document(&conn, &fixture(), "Love and Dreams", &poetry).unwrap();

        let memberships: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM quote_categories qc
                 JOIN quotes q ON q.id = qc.quote_id
                 WHERE q.text LIKE 'I have spread%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(memberships, 2);
    }

    #[test]
    fn structure_mismatch_is_a_page_error() {
        let conn = test_conn();
        let result = process_document(&conn, "<html><body></body></html>", "X", &config());
        assert!(matches!(result, Err(PageError::Structure(_))));
    }
}
