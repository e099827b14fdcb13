use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection};

const DB_PATH: &str = "data/quotes.sqlite";

pub fn connect() -> Result<Connection> {
    std::fs::create_dir_all("data")?;
    let conn = Connection::open(DB_PATH)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS authors (
            id          INTEGER PRIMARY KEY,
            name        TEXT UNIQUE NOT NULL,
            bio         TEXT,
            birth_year  INTEGER,
            death_year  INTEGER,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS sources (
            id             INTEGER PRIMARY KEY,
            name           TEXT UNIQUE NOT NULL,
            default_author TEXT,
            created_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS categories (
            id    INTEGER PRIMARY KEY,
            name  TEXT UNIQUE NOT NULL
        );

        -- Natural key is the exact normalized text; author/source are fixed
        -- on first insert and never rewritten by the pipeline.
        CREATE TABLE IF NOT EXISTS quotes (
            id         INTEGER PRIMARY KEY,
            text       TEXT UNIQUE NOT NULL,
            author_id  INTEGER REFERENCES authors(id),
            source_id  INTEGER REFERENCES sources(id),
            added_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_quotes_author ON quotes(author_id);
        CREATE INDEX IF NOT EXISTS idx_quotes_source ON quotes(source_id);

        CREATE TABLE IF NOT EXISTS quote_categories (
            quote_id    INTEGER NOT NULL REFERENCES quotes(id),
            category_id INTEGER NOT NULL REFERENCES categories(id),
            UNIQUE(quote_id, category_id)
        );
        CREATE INDEX IF NOT EXISTS idx_qc_category ON quote_categories(category_id);
        ",
    )?;
    Ok(())
}

// ── Upserts ──

pub fn get_or_create_author(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT OR IGNORE INTO authors (name) VALUES (?1)", [name])?;
    conn.query_row("SELECT id FROM authors WHERE name = ?1", [name], |r| {
        r.get(0)
    })
}

pub fn get_or_create_source(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT OR IGNORE INTO sources (name) VALUES (?1)", [name])?;
    conn.query_row("SELECT id FROM sources WHERE name = ?1", [name], |r| {
        r.get(0)
    })
}

pub fn get_or_create_category(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    conn.execute("INSERT OR IGNORE INTO categories (name) VALUES (?1)", [name])?;
    conn.query_row("SELECT id FROM categories WHERE name = ?1", [name], |r| {
        r.get(0)
    })
}

/// Insert a quote keyed by its normalized text, or return the existing row.
/// Author and source associations stick from the first insert.
pub fn get_or_create_quote(
    conn: &Connection,
    text: &str,
    author_id: Option<i64>,
    source_id: Option<i64>,
) -> rusqlite::Result<(i64, bool)> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO quotes (text, author_id, source_id, added_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![text, author_id, source_id, Utc::now().to_rfc3339()],
    )?;
    let id = conn.query_row("SELECT id FROM quotes WHERE text = ?1", [text], |r| {
        r.get(0)
    })?;
    Ok((id, inserted == 1))
}

/// Idempotent membership addition. Returns whether a new link was created.
pub fn add_category_if_absent(
    conn: &Connection,
    quote_id: i64,
    category_id: i64,
) -> rusqlite::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO quote_categories (quote_id, category_id) VALUES (?1, ?2)",
        [quote_id, category_id],
    )?;
    Ok(inserted == 1)
}

pub fn source_default_author(
    conn: &Connection,
    source_id: i64,
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT default_author FROM sources WHERE id = ?1",
        [source_id],
        |r| r.get(0),
    )
}

pub fn set_source_default_author(
    conn: &Connection,
    source_id: i64,
    author: Option<&str>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE sources SET default_author = ?2 WHERE id = ?1",
        params![source_id, author],
    )?;
    Ok(())
}

// ── Stats ──

pub struct Stats {
    pub authors: usize,
    pub sources: usize,
    pub categories: usize,
    pub quotes: usize,
    pub categorizations: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let count = |table: &str| -> Result<usize> {
        let n = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?;
        Ok(n)
    };
    Ok(Stats {
        authors: count("authors")?,
        sources: count("sources")?,
        categories: count("categories")?,
        quotes: count("quotes")?,
        categorizations: count("quote_categories")?,
    })
}

// ── Tests ──
