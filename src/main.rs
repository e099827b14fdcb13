mod crawl;
mod db;
mod discover;
mod fetch;
mod parser;

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use url::Url;

use crawl::CrawlConfig;
use discover::PageTarget;

const DEFAULT_INDEX_URL: &str = "http://www.generationterrorists.com/";
const DEFAULT_PER_PAGE: usize = 1500;
const FETCH_TIMEOUT_SECS: u64 = 30;

#[derive(Parser)]
#[command(name = "gt_scraper", about = "generationterrorists.com quote archive scraper")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover quote section pages from the site index
    Discover {
        /// Index page to scan for section links
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index: String,
        /// Page size used when rewriting section links to single pages
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
    },
    /// Crawl section pages and store extracted quotes
    Crawl {
        /// Explicit section page URLs (skips index discovery)
        #[arg(long = "url")]
        urls: Vec<String>,
        /// Index page used for discovery when no explicit URLs are given
        #[arg(long, default_value = DEFAULT_INDEX_URL)]
        index: String,
        /// Only crawl sections whose name contains this substring
        #[arg(short, long)]
        section: Option<String>,
        /// Page size used when rewriting section links to single pages
        #[arg(long, default_value_t = DEFAULT_PER_PAGE)]
        per_page: usize,
        /// Category attached to every stored quote
        #[arg(long, default_value = "Quotes")]
        category: String,
        /// Max pages to crawl
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Print the run summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show database statistics
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Discover { index, per_page } => {
            let fetcher = fetch::Fetcher::new(Duration::from_secs(FETCH_TIMEOUT_SECS))?;
            let targets = discover::discover_targets(&fetcher, &index, per_page).await?;
            if targets.is_empty() {
                println!("No section links found on {}", index);
                return Ok(());
            }
            for t in &targets {
                println!("{:<28} {}", t.section, t.url);
            }
            println!("\n{} sections", targets.len());
            Ok(())
        }
        Commands::Crawl {
            urls,
            index,
            section,
            per_page,
            category,
            limit,
            json,
        } => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let fetcher = fetch::Fetcher::new(Duration::from_secs(FETCH_TIMEOUT_SECS))?;

            let mut targets = if urls.is_empty() {
                discover::discover_targets(&fetcher, &index, per_page).await?
            } else {
                urls.into_iter().map(explicit_target).collect()
            };
            if let Some(filter) = &section {
                let filter = filter.to_lowercase();
                targets.retain(|t| t.section.to_lowercase().contains(&filter));
            }
            if let Some(n) = limit {
                targets.truncate(n);
            }
            if targets.is_empty() {
                println!("No pages to crawl.");
                return Ok(());
            }

            println!("Crawling {} pages...", targets.len());
            let summary =
                crawl::run_crawl(&conn, &fetcher, &targets, &CrawlConfig { category }).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                summary.print();
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = db::connect()?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Quotes:          {}", s.quotes);
            println!("Authors:         {}", s.authors);
            println!("Sources:         {}", s.sources);
            println!("Categories:      {}", s.categories);
            println!("Categorizations: {}", s.categorizations);
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

/// Turn a user-supplied page URL into a target, naming its source after the
/// section query parameter when one is present.
fn explicit_target(url: String) -> PageTarget {
    let section = Url::parse(&url)
        .ok()
        .as_ref()
        .and_then(discover::section_of)
        .unwrap_or_else(|| "Unsorted".to_string());
    PageTarget { url, section }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
