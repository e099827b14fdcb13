use std::sync::LazyLock;
use std::time::Duration;

use encoding_rs::Encoding;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use thiserror::Error;
use tracing::warn;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; gt-scraper)";
const MAX_RETRIES: u32 = 3;
const BASE_BACKOFF_MS: u64 = 2000;

static CHARSET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)charset\s*=\s*["']?([A-Za-z0-9._:-]+)"#).unwrap());

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {0}")]
    Status(u16),
}

pub struct Fetcher {
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetch a page and decode it to text, retrying transient failures with
    /// exponential backoff.
    pub async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Err(e) if attempt < MAX_RETRIES && is_transient(&e) => {
                    let backoff = Duration::from_millis(BASE_BACKOFF_MS * 2u64.pow(attempt));
                    warn!(
                        "Transient failure on {} (attempt {}/{}), backing off {:.1}s: {}",
                        url,
                        attempt + 1,
                        MAX_RETRIES,
                        backoff.as_secs_f64(),
                        e
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let declared = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_label);
        let bytes = response.bytes().await?;
        Ok(decode_body(&bytes, declared.as_deref()))
    }
}

fn is_transient(error: &FetchError) -> bool {
    match error {
        FetchError::Status(code) => matches!(*code, 429 | 500 | 502 | 503 | 504),
        FetchError::Http(e) => e.is_timeout() || e.is_connect(),
    }
}

fn charset_label(value: &str) -> Option<String> {
    CHARSET_RE.captures(value).map(|c| c[1].to_string())
}

/// Decode a response body. The header-declared charset wins, then a charset
/// declared in an early meta tag, then UTF-8. The archive predates UTF-8
/// ubiquity, so mis-decoding here corrupts the typographic folding later.
fn decode_body(bytes: &[u8], declared: Option<&str>) -> String {
    let encoding = declared
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(bytes))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

fn sniff_meta_charset(bytes: &[u8]) -> Option<&'static Encoding> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(1024)]);
    CHARSET_RE
        .captures(&head)
        .and_then(|c| Encoding::for_label(c[1].as_bytes()))
}
