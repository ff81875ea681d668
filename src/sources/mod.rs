// src/sources/mod.rs
pub mod analysis;
pub mod forum;
pub mod rss_news;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::models::NewsArticle;

/// One-time metrics registration for the fetch path.
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_articles_total", "Articles emitted by source clients.");
        describe_counter!(
            "news_dedup_skipped_total",
            "Forum submissions skipped by permalink dedup."
        );
        describe_counter!(
            "news_relevance_rejected_total",
            "Forum submissions rejected by the relevance gate."
        );
        describe_counter!(
            "news_source_errors_total",
            "Source fetch/parse errors caught at the client boundary."
        );
        describe_histogram!("news_parse_ms", "Source response parse time in milliseconds.");
    });
}

/// A single news source. `fetch` never panics on remote misbehavior; transport
/// and parse failures surface as `Err` and the caller degrades to an empty
/// result for that source.
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// `ticker` is the bare identifier; `query` may carry the company name for
    /// broader text search. Items older than `lookback` are dropped when their
    /// timestamp is known.
    async fn fetch(&self, ticker: &str, query: &str, lookback: Duration) -> Result<Vec<NewsArticle>>;

    fn name(&self) -> &'static str;
}

/// Normalize feed text: decode HTML entities, strip tags, normalize curly
/// quotes, collapse whitespace.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out.trim().to_string()
}

/// RFC 2822 feed dates ("Tue, 05 Aug 2025 13:00:00 GMT") to UTC.
pub fn parse_rfc2822_utc(ts: &str) -> Option<DateTime<Utc>> {
    use time::format_description::well_known::Rfc2822;
    use time::{OffsetDateTime, UtcOffset};

    // The feeds emit the obsolete GMT zone name; the parser accepts numeric
    // offsets only.
    let ts = ts.trim();
    let normalized = match ts.strip_suffix("GMT") {
        Some(rest) => format!("{}+0000", rest),
        None => ts.to_string(),
    };

    OffsetDateTime::parse(&normalized, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
        .and_then(|dt| DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), 0))
}

/// RFC 3339 timestamps to UTC. Offsets are preserved, not discarded: the
/// published instant stays the same regardless of the feed's local zone.
pub fn parse_rfc3339_utc(ts: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Keep an article when its timestamp is unknown or not older than the cutoff.
pub fn within_lookback(published_at: Option<DateTime<Utc>>, cutoff: DateTime<Utc>) -> bool {
    match published_at {
        Some(ts) => ts >= cutoff,
        None => true,
    }
}
