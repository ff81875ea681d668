// src/sources/rss_news.rs
//! RSS news client for the Google News search feed.
//!
//! One GET per fetch; items carry title/link/pubDate/description/source, the
//! description usually wrapped in markup that has to be stripped.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::info;

use crate::models::NewsArticle;
use crate::sources::{normalize_text, parse_rfc2822_utc, within_lookback, SourceClient};

const FEED_BASE: &str = "https://news.google.com/rss/search";

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    source: Option<SourceTag>,
}

// <source url="...">Outlet</source>
#[derive(Debug, Deserialize)]
struct SourceTag {
    #[serde(rename = "$text")]
    text: Option<String>,
}

enum Mode {
    Fixture(String),
    Http { client: reqwest::Client },
}

pub struct RssNewsClient {
    mode: Mode,
}

impl RssNewsClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("watchlist-news-agent/0.1")
            .connect_timeout(StdDuration::from_secs(5))
            .timeout(StdDuration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            mode: Mode::Http { client },
        }
    }

    pub fn from_fixture(xml: &str) -> Self {
        Self {
            mode: Mode::Fixture(xml.to_string()),
        }
    }

    fn feed_url(query: &str) -> String {
        let encoded = query.trim().replace(' ', "+");
        format!("{FEED_BASE}?q={encoded}+stock&hl=en-US&gl=US&ceid=US:en")
    }

    fn parse_items(xml: &str, cutoff: chrono::DateTime<Utc>) -> Result<Vec<NewsArticle>> {
        let t0 = std::time::Instant::now();
        let xml_clean = scrub_html_entities_for_xml(xml);
        let rss: Rss = from_str(&xml_clean).context("parsing news rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let (title, link) = match (it.title, it.link) {
                (Some(t), Some(l)) => (t, l),
                _ => continue,
            };

            let published_at = it.pub_date.as_deref().and_then(parse_rfc2822_utc);
            // Items without a parseable date are kept, never speculatively dropped.
            if !within_lookback(published_at, cutoff) {
                continue;
            }

            let description = it
                .description
                .as_deref()
                .map(normalize_text)
                .filter(|d| !d.is_empty());
            let outlet = it.source.and_then(|s| s.text).unwrap_or_default();
            let source = if outlet.is_empty() {
                "Google News".to_string()
            } else {
                format!("Google News - {outlet}")
            };

            out.push(NewsArticle {
                source,
                title: normalize_text(&title),
                url: Some(link),
                content: description,
                published_at,
                community: None,
            });
        }

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("news_parse_ms").record(ms);
        counter!("news_articles_total").increment(out.len() as u64);
        Ok(out)
    }
}

impl Default for RssNewsClient {
    fn default() -> Self {
        Self::new()
    }
}

// HTML entities inside item descriptions are not valid XML entities and make
// the deserializer bail; swap the common ones for plain characters up front.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[async_trait]
impl SourceClient for RssNewsClient {
    async fn fetch(
        &self,
        _ticker: &str,
        query: &str,
        lookback: Duration,
    ) -> Result<Vec<NewsArticle>> {
        let cutoff = Utc::now() - lookback;
        let xml = match &self.mode {
            Mode::Fixture(s) => s.clone(),
            Mode::Http { client } => {
                let url = Self::feed_url(query);
                info!(%url, "fetching news rss");
                let resp = client.get(&url).send().await.context("news rss get")?;
                resp.error_for_status()
                    .context("news rss status")?
                    .text()
                    .await
                    .context("news rss body")?
            }
        };
        Self::parse_items(&xml, cutoff)
    }

    fn name(&self) -> &'static str {
        "Google News"
    }
}
