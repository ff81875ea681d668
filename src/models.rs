// src/models.rs
//! Record types shared across the agent: fetched articles, the per-ticker
//! aggregate, and the delivery-ready report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One fetched news item, normalized across sources.
///
/// Immutable once constructed; `community` is only set for forum posts and is
/// used for grouping summaries, never for filtering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewsArticle {
    pub source: String,
    pub title: String,
    pub url: Option<String>,
    pub content: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub community: Option<String>,
}

/// Everything collected for one ticker during one aggregation run.
/// Built once per run, appended to while sources are queried, and consumed
/// when the final report string is formatted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockNews {
    pub ticker: String,
    pub company_name: Option<String>,
    pub price_change_percent: Option<f64>,
    pub summary_analysis: Option<String>,
    pub summary_rss: Option<String>,
    /// Forum summaries keyed by origin community.
    pub summary_forum: BTreeMap<String, String>,
    pub articles: Vec<NewsArticle>,
}

impl StockNews {
    pub fn new(
        ticker: impl Into<String>,
        company_name: Option<String>,
        price_change_percent: Option<f64>,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            company_name,
            price_change_percent,
            ..Self::default()
        }
    }
}

/// Final per-ticker record handed to delivery (console/email).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsReport {
    pub ticker: String,
    pub company_name: Option<String>,
    pub price_change_percent: Option<f64>,
    pub news_summary: String,
    pub summary_analysis: Option<String>,
    pub summary_rss: Option<String>,
    pub summary_forum: BTreeMap<String, String>,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub watchlist: String,
}
