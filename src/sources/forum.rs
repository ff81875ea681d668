// src/sources/forum.rs
//! Forum (Reddit) client: breadth-first search across query variants, ranking
//! modes, and per-community listings, funneled through one dedup-then-relevance
//! gate.
//!
//! Redundant queries cost extra calls but raise recall; the per-fetch permalink
//! set makes the redundancy free in the output. Relevance is checked twice on
//! the listing path (scan gate, then the emission guard every path runs) with
//! the same predicates from `crate::relevance`.

use std::collections::HashSet;
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AppConfig, Capability, ForumCredentials};
use crate::models::NewsArticle;
use crate::relevance::{is_relevant, title_conflict, ConfusableRegistry};
use crate::sources::{within_lookback, SourceClient};

const SOURCE_NAME: &str = "Reddit";
const SEARCH_SORTS: [&str; 4] = ["relevance", "hot", "new", "top"];
const SEARCH_TIME_FILTER: &str = "week";
const SEARCH_LIMIT: u32 = 5;
const LISTING_LIMIT: u32 = 50;
const TOP_COMMENT_LIMIT: u32 = 5;

const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";
const API_BASE: &str = "https://oauth.reddit.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Hot,
    Top,
}

impl ListingKind {
    fn path(self) -> &'static str {
        match self {
            ListingKind::Hot => "hot",
            ListingKind::Top => "top",
        }
    }
}

/// One forum submission as returned by search or listing endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ForumSubmission {
    pub permalink: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    pub created_utc: Option<f64>,
    pub subreddit: String,
}

/// Transport-level forum operations. Split out so the fetch flow can be
/// exercised against scripted submissions in tests.
#[async_trait]
pub trait ForumApi: Send + Sync {
    /// Free-text search across several communities at once.
    async fn search(
        &self,
        communities: &[String],
        query: &str,
        sort: &str,
        time_filter: &str,
        limit: u32,
    ) -> Result<Vec<ForumSubmission>>;

    /// Hot/top listing of one community.
    async fn listing(
        &self,
        community: &str,
        kind: ListingKind,
        limit: u32,
    ) -> Result<Vec<ForumSubmission>>;

    /// Bodies of the top-ranked comments of one submission.
    async fn top_comments(&self, permalink: &str, limit: u32) -> Result<Vec<String>>;
}

/* ----------------------------
HTTP implementation
---------------------------- */

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Thing>,
}

#[derive(Debug, Deserialize)]
struct Thing {
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct CommentData {
    body: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: std::time::Instant,
}

/// Application-only OAuth client for the public forum API.
pub struct HttpForumApi {
    http: reqwest::Client,
    creds: ForumCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl HttpForumApi {
    pub fn new(creds: ForumCredentials) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(creds.user_agent.clone())
            .connect_timeout(StdDuration::from_secs(5))
            .timeout(StdDuration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            creds,
            token: Mutex::new(None),
        }
    }

    async fn bearer(&self) -> Result<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > std::time::Instant::now() {
                return Ok(cached.value.clone());
            }
        }

        let resp = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.creds.client_id, Some(&self.creds.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .context("token request")?
            .error_for_status()
            .context("token status")?;
        let token: TokenResponse = resp.json().await.context("token body")?;

        // Refresh a minute before the advertised expiry.
        let ttl = token.expires_in.max(120).saturating_sub(60);
        *guard = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: std::time::Instant::now() + StdDuration::from_secs(ttl),
        });
        Ok(token.access_token)
    }

    async fn get_listing(&self, url: &str) -> Result<Vec<ForumSubmission>> {
        let token = self.bearer().await?;
        let listing: Listing = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .context("forum get")?
            .error_for_status()
            .context("forum status")?
            .json()
            .await
            .context("forum body")?;

        let mut out = Vec::with_capacity(listing.data.children.len());
        for child in listing.data.children {
            match serde_json::from_value::<ForumSubmission>(child.data) {
                Ok(sub) => out.push(sub),
                Err(e) => warn!(error = ?e, "skipping malformed submission"),
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ForumApi for HttpForumApi {
    async fn search(
        &self,
        communities: &[String],
        query: &str,
        sort: &str,
        time_filter: &str,
        limit: u32,
    ) -> Result<Vec<ForumSubmission>> {
        let combined = communities.join("+");
        let url = format!(
            "{API_BASE}/r/{combined}/search?q={}&sort={sort}&t={time_filter}&limit={limit}&restrict_sr=1&raw_json=1",
            query.replace(' ', "+"),
        );
        self.get_listing(&url).await
    }

    async fn listing(
        &self,
        community: &str,
        kind: ListingKind,
        limit: u32,
    ) -> Result<Vec<ForumSubmission>> {
        let url = format!(
            "{API_BASE}/r/{community}/{}?limit={limit}&raw_json=1",
            kind.path()
        );
        self.get_listing(&url).await
    }

    async fn top_comments(&self, permalink: &str, limit: u32) -> Result<Vec<String>> {
        let trimmed = permalink.trim_matches('/');
        let url = format!("{API_BASE}/{trimmed}?sort=top&limit={limit}&raw_json=1");
        let token = self.bearer().await?;

        // The comments endpoint returns a two-element array:
        // [submission listing, comment listing].
        let pair: Vec<Listing> = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context("comments get")?
            .error_for_status()
            .context("comments status")?
            .json()
            .await
            .context("comments body")?;

        let comments = pair
            .into_iter()
            .nth(1)
            .map(|l| l.data.children)
            .unwrap_or_default();

        Ok(comments
            .into_iter()
            .filter_map(|c| serde_json::from_value::<CommentData>(c.data).ok())
            .filter_map(|c| c.body)
            .take(limit as usize)
            .collect())
    }
}

/* ----------------------------
Fetch flow
---------------------------- */

pub struct ForumClient {
    api: Box<dyn ForumApi>,
    registry: ConfusableRegistry,
}

impl ForumClient {
    /// Configured only when both the client id and secret are present.
    pub fn from_config(config: &AppConfig, registry: ConfusableRegistry) -> Capability<Self> {
        match &config.forum {
            Some(creds) => Capability::Configured(Self {
                api: Box::new(HttpForumApi::new(creds.clone())),
                registry,
            }),
            None => Capability::Unavailable("forum credentials not set".to_string()),
        }
    }

    pub fn with_api(api: Box<dyn ForumApi>, registry: ConfusableRegistry) -> Self {
        Self { api, registry }
    }

    fn query_variants(ticker: &str, query: &str) -> Vec<String> {
        let base = if query.trim().is_empty() { ticker } else { query };
        vec![
            base.to_string(),
            format!("{base} stock"),
            format!("{base} price"),
        ]
    }

    /// Dedup, guard, cutoff, and content assembly for one submission.
    /// Runs on every path; the permalink set is scoped to one `fetch` call.
    async fn build_article(
        &self,
        sub: ForumSubmission,
        ticker: &str,
        confusables: &[String],
        seen: &mut HashSet<String>,
        cutoff: DateTime<Utc>,
    ) -> Option<NewsArticle> {
        if seen.contains(&sub.permalink) {
            counter!("news_dedup_skipped_total").increment(1);
            return None;
        }

        // Emission-time guard: a confusable that owns the title kills the
        // submission even when the scan path let it through.
        if title_conflict(&sub.title, ticker, confusables) {
            counter!("news_relevance_rejected_total").increment(1);
            return None;
        }

        seen.insert(sub.permalink.clone());

        let published_at = sub
            .created_utc
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0));
        if !within_lookback(published_at, cutoff) {
            return None;
        }

        let mut content = format!("Post: {}\n\nTop comments:\n", sub.selftext);
        match self.api.top_comments(&sub.permalink, TOP_COMMENT_LIMIT).await {
            Ok(comments) => {
                for (i, body) in comments.iter().take(TOP_COMMENT_LIMIT as usize).enumerate() {
                    content.push_str(&format!("{}. {}\n", i + 1, body));
                }
            }
            Err(e) => {
                warn!(error = ?e, permalink = %sub.permalink, "comment fetch failed");
                content.push_str("(Unable to fetch comments)\n");
            }
        }

        counter!("news_articles_total").increment(1);
        Some(NewsArticle {
            source: SOURCE_NAME.to_string(),
            title: sub.title,
            url: Some(format!("https://www.reddit.com{}", sub.permalink)),
            content: Some(content),
            published_at,
            community: Some(sub.subreddit),
        })
    }
}

#[async_trait]
impl SourceClient for ForumClient {
    async fn fetch(
        &self,
        ticker: &str,
        query: &str,
        lookback: Duration,
    ) -> Result<Vec<NewsArticle>> {
        let confusables = self.registry.others(ticker);
        let communities = self.registry.communities().to_vec();
        let cutoff = Utc::now() - lookback;

        let mut seen: HashSet<String> = HashSet::new();
        let mut articles = Vec::new();

        // Pass 1: combined search across communities, several query variants
        // and ranking modes over a fixed recent window.
        for q in Self::query_variants(ticker, query) {
            for sort in SEARCH_SORTS {
                match self
                    .api
                    .search(&communities, &q, sort, SEARCH_TIME_FILTER, SEARCH_LIMIT)
                    .await
                {
                    Ok(subs) => {
                        for sub in subs {
                            if let Some(article) = self
                                .build_article(sub, ticker, &confusables, &mut seen, cutoff)
                                .await
                            {
                                articles.push(article);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = ?e, query = %q, sort, "forum search failed");
                        counter!("news_source_errors_total").increment(1);
                    }
                }
            }
        }

        // Pass 2: per-community hot/top scans, gated by the full relevance
        // predicate before any per-submission work.
        for community in &communities {
            for kind in [ListingKind::Hot, ListingKind::Top] {
                match self.api.listing(community, kind, LISTING_LIMIT).await {
                    Ok(subs) => {
                        for sub in subs {
                            if !is_relevant(&sub.title, &sub.selftext, ticker, &confusables) {
                                counter!("news_relevance_rejected_total").increment(1);
                                continue;
                            }
                            if let Some(article) = self
                                .build_article(sub, ticker, &confusables, &mut seen, cutoff)
                                .await
                            {
                                articles.push(article);
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = ?e, community = %community, ?kind, "forum listing failed");
                        counter!("news_source_errors_total").increment(1);
                    }
                }
            }
        }

        info!(ticker, count = articles.len(), "forum posts collected");
        Ok(articles)
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

/* ----------------------------
Tests
---------------------------- */
