// src/sources/analysis.rs
//! Financial-analysis feed client (Seeking Alpha via its RapidAPI gateway).
//!
//! Two list endpoints (analyst articles + newsroom items) are queried per
//! ticker and rolled up into ONE article whose content is a one-sentence LLM
//! theme summary over the collected titles. Without LLM access the roll-up
//! lists raw titles instead, so the output stays informative.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use metrics::counter;
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

use crate::config::{AppConfig, Capability};
use crate::models::NewsArticle;
use crate::sources::{parse_rfc3339_utc, within_lookback, SourceClient};
use crate::summarize::llm::SharedLlm;

const SOURCE_NAME: &str = "SeekingAlpha";
const MAX_TOKENS_TITLE_ROLLUP: u32 = 100;
const FALLBACK_TITLE_CAP: usize = 5;
const ROLLUP_REFERENCE_CAP: usize = 10;

const SYSTEM_HEADLINES: &str = "You are a financial analyst specializing in stock market \
analysis. Provide concise, insightful summaries of financial news headlines.";

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    data: Vec<ApiEntry>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
    #[serde(default)]
    attributes: ApiAttributes,
    links: Option<ApiLinks>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAttributes {
    title: Option<String>,
    #[serde(rename = "publishOn")]
    publish_on: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiLinks {
    #[serde(rename = "self")]
    self_path: Option<String>,
}

enum Mode {
    Http { client: reqwest::Client },
    Fixture { analysis: String, news: String },
}

pub struct AnalysisClient {
    mode: Mode,
    api_key: String,
    host: String,
    llm: Capability<SharedLlm>,
}

impl AnalysisClient {
    /// Configured only when the API key is present.
    pub fn from_config(config: &AppConfig, llm: Capability<SharedLlm>) -> Capability<Self> {
        match &config.analysis {
            Some(creds) => {
                let client = reqwest::Client::builder()
                    .user_agent("watchlist-news-agent/0.1")
                    .connect_timeout(StdDuration::from_secs(5))
                    .timeout(StdDuration::from_secs(15))
                    .build()
                    .expect("reqwest client");
                Capability::Configured(Self {
                    mode: Mode::Http { client },
                    api_key: creds.api_key.clone(),
                    host: creds.host.clone(),
                    llm,
                })
            }
            None => Capability::Unavailable("analysis API key not set".to_string()),
        }
    }

    pub fn from_fixtures(analysis: &str, news: &str, llm: Capability<SharedLlm>) -> Self {
        Self {
            mode: Mode::Fixture {
                analysis: analysis.to_string(),
                news: news.to_string(),
            },
            api_key: String::new(),
            host: String::new(),
            llm,
        }
    }

    fn parse_entries(json: &str) -> Result<Vec<NewsArticle>> {
        let resp: ApiResponse = serde_json::from_str(json).context("parsing analysis list json")?;
        let mut out = Vec::with_capacity(resp.data.len());
        for entry in resp.data {
            let title = entry
                .attributes
                .title
                .unwrap_or_else(|| "Unknown Title".to_string());
            let url = entry
                .links
                .and_then(|l| l.self_path)
                .map(|p| format!("https://seekingalpha.com{p}"));
            out.push(NewsArticle {
                source: SOURCE_NAME.to_string(),
                title: title.clone(),
                url,
                // Titles double as content; the feed's article bodies are paywalled.
                content: Some(title),
                published_at: entry
                    .attributes
                    .publish_on
                    .as_deref()
                    .and_then(parse_rfc3339_utc),
                community: None,
            });
        }
        Ok(out)
    }

    async fn fetch_list(&self, path: &str) -> Result<Vec<NewsArticle>> {
        let json = match &self.mode {
            Mode::Fixture { analysis, news } => {
                if path.starts_with("/analysis") {
                    analysis.clone()
                } else {
                    news.clone()
                }
            }
            Mode::Http { client } => {
                let url = format!("https://{}{}", self.host, path);
                info!(%url, "fetching analysis list");
                let resp = client
                    .get(&url)
                    .header("x-rapidapi-key", &self.api_key)
                    .header("x-rapidapi-host", &self.host)
                    .send()
                    .await
                    .context("analysis list get")?;
                resp.error_for_status()
                    .context("analysis list status")?
                    .text()
                    .await
                    .context("analysis list body")?
            }
        };
        Self::parse_entries(&json)
    }

    /// One-sentence theme summary over the collected titles, or a raw-title
    /// listing when no LLM is configured or the call fails.
    async fn summarize_titles(&self, ticker: &str, titles: &[String]) -> String {
        let fallback = || {
            format!(
                "Recent Seeking Alpha headlines:\n- {}",
                titles
                    .iter()
                    .take(FALLBACK_TITLE_CAP)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("\n- ")
            )
        };

        let client = match self.llm.configured() {
            Some(c) => c,
            None => return fallback(),
        };

        let bulleted = titles
            .iter()
            .map(|t| format!("- {t}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Here are recent Seeking Alpha article titles about {ticker} stock:\n\n{bulleted}\n\n\
Based on these headlines, provide a single concise sentence that summarizes the overall \
sentiment and key themes in Seeking Alpha's coverage of {ticker}."
        );

        match client
            .complete(SYSTEM_HEADLINES, &prompt, MAX_TOKENS_TITLE_ROLLUP)
            .await
        {
            Ok(summary) => {
                let references = titles
                    .iter()
                    .take(ROLLUP_REFERENCE_CAP)
                    .map(|t| format!("- {t}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("{summary}\n\nRecent headlines:\n{references}")
            }
            Err(e) => {
                warn!(error = ?e, ticker, "title roll-up failed");
                fallback()
            }
        }
    }
}

#[async_trait]
impl SourceClient for AnalysisClient {
    async fn fetch(
        &self,
        ticker: &str,
        _query: &str,
        lookback: Duration,
    ) -> Result<Vec<NewsArticle>> {
        let id = ticker.to_lowercase();
        let mut collected = Vec::new();

        for path in [
            format!("/analysis/v2/list?id={id}&size=20&number=1"),
            format!("/news/v2/list?id={id}&size=20"),
        ] {
            match self.fetch_list(&path).await {
                Ok(mut v) => collected.append(&mut v),
                Err(e) => {
                    warn!(error = ?e, ticker, path = %path, "analysis endpoint failed");
                    counter!("news_source_errors_total").increment(1);
                }
            }
        }

        let cutoff = Utc::now() - lookback;
        let recent: Vec<NewsArticle> = collected
            .into_iter()
            .filter(|a| within_lookback(a.published_at, cutoff))
            .collect();

        if recent.is_empty() {
            return Ok(Vec::new());
        }

        let titles: Vec<String> = recent.iter().map(|a| a.title.clone()).collect();
        let summary = self.summarize_titles(ticker, &titles).await;
        info!(
            ticker,
            count = recent.len(),
            "analysis articles rolled up into one summary article"
        );
        counter!("news_articles_total").increment(1);

        Ok(vec![NewsArticle {
            source: SOURCE_NAME.to_string(),
            title: format!("Seeking Alpha articles about {ticker}"),
            url: Some(format!("https://seekingalpha.com/symbol/{ticker}")),
            content: Some(summary),
            published_at: Some(Utc::now()),
            community: None,
        }])
    }

    fn name(&self) -> &'static str {
        SOURCE_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarize::llm::CountingStub;
    use std::sync::Arc;

    const ANALYSIS_FIXTURE: &str = r#"{
        "data": [
            {
                "attributes": {"title": "AAPL: margin story intact", "publishOn": "2025-08-05T09:30:00-05:00"},
                "links": {"self": "/article/1-aapl-margins"}
            },
            {
                "attributes": {"publishOn": "2025-08-05T10:00:00-05:00"}
            }
        ]
    }"#;

    const NEWS_FIXTURE: &str = r#"{
        "data": [
            {
                "attributes": {"title": "Apple beats on services", "publishOn": "2025-08-06T08:00:00Z"},
                "links": {"self": "/news/2-apple-services"}
            }
        ]
    }"#;

    #[test]
    fn entries_parse_into_typed_articles() {
        let articles = AnalysisClient::parse_entries(ANALYSIS_FIXTURE).expect("parse");
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[0].title, "AAPL: margin story intact");
        assert_eq!(
            articles[0].url.as_deref(),
            Some("https://seekingalpha.com/article/1-aapl-margins")
        );
        assert!(articles[0].published_at.is_some());
        assert_eq!(articles[1].title, "Unknown Title");
    }

    #[test]
    fn malformed_payload_is_a_typed_error() {
        assert!(AnalysisClient::parse_entries("{\"data\": 42}").is_err());
    }

    #[tokio::test]
    async fn fetch_rolls_up_into_a_single_article_with_titles_fallback() {
        let client = AnalysisClient::from_fixtures(
            ANALYSIS_FIXTURE,
            NEWS_FIXTURE,
            Capability::Unavailable("no key".into()),
        );
        let articles = client
            .fetch("AAPL", "AAPL", Duration::days(365_000))
            .await
            .expect("fetch");

        assert_eq!(articles.len(), 1);
        let rollup = &articles[0];
        assert_eq!(rollup.title, "Seeking Alpha articles about AAPL");
        let content = rollup.content.as_deref().expect("content");
        assert!(content.starts_with("Recent Seeking Alpha headlines:"));
        assert!(content.contains("- AAPL: margin story intact"));
        assert!(content.contains("- Apple beats on services"));
    }

    #[tokio::test]
    async fn fetch_uses_llm_rollup_when_configured() {
        let stub = Arc::new(CountingStub::with_response("Coverage leans bullish."));
        let client = AnalysisClient::from_fixtures(
            ANALYSIS_FIXTURE,
            NEWS_FIXTURE,
            Capability::Configured(stub.clone() as SharedLlm),
        );
        let articles = client
            .fetch("AAPL", "AAPL", Duration::days(365_000))
            .await
            .expect("fetch");

        assert_eq!(stub.call_count(), 1);
        let content = articles[0].content.as_deref().expect("content");
        assert!(content.starts_with("Coverage leans bullish."));
        assert!(content.contains("Recent headlines:"));
        let prompt = stub.last_user_prompt().expect("prompt");
        assert!(prompt.contains("- Apple beats on services"));
    }

    #[tokio::test]
    async fn stale_entries_yield_no_rollup() {
        let client = AnalysisClient::from_fixtures(
            ANALYSIS_FIXTURE,
            NEWS_FIXTURE,
            Capability::Unavailable("no key".into()),
        );
        // Everything in the fixtures is older than a zero-length lookback.
        let articles = client
            .fetch("AAPL", "AAPL", Duration::days(0))
            .await
            .expect("fetch");
        assert!(articles.is_empty());
    }
}
