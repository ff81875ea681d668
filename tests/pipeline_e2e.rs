// tests/pipeline_e2e.rs
//! Whole-pipeline smoke test over fixture clients and a stubbed LLM: one
//! ticker in, one fully-populated report out, sources in insertion order.

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration, Utc};

use watchlist_news_agent::config::Capability;
use watchlist_news_agent::pipeline::NewsPipeline;
use watchlist_news_agent::relevance::ConfusableRegistry;
use watchlist_news_agent::sources::analysis::AnalysisClient;
use watchlist_news_agent::sources::forum::{ForumApi, ForumClient, ForumSubmission, ListingKind};
use watchlist_news_agent::sources::rss_news::RssNewsClient;
use watchlist_news_agent::summarize::llm::{CountingStub, SharedLlm};
use watchlist_news_agent::summarize::{SummarizationService, NO_ANALYSIS_CONTENT, NO_RSS_CONTENT};
use watchlist_news_agent::watchlist::{Mover, WatchlistMovers};

const ANALYSIS_FIXTURE: &str = r#"{
    "data": [
        {
            "attributes": {"title": "AAPL: downgrade wave", "publishOn": "2025-08-06T08:00:00Z"},
            "links": {"self": "/article/9-aapl-downgrades"}
        }
    ]
}"#;

const NEWS_LIST_FIXTURE: &str = r#"{"data": []}"#;

struct ScriptedForum;

#[async_trait]
impl ForumApi for ScriptedForum {
    async fn search(
        &self,
        _communities: &[String],
        _query: &str,
        sort: &str,
        _time_filter: &str,
        _limit: u32,
    ) -> Result<Vec<ForumSubmission>> {
        if sort == "relevance" {
            Ok(vec![ForumSubmission {
                permalink: "/r/wallstreetbets/comments/p1/aapl/".into(),
                title: "AAPL puts printing".into(),
                selftext: "aapl down big".into(),
                created_utc: Some(Utc::now().timestamp() as f64),
                subreddit: "wallstreetbets".into(),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn listing(
        &self,
        community: &str,
        kind: ListingKind,
        _limit: u32,
    ) -> Result<Vec<ForumSubmission>> {
        if community == "stocks" && kind == ListingKind::Hot {
            Ok(vec![ForumSubmission {
                permalink: "/r/stocks/comments/p2/aapl/".into(),
                title: "AAPL supplier trouble".into(),
                selftext: "aapl aapl supply chain".into(),
                created_utc: Some(Utc::now().timestamp() as f64),
                subreddit: "stocks".into(),
            }])
        } else {
            Ok(Vec::new())
        }
    }

    async fn top_comments(&self, _permalink: &str, _limit: u32) -> Result<Vec<String>> {
        Ok(vec!["buying the dip".into()])
    }
}

fn registry() -> ConfusableRegistry {
    ConfusableRegistry::from_toml_str(
        r#"
[registry]
confusables = ["AAPL", "TSLA"]
communities = ["stocks", "wallstreetbets"]
"#,
    )
    .expect("registry")
}

fn pipeline_with_stub(stub: Arc<CountingStub>) -> NewsPipeline {
    let rss_xml = fs::read_to_string("tests/fixtures/news_rss.xml").expect("fixture");
    NewsPipeline::new(
        Capability::Configured(AnalysisClient::from_fixtures(
            ANALYSIS_FIXTURE,
            NEWS_LIST_FIXTURE,
            Capability::Unavailable("no key in tests".into()),
        )),
        RssNewsClient::from_fixture(&rss_xml),
        Capability::Configured(ForumClient::with_api(Box::new(ScriptedForum), registry())),
        SummarizationService::new(Capability::Configured(stub as SharedLlm)),
        Duration::days(36500),
    )
}

#[tokio::test]
async fn one_mover_produces_one_populated_report() {
    let stub = Arc::new(CountingStub::with_response(
        "1. Downgrades.\n2. Supplier trouble.\n3. Bearish flow.",
    ));
    let pipeline = pipeline_with_stub(stub.clone());

    let groups = vec![WatchlistMovers {
        watchlist: "Tech Stocks".into(),
        movers: vec![Mover {
            ticker: "AAPL".into(),
            company_name: Some("Apple Inc.".into()),
            change_percent: -5.7,
        }],
    }];

    let reports = pipeline.process_watchlists(&groups).await;
    assert_eq!(reports.len(), 1);

    let report = &reports[0];
    assert_eq!(report.ticker, "AAPL");
    assert_eq!(report.watchlist, "Tech Stocks");
    assert_eq!(report.price_change_percent, Some(-5.7));
    assert!(report.timestamp.contains('T'));

    assert!(report
        .news_summary
        .starts_with("News Summary for AAPL (Apple Inc.) | Price Change: -5.70%"));
    assert!(report.news_summary.contains("KEY FACTORS DRIVING PRICE CHANGE:"));
    assert!(report.news_summary.contains("1. Downgrades."));

    // Analysis roll-up ran without an LLM: titles listed verbatim.
    let analysis = report.summary_analysis.as_deref().expect("analysis summary");
    assert!(!analysis.is_empty());
    assert!(report.summary_rss.is_some());

    // Forum summaries keyed exactly by the communities observed.
    let communities: Vec<&str> = report.summary_forum.keys().map(String::as_str).collect();
    assert_eq!(communities, vec!["stocks", "wallstreetbets"]);

    // analysis summary + rss summary + 2 forum groups + synthesis
    assert_eq!(stub.call_count(), 5);
}

#[tokio::test]
async fn articles_keep_fetch_order_analysis_rss_forum() {
    let stub = Arc::new(CountingStub::with_response("1. x"));
    let pipeline = pipeline_with_stub(stub);

    let news = pipeline
        .process_ticker("AAPL", Some("Apple Inc."), Some(-5.7))
        .await;

    assert!(news.articles.len() >= 4);
    assert_eq!(news.articles[0].source, "SeekingAlpha");
    assert!(news.articles[1].source.starts_with("Google News"));
    assert_eq!(news.articles.last().unwrap().source, "Reddit");

    // No forum permalink appears twice.
    let forum_urls: Vec<&str> = news
        .articles
        .iter()
        .filter(|a| a.source == "Reddit")
        .filter_map(|a| a.url.as_deref())
        .collect();
    let mut deduped = forum_urls.clone();
    deduped.sort();
    deduped.dedup();
    assert_eq!(forum_urls.len(), deduped.len());
}

#[tokio::test]
async fn all_sources_dark_still_yields_a_report() {
    let rss_xml = r#"<?xml version="1.0"?><rss version="2.0"><channel><title>empty</title></channel></rss>"#;
    let pipeline = NewsPipeline::new(
        Capability::Unavailable("analysis key not set".into()),
        RssNewsClient::from_fixture(rss_xml),
        Capability::Unavailable("forum credentials not set".into()),
        SummarizationService::new(Capability::Unavailable("llm key not set".into())),
        Duration::days(2),
    );

    let news = pipeline.process_ticker("AAPL", None, Some(4.1)).await;
    assert!(news.articles.is_empty());
    assert_eq!(news.summary_analysis.as_deref(), Some(NO_ANALYSIS_CONTENT));
    assert_eq!(news.summary_rss.as_deref(), Some(NO_RSS_CONTENT));
    assert!(news.summary_forum.is_empty());

    let text = pipeline.format_final_summary(&news).await;
    assert!(text.starts_with("News Summary for AAPL | Price Change: 4.10%"));
    assert!(text.contains("KEY FACTORS DRIVING PRICE CHANGE:"));
}

#[tokio::test]
async fn missing_change_percent_skips_the_synthesis() {
    let stub = Arc::new(CountingStub::with_response("unused bullets"));
    let pipeline = pipeline_with_stub(stub.clone());

    let news = pipeline.process_ticker("AAPL", None, None).await;
    let calls_after_sources = stub.call_count();

    let text = pipeline.format_final_summary(&news).await;
    assert!(text.contains("No price change information available."));
    // The synthesis call never happened.
    assert_eq!(stub.call_count(), calls_after_sources);
}
