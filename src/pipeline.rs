// src/pipeline.rs
//! Per-ticker aggregation: query each source in turn, summarize per source,
//! then synthesize the cross-source "key factors" bullets.
//!
//! Strictly sequential; one ticker finishes before the next starts. A failing
//! source degrades to an empty article set for that source and the run keeps
//! going.

use chrono::{Duration, Utc};
use metrics::counter;
use tracing::{info, warn};

use crate::config::{AppConfig, Capability};
use crate::models::{NewsArticle, NewsReport, StockNews};
use crate::relevance::ConfusableRegistry;
use crate::sources::analysis::AnalysisClient;
use crate::sources::forum::ForumClient;
use crate::sources::rss_news::RssNewsClient;
use crate::sources::{ensure_metrics_described, SourceClient};
use crate::summarize::llm::build_llm;
use crate::summarize::SummarizationService;
use crate::watchlist::WatchlistMovers;

pub struct NewsPipeline {
    analysis: Capability<AnalysisClient>,
    rss: RssNewsClient,
    forum: Capability<ForumClient>,
    summarizer: SummarizationService,
    lookback: Duration,
}

impl NewsPipeline {
    pub fn new(
        analysis: Capability<AnalysisClient>,
        rss: RssNewsClient,
        forum: Capability<ForumClient>,
        summarizer: SummarizationService,
        lookback: Duration,
    ) -> Self {
        ensure_metrics_described();
        Self {
            analysis,
            rss,
            forum,
            summarizer,
            lookback,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let llm = build_llm(config);
        let registry = ConfusableRegistry::load();
        Self::new(
            AnalysisClient::from_config(config, llm.clone()),
            RssNewsClient::new(),
            ForumClient::from_config(config, registry),
            SummarizationService::new(llm),
            Duration::days(config.lookback_days),
        )
    }

    async fn fetch_from(
        &self,
        client: &dyn SourceClient,
        ticker: &str,
        query: &str,
    ) -> Vec<NewsArticle> {
        match client.fetch(ticker, query, self.lookback).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(error = ?e, source = client.name(), ticker, "source fetch failed");
                counter!("news_source_errors_total").increment(1);
                Vec::new()
            }
        }
    }

    async fn fetch_optional(
        &self,
        capability: &Capability<impl SourceClient>,
        ticker: &str,
        query: &str,
    ) -> Vec<NewsArticle> {
        match capability {
            Capability::Configured(client) => self.fetch_from(client, ticker, query).await,
            Capability::Unavailable(reason) => {
                info!(ticker, reason = %reason, "source skipped");
                Vec::new()
            }
        }
    }

    /// Collect and summarize everything for one ticker.
    pub async fn process_ticker(
        &self,
        ticker: &str,
        company_name: Option<&str>,
        change_percent: Option<f64>,
    ) -> StockNews {
        info!(
            ticker,
            company = company_name.unwrap_or("Unknown"),
            "processing news"
        );
        let mut news = StockNews::new(
            ticker,
            company_name.map(|s| s.to_string()),
            change_percent,
        );

        let query = match company_name {
            Some(name) => format!("{ticker} {name}"),
            None => ticker.to_string(),
        };

        let analysis_articles = self.fetch_optional(&self.analysis, ticker, &query).await;
        let rss_articles = self.fetch_from(&self.rss, ticker, &query).await;
        let forum_articles = self.fetch_optional(&self.forum, ticker, &query).await;

        // Fetch order is the article order: analysis, then RSS, then forum.
        news.articles.extend(analysis_articles.iter().cloned());
        news.articles.extend(rss_articles.iter().cloned());
        news.articles.extend(forum_articles.iter().cloned());

        news.summary_analysis = Some(
            self.summarizer
                .summarize_analysis(&analysis_articles, ticker, change_percent)
                .await,
        );
        news.summary_rss = Some(
            self.summarizer
                .summarize_rss(&rss_articles, ticker, change_percent)
                .await,
        );
        news.summary_forum = self
            .summarizer
            .summarize_forum_by_community(&forum_articles, ticker, change_percent)
            .await;

        info!(ticker, articles = news.articles.len(), "news processing complete");
        news
    }

    /// Render the final report text: header plus the synthesized bullets.
    pub async fn format_final_summary(&self, news: &StockNews) -> String {
        let mut header = match &news.company_name {
            Some(name) => format!("News Summary for {} ({})", news.ticker, name),
            None => format!("News Summary for {}", news.ticker),
        };
        if let Some(cp) = news.price_change_percent {
            header.push_str(&format!(" | Price Change: {cp:.2}%"));
        }

        let mut out = vec![header.clone(), "=".repeat(header.len()), String::new()];

        match news.price_change_percent {
            Some(cp) => {
                let bullets = self
                    .summarizer
                    .synthesize(
                        &news.ticker,
                        cp,
                        news.summary_analysis.as_deref().unwrap_or_default(),
                        news.summary_rss.as_deref().unwrap_or_default(),
                        &news.summary_forum,
                    )
                    .await;
                out.push("KEY FACTORS DRIVING PRICE CHANGE:".to_string());
                out.push(bullets);
            }
            None => out.push("No price change information available.".to_string()),
        }

        out.join("\n")
    }

    /// Run the whole fetch-and-summarize cycle for every mover, one report per
    /// ticker.
    pub async fn process_watchlists(&self, groups: &[WatchlistMovers]) -> Vec<NewsReport> {
        let mut reports = Vec::new();

        for group in groups {
            info!(watchlist = %group.watchlist, "processing watchlist");
            for mover in &group.movers {
                let news = self
                    .process_ticker(
                        &mover.ticker,
                        mover.company_name.as_deref(),
                        Some(mover.change_percent),
                    )
                    .await;
                let news_summary = self.format_final_summary(&news).await;

                reports.push(NewsReport {
                    ticker: news.ticker.clone(),
                    company_name: news.company_name.clone(),
                    price_change_percent: news.price_change_percent,
                    news_summary,
                    summary_analysis: news.summary_analysis.clone(),
                    summary_rss: news.summary_rss.clone(),
                    summary_forum: news.summary_forum.clone(),
                    timestamp: Utc::now().to_rfc3339(),
                    watchlist: group.watchlist.clone(),
                });
                info!(ticker = %mover.ticker, "report complete");
            }
        }

        info!(count = reports.len(), "watchlist processing complete");
        reports
    }
}
