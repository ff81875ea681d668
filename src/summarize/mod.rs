// src/summarize/mod.rs
//! Summarization fan-out: per-source summaries, per-community forum
//! summaries, and the final cross-source synthesis.
//!
//! Hard rules: an empty article set never reaches the LLM, every single
//! article body is clipped to a per-source character budget with an explicit
//! marker, and any provider failure degrades to a placeholder string at this
//! boundary.

pub mod llm;

use std::collections::BTreeMap;

use tracing::warn;

use crate::config::Capability;
use crate::models::NewsArticle;
use llm::SharedLlm;

pub const NO_ANALYSIS_CONTENT: &str = "No relevant Seeking Alpha articles found.";
pub const NO_RSS_CONTENT: &str = "No relevant Google News articles found.";
pub const LLM_UNAVAILABLE_NOTICE: &str = "Summarization not available (API key not set).";
pub const TRUNCATION_MARKER: &str = "... [truncated]";

/// Per-article character budgets.
pub const ANALYSIS_CHAR_BUDGET: usize = 5000;
pub const RSS_CHAR_BUDGET: usize = 1000;
pub const FORUM_CHAR_BUDGET: usize = 3000;

/// Most-recent-article caps per summary call.
pub const RSS_ARTICLE_CAP: usize = 15;
pub const FORUM_POSTS_PER_COMMUNITY: usize = 5;

/// Per-source summaries get the longer ceiling; the synthesis is capped
/// smaller on purpose.
const MAX_TOKENS_SOURCE: u32 = 500;
const MAX_TOKENS_SYNTHESIS: u32 = 300;

const SYSTEM_SOURCE: &str = "You are a financial analyst specializing in stock market analysis. \
Provide concise, insightful summaries of market news and sentiment, as well as earnings-related \
news that may have direct impact to price change.";

const SYSTEM_SYNTHESIS: &str = "You are a financial analyst specializing in stock market analysis. \
Provide concise, insightful bullet points explaining stock price movements.";

/// Price-direction word for prompts. Zero counts as a decrease.
pub fn direction_word(change_percent: Option<f64>) -> &'static str {
    match change_percent {
        Some(v) if v > 0.0 => "increase",
        _ => "decrease",
    }
}

/// Clip `content` to `budget` characters, appending the marker when clipped.
pub fn clip_to_budget(content: &str, budget: usize) -> String {
    if content.chars().count() > budget {
        let mut clipped: String = content.chars().take(budget).collect();
        clipped.push_str(TRUNCATION_MARKER);
        clipped
    } else {
        content.to_string()
    }
}

// Most-recent-first; unknown timestamps sort last.
fn recent_first(articles: &[NewsArticle]) -> Vec<&NewsArticle> {
    let mut sorted: Vec<&NewsArticle> = articles.iter().collect();
    sorted.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    sorted
}

pub struct SummarizationService {
    llm: Capability<SharedLlm>,
}

impl SummarizationService {
    pub fn new(llm: Capability<SharedLlm>) -> Self {
        Self { llm }
    }

    async fn generate(&self, ticker: &str, system: &str, user: &str, max_tokens: u32) -> String {
        let client = match self.llm.configured() {
            Some(c) => c,
            None => return LLM_UNAVAILABLE_NOTICE.to_string(),
        };
        match client.complete(system, user, max_tokens).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = ?e, ticker, "summary generation failed");
                format!("Error generating summary for {ticker}: {e:#}")
            }
        }
    }

    /// Summarize analysis-feed articles.
    pub async fn summarize_analysis(
        &self,
        articles: &[NewsArticle],
        ticker: &str,
        change_percent: Option<f64>,
    ) -> String {
        if articles.is_empty() {
            return NO_ANALYSIS_CONTENT.to_string();
        }

        let mut content = String::new();
        for article in articles {
            let body = clip_to_budget(article.content.as_deref().unwrap_or(""), ANALYSIS_CHAR_BUDGET);
            content.push_str(&format!("ARTICLE: {}\n\n{}\n\n---\n\n", article.title, body));
        }

        let prompt = format!(
            "Analyze these Seeking Alpha articles about {ticker} stock and provide a concise, \
coherent summary that explains what analysts believe is causing the stock's {direction} \
({change:.2}% change).\n\
Focus on the most insightful points about fundamentals, catalysts, and analyst opinions.\n\
Organize the summary into 3 key points with clear explanations that comprehensively captures \
the most insightful points.\n\
Be specific about factors driving the price change.\n\n\
Seeking Alpha content:\n{content}",
            direction = direction_word(change_percent),
            change = change_percent.unwrap_or(0.0),
        );
        self.generate(ticker, SYSTEM_SOURCE, &prompt, MAX_TOKENS_SOURCE)
            .await
    }

    /// Summarize RSS news articles: up to the 15 most recent headlines.
    pub async fn summarize_rss(
        &self,
        articles: &[NewsArticle],
        ticker: &str,
        change_percent: Option<f64>,
    ) -> String {
        if articles.is_empty() {
            return NO_RSS_CONTENT.to_string();
        }

        let mut content = String::from("Recent headlines and news:\n\n");
        for article in recent_first(articles).into_iter().take(RSS_ARTICLE_CAP) {
            let outlet = article
                .source
                .strip_prefix("Google News - ")
                .unwrap_or(&article.source);
            content.push_str(&format!("HEADLINE: {} ({})\n", article.title, outlet));
            if let Some(body) = article.content.as_deref().filter(|b| !b.is_empty()) {
                content.push_str(&format!("CONTENT: {}\n", clip_to_budget(body, RSS_CHAR_BUDGET)));
            }
            content.push_str("---\n");
        }

        let prompt = format!(
            "Analyze these news headlines and articles about {ticker} stock and provide a concise, \
coherent summary that explains what is likely causing the stock's {direction} \
({change:.2}% change).\n\
Focus on the most important news, events, and market reactions.\n\
Organize the summary into 3 key points with clear explanations that comprehensively captures \
the most insightful points.\n\
Be specific about factors driving the price change.\n\n\
News content:\n{content}",
            direction = direction_word(change_percent),
            change = change_percent.unwrap_or(0.0),
        );
        self.generate(ticker, SYSTEM_SOURCE, &prompt, MAX_TOKENS_SOURCE)
            .await
    }

    /// Summarize forum posts grouped by origin community: one independent
    /// summary per community, up to 5 most recent posts each.
    pub async fn summarize_forum_by_community(
        &self,
        articles: &[NewsArticle],
        ticker: &str,
        change_percent: Option<f64>,
    ) -> BTreeMap<String, String> {
        let mut grouped: BTreeMap<String, Vec<NewsArticle>> = BTreeMap::new();
        for article in articles {
            if let Some(community) = &article.community {
                grouped
                    .entry(community.clone())
                    .or_default()
                    .push(article.clone());
            }
        }

        let mut summaries = BTreeMap::new();
        for (community, posts) in grouped {
            let mut content =
                format!("Reddit discussions from r/{community} about {ticker}:\n\n");
            for post in recent_first(&posts)
                .into_iter()
                .take(FORUM_POSTS_PER_COMMUNITY)
            {
                let body = clip_to_budget(post.content.as_deref().unwrap_or(""), FORUM_CHAR_BUDGET);
                content.push_str(&format!("POST: {}\n{}\n---\n", post.title, body));
            }

            let prompt = format!(
                "Analyze these Reddit discussions about {ticker} stock and provide a concise, \
coherent summary that explains what Redditors believe is causing the stock's {direction} \
({change:.2}% change).\n\
Focus on the most insightful points about market sentiment, catalysts, and predictions.\n\
Organize the summary into 3 key points with clear explanations that comprehensively captures \
the most insightful points.\n\
Be specific about factors driving the price change.\n\n\
Reddit content:\n{content}",
                direction = direction_word(change_percent),
                change = change_percent.unwrap_or(0.0),
            );
            let summary = self
                .generate(ticker, SYSTEM_SOURCE, &prompt, MAX_TOKENS_SOURCE)
                .await;
            summaries.insert(community, summary);
        }
        summaries
    }

    /// Cross-source synthesis: at most 3 bullet points strictly tied to the
    /// price move, with an explicit instruction to omit bullets when no causal
    /// news exists.
    pub async fn synthesize(
        &self,
        ticker: &str,
        change_percent: f64,
        analysis_summary: &str,
        rss_summary: &str,
        forum_summaries: &BTreeMap<String, String>,
    ) -> String {
        if !self.llm.is_configured() {
            return LLM_UNAVAILABLE_NOTICE.to_string();
        }

        let mut combined = format!("Seeking Alpha Summary:\n{analysis_summary}\n\n");
        combined.push_str(&format!("Google News Summary:\n{rss_summary}\n\n"));
        for (community, summary) in forum_summaries {
            combined.push_str(&format!("Reddit r/{community} Summary:\n{summary}\n\n"));
        }

        let direction = direction_word(Some(change_percent));
        let prompt = format!(
            "Based on the following summaries about {ticker} stock, create exactly 3 concise \
bullet points that capture the most important factors driving the stock's {direction} of \
{magnitude:.2}%.\n\n\
Focus on the most significant and impactful factors mentioned across multiple sources.\n\
Each bullet point should be clear, specific, and directly related to the stock price movement.\n\n\
{combined}\n\
Return ONLY the 3 bullet points, numbered 1-3, with no introduction or conclusion.\n\
Each bullet point should be 1-2 sentences maximum.\n\
ENSURE THAT ALL BULLET POINTS ARE STRICTLY RELATED TO THE STOCK PRICE MOVEMENT, PLEASE DO NOT \
INCLUDE FILLER NEWS THAT ARE NOT DIRECTLY RELATED TO THE STOCK.\n\
IF THERE ARE NO NEWS ASSOCIATED WITH THE STOCK PRICE MOVEMENT, PLEASE JUST OMIT THE BULLET POINTS.",
            magnitude = change_percent.abs(),
        );
        self.generate(ticker, SYSTEM_SYNTHESIS, &prompt, MAX_TOKENS_SYNTHESIS)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use llm::CountingStub;
    use std::sync::Arc;

    fn service_with_stub(response: &str) -> (SummarizationService, Arc<CountingStub>) {
        let stub = Arc::new(CountingStub::with_response(response));
        let svc = SummarizationService::new(Capability::Configured(stub.clone() as SharedLlm));
        (svc, stub)
    }

    fn article(title: &str, community: Option<&str>, day: u32) -> NewsArticle {
        NewsArticle {
            source: "Reddit".into(),
            title: title.into(),
            url: None,
            content: Some(format!("{title} body")),
            published_at: Some(Utc.with_ymd_and_hms(2025, 8, day, 12, 0, 0).unwrap()),
            community: community.map(|c| c.to_string()),
        }
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_calls() {
        let (svc, stub) = service_with_stub("never used");
        let rss = svc.summarize_rss(&[], "AAPL", Some(4.2)).await;
        let analysis = svc.summarize_analysis(&[], "AAPL", Some(4.2)).await;
        let forum = svc
            .summarize_forum_by_community(&[], "AAPL", Some(4.2))
            .await;

        assert_eq!(rss, NO_RSS_CONTENT);
        assert_eq!(analysis, NO_ANALYSIS_CONTENT);
        assert!(forum.is_empty());
        assert_eq!(stub.call_count(), 0);
    }

    #[test]
    fn clip_is_exact_cap_plus_marker() {
        let long = "x".repeat(RSS_CHAR_BUDGET + 500);
        let clipped = clip_to_budget(&long, RSS_CHAR_BUDGET);
        assert_eq!(
            clipped.chars().count(),
            RSS_CHAR_BUDGET + TRUNCATION_MARKER.chars().count()
        );
        assert!(clipped.ends_with(TRUNCATION_MARKER));

        let short = "short body";
        assert_eq!(clip_to_budget(short, RSS_CHAR_BUDGET), short);
    }

    #[test]
    fn zero_change_reads_as_decrease() {
        assert_eq!(direction_word(Some(0.0)), "decrease");
        assert_eq!(direction_word(Some(-2.5)), "decrease");
        assert_eq!(direction_word(Some(2.5)), "increase");
        assert_eq!(direction_word(None), "decrease");
    }

    #[tokio::test]
    async fn forum_summaries_key_on_observed_communities() {
        let (svc, stub) = service_with_stub("summary");
        let articles = vec![
            article("AAPL thread one", Some("stocks"), 5),
            article("AAPL thread two", Some("wallstreetbets"), 6),
            article("AAPL thread three", Some("stocks"), 4),
            // no community: contributes to no group
            article("wire story", None, 5),
        ];
        let out = svc
            .summarize_forum_by_community(&articles, "AAPL", Some(-3.5))
            .await;
        assert_eq!(
            out.keys().cloned().collect::<Vec<_>>(),
            vec!["stocks".to_string(), "wallstreetbets".to_string()]
        );
        assert_eq!(stub.call_count(), 2);
    }

    #[tokio::test]
    async fn rss_prompt_orders_most_recent_first() {
        let (svc, stub) = service_with_stub("summary");
        let mut articles = vec![
            article("older", None, 2),
            article("newest", None, 6),
            article("middle", None, 4),
        ];
        articles[0].source = "Google News - WireA".into();
        articles[1].source = "Google News - WireB".into();
        articles[2].source = "Google News - WireC".into();

        svc.summarize_rss(&articles, "AAPL", Some(3.1)).await;
        let prompt = stub.last_user_prompt().expect("prompt");
        let newest_at = prompt.find("HEADLINE: newest").expect("newest");
        let middle_at = prompt.find("HEADLINE: middle").expect("middle");
        let older_at = prompt.find("HEADLINE: older").expect("older");
        assert!(newest_at < middle_at && middle_at < older_at);
        // outlet prefix is stripped for display
        assert!(prompt.contains("(WireB)"));
    }

    #[tokio::test]
    async fn synthesis_prompt_carries_the_hard_constraints() {
        let (svc, stub) = service_with_stub("1. a\n2. b\n3. c");
        let out = svc
            .synthesize("AAPL", -4.75, "sa", "news", &BTreeMap::new())
            .await;
        assert_eq!(out, "1. a\n2. b\n3. c");

        let prompt = stub.last_user_prompt().expect("prompt");
        assert!(prompt.contains("exactly 3 concise bullet points"));
        assert!(prompt.contains("numbered 1-3"));
        assert!(prompt.contains("OMIT THE BULLET POINTS"));
        assert!(prompt.contains("decrease of 4.75%"));
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_placeholder() {
        let svc = SummarizationService::new(Capability::Configured(
            Arc::new(llm::FailingStub) as SharedLlm
        ));
        let out = svc
            .summarize_rss(&[article("a", None, 5)], "AAPL", Some(3.0))
            .await;
        assert!(out.starts_with("Error generating summary for AAPL:"));
    }

    #[tokio::test]
    async fn unavailable_llm_returns_fixed_notice() {
        let svc = SummarizationService::new(Capability::Unavailable("no key".into()));
        let out = svc
            .summarize_rss(&[article("a", None, 5)], "AAPL", Some(3.0))
            .await;
        assert_eq!(out, LLM_UNAVAILABLE_NOTICE);
        let synth = svc.synthesize("AAPL", 3.0, "x", "y", &BTreeMap::new()).await;
        assert_eq!(synth, LLM_UNAVAILABLE_NOTICE);
    }
}
