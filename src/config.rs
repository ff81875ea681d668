// src/config.rs
//! Application configuration, read from the environment exactly once at
//! startup and passed by reference into every client constructor.
//!
//! Credentials are optional per source: a missing credential turns the
//! matching client into `Capability::Unavailable` rather than a runtime
//! surprise deep inside a fetch.

use std::env;

use tracing::{info, warn};

// --- env names & defaults ---
pub const ENV_FORUM_CLIENT_ID: &str = "REDDIT_CLIENT_ID";
pub const ENV_FORUM_CLIENT_SECRET: &str = "REDDIT_CLIENT_SECRET";
pub const ENV_FORUM_USER_AGENT: &str = "REDDIT_USER_AGENT";
pub const DEFAULT_FORUM_USER_AGENT: &str = "watchlist-news-agent";

pub const ENV_ANALYSIS_API_KEY: &str = "SEEKING_ALPHA_API_KEY";
pub const ENV_ANALYSIS_HOST: &str = "SEEKING_ALPHA_HOST";
pub const DEFAULT_ANALYSIS_HOST: &str = "seeking-alpha.p.rapidapi.com";

pub const ENV_LLM_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_LLM_MODEL: &str = "OPENAI_MODEL";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o";

pub const ENV_GATEWAY_BASE_URL: &str = "GATEWAY_BASE_URL";
pub const DEFAULT_GATEWAY_BASE_URL: &str = "https://localhost:5000/v1/api";

pub const ENV_SMTP_HOST: &str = "SMTP_HOST";
pub const ENV_SMTP_USER: &str = "SMTP_USER";
pub const ENV_SMTP_PASS: &str = "SMTP_PASS";
pub const ENV_EMAIL_FROM: &str = "NOTIFY_EMAIL_FROM";
pub const ENV_EMAIL_TO: &str = "NOTIFY_EMAIL_TO";

pub const ENV_LOOKBACK_DAYS: &str = "NEWS_LOOKBACK_DAYS";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 2;

pub const ENV_MOVE_THRESHOLD: &str = "MOVE_THRESHOLD_PERCENT";
pub const DEFAULT_MOVE_THRESHOLD: f64 = 3.0;

pub const ENV_WATCHLIST_MOCK: &str = "WATCHLIST_MOCK";

/// Tagged availability of an optional collaborator.
///
/// Replaces the "client field is null, callers test for it" pattern: a client
/// is either fully configured or carries the reason it is not, and call sites
/// branch on the variant.
#[derive(Debug, Clone)]
pub enum Capability<T> {
    Configured(T),
    Unavailable(String),
}

impl<T> Capability<T> {
    pub fn configured(&self) -> Option<&T> {
        match self {
            Capability::Configured(t) => Some(t),
            Capability::Unavailable(_) => None,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Capability::Configured(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Capability::Configured(_) => None,
            Capability::Unavailable(r) => Some(r.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ForumCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct AnalysisCredentials {
    pub api_key: String,
    pub host: String,
}

#[derive(Debug, Clone)]
pub struct LlmCredentials {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub user: String,
    pub pass: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub forum: Option<ForumCredentials>,
    pub analysis: Option<AnalysisCredentials>,
    pub llm: Option<LlmCredentials>,
    pub smtp: Option<SmtpConfig>,
    pub gateway_base_url: String,
    pub lookback_days: i64,
    pub move_threshold_percent: f64,
    pub use_mock_watchlist: bool,
}

fn non_empty(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AppConfig {
    /// Read the whole configuration from the environment. Missing credentials
    /// are not an error; the matching capability simply stays unavailable.
    pub fn from_env() -> Self {
        let forum = match (
            non_empty(ENV_FORUM_CLIENT_ID),
            non_empty(ENV_FORUM_CLIENT_SECRET),
        ) {
            (Some(client_id), Some(client_secret)) => Some(ForumCredentials {
                client_id,
                client_secret,
                user_agent: non_empty(ENV_FORUM_USER_AGENT)
                    .unwrap_or_else(|| DEFAULT_FORUM_USER_AGENT.to_string()),
            }),
            _ => None,
        };

        let analysis = non_empty(ENV_ANALYSIS_API_KEY).map(|api_key| AnalysisCredentials {
            api_key,
            host: non_empty(ENV_ANALYSIS_HOST).unwrap_or_else(|| DEFAULT_ANALYSIS_HOST.to_string()),
        });

        let llm = non_empty(ENV_LLM_API_KEY).map(|api_key| LlmCredentials {
            api_key,
            model: non_empty(ENV_LLM_MODEL).unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
        });

        let smtp = match (
            non_empty(ENV_SMTP_HOST),
            non_empty(ENV_SMTP_USER),
            non_empty(ENV_SMTP_PASS),
            non_empty(ENV_EMAIL_FROM),
            non_empty(ENV_EMAIL_TO),
        ) {
            (Some(host), Some(user), Some(pass), Some(from), Some(to)) => Some(SmtpConfig {
                host,
                user,
                pass,
                from,
                to,
            }),
            _ => None,
        };

        let lookback_days = non_empty(ENV_LOOKBACK_DAYS)
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|v| *v >= 0)
            .unwrap_or(DEFAULT_LOOKBACK_DAYS);

        let move_threshold_percent = non_empty(ENV_MOVE_THRESHOLD)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
            .unwrap_or(DEFAULT_MOVE_THRESHOLD);

        Self {
            forum,
            analysis,
            llm,
            smtp,
            gateway_base_url: non_empty(ENV_GATEWAY_BASE_URL)
                .unwrap_or_else(|| DEFAULT_GATEWAY_BASE_URL.to_string()),
            lookback_days,
            move_threshold_percent,
            use_mock_watchlist: non_empty(ENV_WATCHLIST_MOCK).as_deref() == Some("1"),
        }
    }

    /// Log which credentials are present. Never logs the values.
    pub fn log_presence(&self) {
        match &self.forum {
            Some(f) => info!(user_agent = %f.user_agent, "forum credentials set"),
            None => warn!("forum credentials missing; forum search will be skipped"),
        }
        match &self.analysis {
            Some(a) => info!(host = %a.host, "analysis API key set"),
            None => warn!("analysis API key missing; analysis search will be skipped"),
        }
        match &self.llm {
            Some(l) => info!(model = %l.model, "LLM API key set"),
            None => warn!("LLM API key missing; summarization will not be available"),
        }
        if self.smtp.is_none() {
            info!("SMTP not configured; reports go to console only");
        }
    }
}
