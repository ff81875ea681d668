// src/relevance.rs
//! Ticker relevance predicates for forum posts, plus the confusable-ticker
//! registry they consult.
//!
//! A free-text search for a short ticker string pulls in posts that are really
//! about some other ticker. Two signals decide attribution:
//! title position (the earlier-mentioned ticker owns the post) and, when the
//! ticker only shows up in the body, raw occurrence counts. Matching is plain
//! case-insensitive substring search; tickers that double as English words get
//! no special handling.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;
use tracing::info;

pub const DEFAULT_CONFUSABLES_CONFIG_PATH: &str = "config/confusables.toml";
pub const ENV_CONFUSABLES_CONFIG_PATH: &str = "CONFUSABLES_CONFIG_PATH";

/// Tickers likely to cross-contaminate forum search results.
const BUILTIN_CONFUSABLES: &[&str] = &[
    "AAPL", "TSLA", "MSFT", "AMZN", "GOOGL", "META", "NVDA", "JPM", "GS", "BAC",
];

/// Communities scanned by the forum client.
const BUILTIN_COMMUNITIES: &[&str] = &[
    "wallstreetbets",
    "stocks",
    "investing",
    "StockMarket",
    "ValueInvesting",
    "SecurityAnalysis",
    "TSMC",
    "NVDA",
    "TSLA",
    "Apple",
];

// Dev logging gate: RELEVANCE_DEV_LOG=1 in a debug build.
fn dev_logging_enabled() -> bool {
    std::env::var("RELEVANCE_DEV_LOG").ok().as_deref() == Some("1") && cfg!(debug_assertions)
}

pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Minimal, anonymized dev logger for relevance decisions.
/// Never logs raw post text, only a short hash.
fn dev_log_decision(ticker: &str, title: &str, relevant: bool, reason: &str) {
    if !dev_logging_enabled() {
        return;
    }
    let id = anon_hash(title);
    info!(target: "relevance", %id, ticker, relevant, reason);
}

/* ----------------------------
Registry (from TOML)
---------------------------- */

#[derive(Debug, Clone, Deserialize)]
struct RegistryRoot {
    registry: RegistrySection,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistrySection {
    confusables: Vec<String>,
    #[serde(default)]
    communities: Vec<String>,
}

/// Fixed registry of confusable tickers and forum communities.
/// Loaded from TOML; falls back to the compiled-in defaults.
#[derive(Debug, Clone)]
pub struct ConfusableRegistry {
    confusables: Vec<String>,
    communities: Vec<String>,
}

impl Default for ConfusableRegistry {
    fn default() -> Self {
        Self {
            confusables: BUILTIN_CONFUSABLES.iter().map(|s| s.to_string()).collect(),
            communities: BUILTIN_COMMUNITIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ConfusableRegistry {
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let root: RegistryRoot = toml::from_str(toml_str)?;
        anyhow::ensure!(
            !root.registry.confusables.is_empty(),
            "confusables registry must not be empty"
        );
        let mut reg = Self {
            confusables: root.registry.confusables,
            communities: root.registry.communities,
        };
        if reg.communities.is_empty() {
            reg.communities = BUILTIN_COMMUNITIES.iter().map(|s| s.to_string()).collect();
        }
        Ok(reg)
    }

    /// Resolve the registry: $CONFUSABLES_CONFIG_PATH, then the default path,
    /// then the compiled-in lists. A malformed file falls back with a warning.
    pub fn load() -> Self {
        let path = std::env::var(ENV_CONFUSABLES_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFUSABLES_CONFIG_PATH));
        match fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(reg) => reg,
                Err(e) => {
                    tracing::warn!(error = ?e, path = %path.display(), "bad confusables config; using built-ins");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Confusables excluding the target itself.
    pub fn others(&self, ticker: &str) -> Vec<String> {
        self.confusables
            .iter()
            .filter(|t| !t.eq_ignore_ascii_case(ticker))
            .cloned()
            .collect()
    }

    pub fn communities(&self) -> &[String] {
        &self.communities
    }
}

/* ----------------------------
Predicates
---------------------------- */

// Non-overlapping occurrence count on pre-lowercased text.
fn count_occurrences(haystack_lower: &str, needle_lower: &str) -> usize {
    if needle_lower.is_empty() {
        return 0;
    }
    haystack_lower.match_indices(needle_lower).count()
}

fn conflict_in_lower(title_lower: &str, target_lower: &str, confusables: &[String]) -> bool {
    let target_at = title_lower.find(target_lower);
    for other in confusables {
        if other.eq_ignore_ascii_case(target_lower) {
            continue;
        }
        let other_lower = other.to_lowercase();
        if let Some(other_at) = title_lower.find(&other_lower) {
            match target_at {
                // Confusable present, target absent: the post belongs to it.
                None => return true,
                // Earlier offset wins.
                Some(t) if other_at < t => return true,
                Some(_) => {}
            }
        }
    }
    false
}

/// True when a confusable ticker owns the title: it appears while the target
/// does not, or it appears at an earlier character offset than the target.
///
/// Shared by the listing-scan relevance test and the emission-time re-check;
/// the two passes are intentionally the same predicate.
pub fn title_conflict(title: &str, target: &str, confusables: &[String]) -> bool {
    conflict_in_lower(&title.to_lowercase(), &target.to_lowercase(), confusables)
}

/// Decide whether a forum post actually concerns `target`.
///
/// Title mention beats body mentions: a titled target is relevant unless a
/// confusable shows up earlier in the title. A body-only target must strictly
/// out-count every confusable that also appears in the body; a tie rejects.
pub fn is_relevant(title: &str, body: &str, target: &str, confusables: &[String]) -> bool {
    let title_lower = title.to_lowercase();
    let body_lower = body.to_lowercase();
    let target_lower = target.to_lowercase();

    if title_lower.contains(&target_lower) {
        let ok = !conflict_in_lower(&title_lower, &target_lower, confusables);
        dev_log_decision(target, title, ok, if ok { "title" } else { "title_conflict" });
        return ok;
    }

    if body_lower.contains(&target_lower) {
        let target_count = count_occurrences(&body_lower, &target_lower);
        let ok = confusables
            .iter()
            .filter(|other| !other.eq_ignore_ascii_case(target))
            .all(|other| count_occurrences(&body_lower, &other.to_lowercase()) < target_count);
        dev_log_decision(target, title, ok, if ok { "body_count" } else { "body_outcounted" });
        return ok;
    }

    dev_log_decision(target, title, false, "absent");
    false
}

/* ----------------------------
Tests
---------------------------- */
