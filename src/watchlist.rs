// src/watchlist.rs
//! Brokerage-gateway client: watchlists, their instruments, and market-data
//! snapshots, reduced to the list of movers worth explaining.
//!
//! The gateway's snapshot rows key numeric fields by code ("31" last price,
//! "82" change, "83" change percent) and mix number/string encodings; the
//! schema structs below pin that shape down and turn mismatches into typed
//! errors instead of panics deep in the run.

use std::collections::{HashMap, HashSet};
use std::time::Duration as StdDuration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::AppConfig;

const SNAPSHOT_FIELDS: &str = "31,82,83";

#[derive(Debug, Clone, Deserialize)]
pub struct Watchlist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
struct WatchlistsResponse {
    #[serde(default)]
    data: WatchlistsData,
}

#[derive(Debug, Default, Deserialize)]
struct WatchlistsData {
    #[serde(default)]
    user_lists: Vec<Watchlist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Instrument {
    pub conid: i64,
    pub ticker: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "assetClass")]
    pub asset_class: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WatchlistDetails {
    #[serde(default)]
    instruments: Vec<Instrument>,
}

// Raw snapshot row; numeric fields arrive as strings or numbers depending on
// the gateway build.
#[derive(Debug, Deserialize)]
struct SnapshotRow {
    conid: Option<serde_json::Value>,
    #[serde(rename = "31")]
    last_price: Option<serde_json::Value>,
    #[serde(rename = "82")]
    change: Option<serde_json::Value>,
    #[serde(rename = "83")]
    change_percent: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub conid: i64,
    pub last_price: Option<f64>,
    pub change: Option<f64>,
    pub change_percent: Option<f64>,
}

fn value_to_f64(v: &serde_json::Value) -> Option<f64> {
    match v {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

impl MarketSnapshot {
    fn from_row(row: SnapshotRow) -> Option<Self> {
        let conid = row.conid.as_ref().and_then(value_to_f64)? as i64;
        if conid <= 0 {
            warn!(?row, "invalid conid in snapshot row");
            return None;
        }

        let change_percent = row
            .change_percent
            .as_ref()
            .and_then(value_to_f64)
            .filter(|v| v.is_finite());
        if let Some(cp) = change_percent {
            // Flagged, not rejected.
            if cp.abs() > 100.0 {
                warn!(conid, change_percent = cp, "unusual change percentage detected");
            }
        }

        Some(Self {
            conid,
            last_price: row.last_price.as_ref().and_then(value_to_f64),
            change: row.change.as_ref().and_then(value_to_f64),
            change_percent,
        })
    }
}

/// One instrument that cleared the move threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct Mover {
    pub ticker: String,
    pub company_name: Option<String>,
    pub change_percent: f64,
}

/// Movers grouped by the watchlist they came from.
#[derive(Debug, Clone)]
pub struct WatchlistMovers {
    pub watchlist: String,
    pub movers: Vec<Mover>,
}

/// Watchlist/market-data provider surface.
#[async_trait]
pub trait WatchlistProvider: Send + Sync {
    async fn list_watchlists(&self) -> Result<Vec<Watchlist>>;
    async fn watchlist_instruments(&self, id: &str) -> Result<Vec<Instrument>>;
    async fn market_snapshot(&self, conids: &[i64]) -> Result<HashMap<i64, MarketSnapshot>>;
}

/// HTTP client for the brokerage's client-portal gateway.
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
}

impl GatewayClient {
    pub fn from_config(config: &AppConfig) -> Self {
        // The local gateway ships a self-signed certificate.
        let http = reqwest::Client::builder()
            .user_agent("watchlist-news-agent/0.1")
            .danger_accept_invalid_certs(true)
            .connect_timeout(StdDuration::from_secs(5))
            .timeout(StdDuration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: config.gateway_base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("gateway get {path}"))?
            .error_for_status()
            .with_context(|| format!("gateway status {path}"))?;
        resp.json::<T>()
            .await
            .with_context(|| format!("gateway body {path}"))
    }
}

#[async_trait]
impl WatchlistProvider for GatewayClient {
    async fn list_watchlists(&self) -> Result<Vec<Watchlist>> {
        let resp: WatchlistsResponse = self.get_json("/iserver/watchlists?SC=USER_WATCHLIST").await?;
        Ok(resp.data.user_lists)
    }

    async fn watchlist_instruments(&self, id: &str) -> Result<Vec<Instrument>> {
        let details: WatchlistDetails = self
            .get_json(&format!("/iserver/watchlist?id={id}"))
            .await?;
        Ok(details.instruments)
    }

    async fn market_snapshot(&self, conids: &[i64]) -> Result<HashMap<i64, MarketSnapshot>> {
        let joined = conids
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let rows: Vec<SnapshotRow> = self
            .get_json(&format!(
                "/iserver/marketdata/snapshot?conids={joined}&fields={SNAPSHOT_FIELDS}"
            ))
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            if let Some(snap) = MarketSnapshot::from_row(row) {
                out.insert(snap.conid, snap);
            }
        }
        Ok(out)
    }
}

/// Walk every watchlist and keep the instruments whose absolute change meets
/// the threshold. One failing watchlist is logged and skipped, never fatal.
pub async fn select_movers(
    provider: &dyn WatchlistProvider,
    threshold_percent: f64,
) -> Result<Vec<WatchlistMovers>> {
    let watchlists = provider.list_watchlists().await.context("list watchlists")?;
    info!(count = watchlists.len(), "watchlists retrieved");

    let mut out = Vec::new();
    for wl in watchlists {
        let instruments = match provider.watchlist_instruments(&wl.id).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = ?e, watchlist = %wl.name, "instrument fetch failed");
                continue;
            }
        };
        if instruments.is_empty() {
            continue;
        }

        let conids: Vec<i64> = instruments.iter().map(|i| i.conid).collect();
        let snapshots = match provider.market_snapshot(&conids).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = ?e, watchlist = %wl.name, "snapshot fetch failed");
                continue;
            }
        };

        let mut movers = Vec::new();
        for instrument in instruments {
            let ticker = match &instrument.ticker {
                Some(t) if !t.is_empty() => t.clone(),
                _ => {
                    warn!(conid = instrument.conid, "skipping instrument without ticker");
                    continue;
                }
            };
            let change_percent = snapshots
                .get(&instrument.conid)
                .and_then(|s| s.change_percent);
            if let Some(cp) = change_percent {
                if cp.abs() >= threshold_percent {
                    movers.push(Mover {
                        ticker,
                        company_name: instrument.name.clone(),
                        change_percent: cp,
                    });
                }
            }
        }

        if !movers.is_empty() {
            info!(watchlist = %wl.name, count = movers.len(), "movers selected");
            out.push(WatchlistMovers {
                watchlist: wl.name,
                movers,
            });
        }
    }
    Ok(out)
}

/// Drop tickers already seen in an earlier watchlist; the first occurrence
/// wins. Watchlists emptied by the filter disappear from the result.
pub fn filter_duplicate_tickers(groups: Vec<WatchlistMovers>) -> Vec<WatchlistMovers> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    let mut removed = 0usize;

    for group in groups {
        let mut kept = Vec::new();
        for mover in group.movers {
            if seen.insert(mover.ticker.clone()) {
                kept.push(mover);
            } else {
                removed += 1;
            }
        }
        if !kept.is_empty() {
            out.push(WatchlistMovers {
                watchlist: group.watchlist,
                movers: kept,
            });
        }
    }

    info!(removed, "duplicate tickers filtered");
    out
}

/// Built-in sample used when the gateway is unreachable or mocking is forced.
pub fn sample_watchlist() -> Vec<WatchlistMovers> {
    vec![WatchlistMovers {
        watchlist: "Tech Stocks".to_string(),
        movers: vec![
            Mover {
                ticker: "AAPL".to_string(),
                company_name: Some("Apple Inc.".to_string()),
                change_percent: -5.7,
            },
            Mover {
                ticker: "TSLA".to_string(),
                company_name: Some("Tesla, Inc.".to_string()),
                change_percent: 8.4,
            },
        ],
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider;

    #[async_trait]
    impl WatchlistProvider for StubProvider {
        async fn list_watchlists(&self) -> Result<Vec<Watchlist>> {
            Ok(vec![
                Watchlist {
                    id: "w1".into(),
                    name: "Tech".into(),
                },
                Watchlist {
                    id: "w2".into(),
                    name: "Broken".into(),
                },
            ])
        }

        async fn watchlist_instruments(&self, id: &str) -> Result<Vec<Instrument>> {
            match id {
                "w1" => Ok(vec![
                    Instrument {
                        conid: 1,
                        ticker: Some("AAPL".into()),
                        name: Some("Apple Inc.".into()),
                        asset_class: Some("STK".into()),
                    },
                    Instrument {
                        conid: 2,
                        ticker: Some("MSFT".into()),
                        name: Some("Microsoft".into()),
                        asset_class: Some("STK".into()),
                    },
                    Instrument {
                        conid: 3,
                        ticker: None,
                        name: Some("No Ticker Corp".into()),
                        asset_class: None,
                    },
                ]),
                _ => anyhow::bail!("gateway hiccup"),
            }
        }

        async fn market_snapshot(&self, _conids: &[i64]) -> Result<HashMap<i64, MarketSnapshot>> {
            let mut out = HashMap::new();
            out.insert(
                1,
                MarketSnapshot {
                    conid: 1,
                    last_price: Some(190.0),
                    change: Some(-12.0),
                    change_percent: Some(-5.7),
                },
            );
            out.insert(
                2,
                MarketSnapshot {
                    conid: 2,
                    last_price: Some(410.0),
                    change: Some(2.0),
                    change_percent: Some(0.5),
                },
            );
            Ok(out)
        }
    }

    #[tokio::test]
    async fn threshold_and_missing_data_filtering() {
        let groups = select_movers(&StubProvider, 3.0).await.expect("select");
        // Broken watchlist skipped, small mover filtered, ticker-less skipped.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].watchlist, "Tech");
        assert_eq!(
            groups[0].movers,
            vec![Mover {
                ticker: "AAPL".into(),
                company_name: Some("Apple Inc.".into()),
                change_percent: -5.7,
            }]
        );
    }

    #[test]
    fn snapshot_rows_accept_string_and_number_encodings() {
        let rows: Vec<SnapshotRow> = serde_json::from_str(
            r#"[
                {"conid": 1, "31": "190.5", "82": -2.0, "83": "-5.7"},
                {"conid": "2", "83": 301.0},
                {"conid": 0, "83": 1.0},
                {"83": 1.0}
            ]"#,
        )
        .expect("rows");
        let snaps: Vec<MarketSnapshot> = rows
            .into_iter()
            .filter_map(MarketSnapshot::from_row)
            .collect();

        assert_eq!(snaps.len(), 2);
        assert_eq!(snaps[0].last_price, Some(190.5));
        assert_eq!(snaps[0].change_percent, Some(-5.7));
        // |change| > 100 is kept, only flagged.
        assert_eq!(snaps[1].change_percent, Some(301.0));
    }

    #[test]
    fn duplicate_tickers_keep_first_occurrence() {
        let groups = vec![
            WatchlistMovers {
                watchlist: "A".into(),
                movers: vec![
                    Mover {
                        ticker: "AAPL".into(),
                        company_name: None,
                        change_percent: 4.0,
                    },
                    Mover {
                        ticker: "TSLA".into(),
                        company_name: None,
                        change_percent: -6.0,
                    },
                ],
            },
            WatchlistMovers {
                watchlist: "B".into(),
                movers: vec![Mover {
                    ticker: "AAPL".into(),
                    company_name: None,
                    change_percent: 4.0,
                }],
            },
        ];
        let filtered = filter_duplicate_tickers(groups);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].watchlist, "A");
        assert_eq!(filtered[0].movers.len(), 2);
    }
}
