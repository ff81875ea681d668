//! Watchlist News Agent — Binary Entrypoint
//!
//! Pulls movers from the brokerage watchlists, aggregates news about each one
//! from the analysis feed, the RSS news search, and the forum, and delivers
//! "why it moved" summaries to the console and (optionally) email.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use watchlist_news_agent::config::AppConfig;
use watchlist_news_agent::notify::{self, email::EmailSender};
use watchlist_news_agent::pipeline::NewsPipeline;
use watchlist_news_agent::watchlist::{
    filter_duplicate_tickers, sample_watchlist, select_movers, GatewayClient, WatchlistMovers,
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

async fn load_movers(config: &AppConfig) -> Vec<WatchlistMovers> {
    if config.use_mock_watchlist {
        info!("using sample watchlist data");
        return sample_watchlist();
    }

    let gateway = GatewayClient::from_config(config);
    match select_movers(&gateway, config.move_threshold_percent).await {
        Ok(groups) => groups,
        Err(e) => {
            error!(error = ?e, "gateway unavailable; falling back to sample data");
            sample_watchlist()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = AppConfig::from_env();
    config.log_presence();

    let movers = filter_duplicate_tickers(load_movers(&config).await);
    if movers.is_empty() {
        warn!("no movers cleared the threshold; nothing to report");
        return Ok(());
    }

    let pipeline = NewsPipeline::from_config(&config);
    let reports = pipeline.process_watchlists(&movers).await;

    notify::print_reports(&reports);

    if let Some(smtp) = &config.smtp {
        match EmailSender::from_config(smtp) {
            Ok(sender) => match sender.send_reports(&reports).await {
                Ok(()) => info!("report email sent"),
                Err(e) => error!(error = ?e, "report email failed"),
            },
            Err(e) => error!(error = ?e, "bad SMTP configuration"),
        }
    }

    Ok(())
}
