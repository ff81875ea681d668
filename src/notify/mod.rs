// src/notify/mod.rs
//! Report delivery: console always, email when SMTP is configured.

pub mod email;

use crate::models::NewsReport;

/// Print every report to stdout in the banner format the run log uses.
pub fn print_reports(reports: &[NewsReport]) {
    for report in reports {
        let change = report
            .price_change_percent
            .map(|cp| format!("{cp:.2}%"))
            .unwrap_or_else(|| "n/a".to_string());
        println!("\n{}", "=".repeat(80));
        println!("NEWS FOR {} ({})", report.ticker, change);
        println!("{}", "=".repeat(80));
        println!("{}", report.news_summary);
    }
}
