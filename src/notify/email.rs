// src/notify/email.rs
use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::models::NewsReport;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSender {
    pub fn from_config(cfg: &SmtpConfig) -> Result<Self> {
        let creds = Credentials::new(cfg.user.clone(), cfg.pass.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)
            .context("invalid SMTP host")?
            .credentials(creds)
            .build();

        let from = cfg.from.parse().context("invalid from address")?;
        let to = cfg.to.parse().context("invalid to address")?;
        Ok(Self { mailer, from, to })
    }

    /// One digest email carrying every report of the run.
    pub async fn send_reports(&self, reports: &[NewsReport]) -> Result<()> {
        let subject = format!("Watchlist news: {} mover(s)", reports.len());

        let mut body = String::new();
        for report in reports {
            body.push_str(&report.news_summary);
            body.push_str(&format!(
                "\n\nWatchlist: {} | Generated: {}\n\n{}\n\n",
                report.watchlist,
                report.timestamp,
                "-".repeat(60)
            ));
        }

        let msg = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
