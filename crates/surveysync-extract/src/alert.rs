//! Failure alerts
//!
//! A run that ends with failed surveys, or that aborts outright, produces one
//! [`Alert`]. Where it goes is up to the [`Notifier`].

use crate::error::{ExtractError, Result};
use crate::pipeline::RunReport;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt::Write;
use std::time::Duration;
use tracing::{error, info};

pub const SUBJECT_FAILED: &str = "Survey extract error";
pub const SUBJECT_PARTIAL: &str = "Survey extract finished with failures";

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

impl Alert {
    /// Summary of the failed surveys, or `None` for a clean run
    pub fn from_report(report: &RunReport) -> Option<Self> {
        if report.is_clean() {
            return None;
        }

        let mut body = format!("{}\n\n", report);
        for failure in &report.failures {
            let _ = writeln!(body, "- {}", failure);
        }
        body.push_str("\nBookmarks of the failed surveys were not advanced; they will be retried on the next run.\n");

        Some(Self {
            subject: SUBJECT_PARTIAL.to_string(),
            body,
        })
    }

    /// The run aborted; `error` is whatever stopped it
    pub fn from_fatal(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut body = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            let _ = write!(body, "\n  caused by: {}", cause);
            source = cause.source();
        }
        Self {
            subject: SUBJECT_FAILED.to_string(),
            body,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        error!(subject = %alert.subject, "{}", alert.body);
        Ok(())
    }
}

/// POSTs alerts as JSON to an HTTP endpoint
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<()> {
        let response = self.client.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ExtractError::api(
                status.as_u16(),
                format!("alert webhook rejected the alert: {}", status),
            ));
        }
        info!(url = %self.url, "Alert delivered");
        Ok(())
    }
}

/// The webhook when configured, otherwise the log
pub fn notifier(webhook_url: Option<&str>) -> Result<Box<dyn Notifier>> {
    match webhook_url {
        Some(url) => Ok(Box::new(WebhookNotifier::new(url)?)),
        None => Ok(Box::new(LogNotifier)),
    }
}
