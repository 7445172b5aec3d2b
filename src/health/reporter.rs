//! Tripped-endpoint status reporting.
//!
//! # Data Flow
//! ```text
//! circuit trips
//!     → ReportQueue::submit (never blocks, never fails)
//!     → worker task
//!     → StatusReporter::report_tripped
//!     → failure logged, never retried
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("status report request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("status report rejected with HTTP {0}")]
    Rejected(u16),
    #[error("status report failed: {0}")]
    Other(String),
}

/// External collaborator told about endpoints judged unrecoverable.
pub trait StatusReporter: Send + Sync + 'static {
    fn report_tripped(&self, endpoint: &str, message: &str) -> BoxFuture<'static, Result<(), ReportError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripNotice {
    pub endpoint: String,
    pub message: String,
}

/// Sender side of the background report worker.
#[derive(Clone)]
pub struct ReportQueue {
    tx: mpsc::UnboundedSender<TripNotice>,
}

impl ReportQueue {
    /// Start the worker. It exits once every queue handle is dropped.
    pub fn spawn(reporter: Arc<dyn StatusReporter>, handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<TripNotice>();

        handle.spawn(async move {
            while let Some(notice) = rx.recv().await {
                match reporter.report_tripped(&notice.endpoint, &notice.message).await {
                    Ok(()) => {
                        tracing::debug!(endpoint = %notice.endpoint, "Tripped endpoint reported");
                    }
                    Err(e) => {
                        tracing::error!(
                            endpoint = %notice.endpoint,
                            error = %e,
                            "Failed to report tripped endpoint"
                        );
                    }
                }
            }
            tracing::debug!("Status report worker stopped");
        });

        Self { tx }
    }

    pub fn submit(&self, notice: TripNotice) {
        if let Err(e) = self.tx.send(notice) {
            tracing::warn!(endpoint = %e.0.endpoint, "Status report worker is gone; report dropped");
        }
    }
}

/// Reports trips as a JSON `POST` to a webhook.
pub struct WebhookReporter {
    client: reqwest::Client,
    url: String,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl StatusReporter for WebhookReporter {
    fn report_tripped(&self, endpoint: &str, message: &str) -> BoxFuture<'static, Result<(), ReportError>> {
        let request = self.client.post(&self.url).json(&serde_json::json!({
            "endpoint": endpoint,
            "status": "error",
            "message": message,
        }));

        async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(ReportError::Rejected(status.as_u16()))
            }
        }
        .boxed()
    }
}
