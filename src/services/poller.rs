//! Outbound status polling, the second completion path.
//!
//! Webhooks are the fast path but depend on the provider reaching us. The
//! poller asks the provider about the running container instead, decodes the
//! answer with the same classifier the webhook uses, and feeds the result
//! into the same completion channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{PhantomEvent, PhantomWebhookPayload, ResultSource};
use crate::phantom::{extract_result_url, PhantomClient, PhantomError};
use crate::repository::AuditRepository;
use crate::services::{CompletionSignal, ProcessError};

pub struct StatusPoller {
    audit: Arc<AuditRepository>,
    client: Option<PhantomClient>,
    signals: mpsc::Sender<CompletionSignal>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        audit: Arc<AuditRepository>,
        client: Option<PhantomClient>,
        signals: mpsc::Sender<CompletionSignal>,
        interval: Duration,
    ) -> Self {
        Self {
            audit,
            client,
            signals,
            interval,
        }
    }

    /// One poll pass. Returns whether a signal was emitted.
    pub async fn tick(&self) -> Result<bool, ProcessError> {
        let Some(client) = &self.client else {
            return Ok(false);
        };
        let Some(record) = self.audit.latest_pending_with_container()? else {
            return Ok(false);
        };
        let Some(container_id) = record.container_id().map(str::to_string) else {
            return Ok(false);
        };

        let status = client.fetch_container(&container_id).await?;
        let payload: PhantomWebhookPayload = serde_json::from_value(status)
            .map_err(|e| PhantomError::Parse(e.to_string()))?;
        let Some(mut event) = payload.decode() else {
            debug!("Container {} status not classifiable yet", container_id);
            return Ok(false);
        };

        // Polled completions usually omit the result reference; the agent
        // prints the result file URL to its console output instead.
        if let PhantomEvent::Completed { result } = &mut event {
            if result.is_none() {
                match client.fetch_output(&container_id).await {
                    Ok(output) => {
                        if let Some(url) = extract_result_url(&output) {
                            *result = Some(ResultSource::Url(url));
                        }
                    }
                    Err(err) => {
                        debug!("Could not fetch output for {}: {}", container_id, err)
                    }
                }
            }
        }

        debug!(
            "Poll observed {} for container {}",
            event.kind(),
            container_id
        );
        self.signals
            .send(CompletionSignal {
                container_id,
                event,
                source: "poll",
            })
            .await
            .map_err(|_| ProcessError::WorkerStopped)?;
        Ok(true)
    }

    /// Poll forever on the configured interval. Provider hiccups are logged
    /// and retried next tick.
    pub async fn run(&self) {
        if self.client.is_none() {
            info!("No provider credentials; status poller idle");
            return;
        }
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!("Status poller running every {}s", self.interval.as_secs());
        loop {
            ticker.tick().await;
            if let Err(err) = self.tick().await {
                warn!("Status poll failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tick_idle_without_credentials() {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditRepository::new(&dir.path().join("test.db")).unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        let poller = StatusPoller::new(audit, None, tx, Duration::from_secs(30));

        assert!(!poller.tick().await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tick_idle_without_watched_record() {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditRepository::new(&dir.path().join("test.db")).unwrap());
        let (tx, mut rx) = mpsc::channel(4);
        // A client is configured but nothing is pending with a container, so
        // no provider call is ever attempted.
        let client = PhantomClient::new(
            "https://api.invalid.example",
            "test-key",
            Duration::from_secs(1),
        );
        let poller = StatusPoller::new(audit, Some(client), tx, Duration::from_secs(30));

        assert!(!poller.tick().await.unwrap());
        assert!(rx.try_recv().is_err());
    }
}
