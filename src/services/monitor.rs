//! Stuck-job monitor: the liveness backstop for the queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::models::{CompletionKind, ExtractionStatus};
use crate::queue::SequentialQueue;
use crate::repository::AuditRepository;

use super::ProcessError;

/// Error recorded on monitor-forced failures. Distinguishes reaped jobs
/// from organic extraction failures on the audit surface.
pub const STUCK_REASON: &str = "timed out, no status update received";

/// Periodic sweep that force-fails pending records older than the stuck
/// timeout and releases the slot they were holding.
///
/// If webhooks are lost and polling cannot reach the provider, this is the
/// only thing standing between the queue and a permanent stall.
pub struct StuckJobMonitor {
    audit: Arc<AuditRepository>,
    queue: Arc<SequentialQueue>,
    stuck_timeout: Duration,
    period: Duration,
}

impl StuckJobMonitor {
    pub fn new(audit: Arc<AuditRepository>, queue: Arc<SequentialQueue>, settings: &Settings) -> Self {
        Self {
            audit,
            queue,
            stuck_timeout: settings.stuck_timeout,
            period: settings.monitor_period,
        }
    }

    /// One sweep. Returns how many jobs were reaped.
    pub async fn sweep(&self) -> Result<usize, ProcessError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.stuck_timeout.as_secs() as i64);
        let stale = self.audit.find_stale_pending(cutoff)?;
        if stale.is_empty() {
            return Ok(0);
        }

        let mut reaped = 0;
        for record in stale {
            let patch = json!({
                "monitor_timeout": true,
                "timeout_at": Utc::now().to_rfc3339(),
            });
            let won = self.audit.complete(
                &record.id,
                ExtractionStatus::Failed,
                Some(STUCK_REASON),
                &patch,
            )?;
            if !won {
                // A terminal signal landed between the scan and our write.
                debug!("Record {} closed organically before the reap", record.id);
                continue;
            }

            warn!(
                "Reaped stuck job for {} (pending {}s, container {})",
                record.target_id,
                record.age_secs(),
                record.container_id().unwrap_or("unknown")
            );
            self.queue
                .job_completed(Some(&record.target_id), CompletionKind::TimedOut)
                .await?;
            reaped += 1;
        }
        Ok(reaped)
    }

    /// Sweep forever on the configured period.
    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            "Stuck-job monitor running (timeout {}s, period {}s)",
            self.stuck_timeout.as_secs(),
            self.period.as_secs()
        );
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(0) => {}
                Ok(reaped) => info!("Monitor reaped {} stuck job(s)", reaped),
                Err(err) => error!("Monitor sweep failed: {}", err),
            }
        }
    }
}
