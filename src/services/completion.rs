//! Digesting completion signals from webhooks and status polls.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::models::{
    CompletionKind, ExtractionRecord, ExtractionStatus, PhantomEvent, ResultSource,
};
use crate::phantom::{parse_profiles, PhantomClient};
use crate::queue::SequentialQueue;
use crate::repository::{AuditRepository, PersonRepository};

use super::ProcessError;

/// One decoded lifecycle signal routed by container id.
#[derive(Debug)]
pub struct CompletionSignal {
    pub container_id: String,
    pub event: PhantomEvent,
    /// Which path delivered it: "webhook" or "poll".
    pub source: &'static str,
}

/// Turns decoded events into audit/person writes and queue advancement.
///
/// Both delivery paths funnel through [`handle_signal`](Self::handle_signal),
/// so the idempotency rules (terminal records ignore further events, first
/// terminal write wins) hold no matter which path fires first or twice.
pub struct CompletionService {
    audit: Arc<AuditRepository>,
    people: Arc<PersonRepository>,
    queue: Arc<SequentialQueue>,
    client: Option<PhantomClient>,
}

impl CompletionService {
    pub fn new(
        audit: Arc<AuditRepository>,
        people: Arc<PersonRepository>,
        queue: Arc<SequentialQueue>,
        client: Option<PhantomClient>,
    ) -> Self {
        Self {
            audit,
            people,
            queue,
            client,
        }
    }

    pub async fn handle_signal(&self, signal: CompletionSignal) -> Result<(), ProcessError> {
        let record = match self.audit.find_by_container(&signal.container_id)? {
            Some(record) => record,
            None => {
                warn!(
                    "No extraction job for container {}; dropping {} {} event",
                    signal.container_id,
                    signal.source,
                    signal.event.kind()
                );
                return Ok(());
            }
        };

        if record.status.is_terminal() {
            info!(
                "Container {} already closed as {}; ignoring {} {} event",
                signal.container_id,
                record.status.as_str(),
                signal.source,
                signal.event.kind()
            );
            return Ok(());
        }

        match signal.event {
            PhantomEvent::Progress { percent, message } => {
                self.record_progress(&record, percent, message)
            }
            PhantomEvent::Completed { result } => {
                self.finish_success(&record, result, signal.source).await
            }
            PhantomEvent::Failed { reason } | PhantomEvent::LaunchFailed { reason } => {
                self.finish_failure(&record, &reason, signal.source).await
            }
        }
    }

    fn record_progress(
        &self,
        record: &ExtractionRecord,
        percent: Option<f64>,
        message: Option<String>,
    ) -> Result<(), ProcessError> {
        let mut patch = json!({ "last_progress_at": Utc::now().to_rfc3339() });
        if let Some(percent) = percent {
            patch["progress_percent"] = json!(percent);
        }
        if let Some(message) = message {
            patch["progress_message"] = json!(message);
        }
        self.audit.merge_metadata_if_pending(&record.id, &patch)?;
        Ok(())
    }

    async fn finish_success(
        &self,
        record: &ExtractionRecord,
        result: Option<ResultSource>,
        source: &'static str,
    ) -> Result<(), ProcessError> {
        // Downstream data problems never block the queue: the run itself
        // succeeded, so the record closes as success either way and the
        // processing error is kept alongside it.
        let mut patch = match self.persist_results(record, result).await {
            Ok(patch) => patch,
            Err(err) => {
                warn!(
                    "Result processing failed for {}: {}",
                    record.target_id, err
                );
                json!({ "result_error": err.to_string() })
            }
        };
        patch["finished_via"] = json!(source);

        let won = self
            .audit
            .complete(&record.id, ExtractionStatus::Success, None, &patch)?;
        if !won {
            info!(
                "Record {} closed by another signal before this {} completion",
                record.id, source
            );
            return Ok(());
        }

        info!("Extraction succeeded for {}", record.target_id);
        self.queue
            .job_completed(Some(&record.target_id), CompletionKind::Succeeded)
            .await?;
        Ok(())
    }

    async fn finish_failure(
        &self,
        record: &ExtractionRecord,
        reason: &str,
        source: &'static str,
    ) -> Result<(), ProcessError> {
        let patch = json!({ "finished_via": source });
        let won =
            self.audit
                .complete(&record.id, ExtractionStatus::Failed, Some(reason), &patch)?;
        if !won {
            info!(
                "Record {} closed by another signal before this {} failure",
                record.id, source
            );
            return Ok(());
        }

        warn!("Extraction failed for {}: {}", record.target_id, reason);
        self.queue
            .job_completed(Some(&record.target_id), CompletionKind::Failed)
            .await?;
        Ok(())
    }

    /// Resolve the result payload and upsert its profiles. Returns the
    /// metadata patch describing what was stored.
    async fn persist_results(
        &self,
        record: &ExtractionRecord,
        result: Option<ResultSource>,
    ) -> Result<serde_json::Value, ProcessError> {
        let resolved = match result {
            Some(ResultSource::Url(url)) => {
                let client = self.client.as_ref().ok_or(ProcessError::NoClient)?;
                let payload = client.download_result(&url).await?;
                Some((Some(url), payload))
            }
            Some(ResultSource::Inline(value)) => Some((None, value)),
            None => self.locate_result(record).await?,
        };

        let Some((result_url, payload)) = resolved else {
            info!("Run for {} completed without a result payload", record.target_id);
            return Ok(json!({ "profiles_inserted": 0, "profiles_updated": 0, "profiles_skipped": 0 }));
        };

        let profiles = parse_profiles(&payload)?;
        let counts = self.people.upsert_batch(&profiles)?;
        info!(
            "Stored batch for {}: {} inserted, {} updated, {} skipped",
            record.target_id, counts.inserted, counts.updated, counts.skipped
        );

        Ok(json!({
            "result_url": result_url,
            "profiles_inserted": counts.inserted,
            "profiles_updated": counts.updated,
            "profiles_skipped": counts.skipped,
        }))
    }

    /// Completion arrived without a result reference. Finished agents print
    /// the result file URL in their console output; go look for it there.
    async fn locate_result(
        &self,
        record: &ExtractionRecord,
    ) -> Result<Option<(Option<String>, serde_json::Value)>, ProcessError> {
        let (Some(client), Some(container_id)) = (&self.client, record.container_id()) else {
            return Ok(None);
        };
        let output = client.fetch_output(container_id).await?;
        let Some(url) = crate::phantom::extract_result_url(&output) else {
            return Ok(None);
        };
        let payload = client.download_result(&url).await?;
        Ok(Some((Some(url), payload)))
    }
}

/// Drain completion signals on a background task. Handler errors are logged
/// and the worker keeps going; the monitor backstops anything dropped.
pub fn spawn_completion_worker(
    service: Arc<CompletionService>,
    mut signals: mpsc::Receiver<CompletionSignal>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            let container_id = signal.container_id.clone();
            if let Err(err) = service.handle_signal(signal).await {
                error!(
                    "Completion handling failed for container {}: {}",
                    container_id, err
                );
            }
        }
    })
}
