//! The sequential queue itself.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::models::{CompletionKind, JobRequest, QueueSnapshot, SlotDecision, WaitingJob};
use crate::store::{QueueStore, StoreResult};

/// A job launch that failed synchronously. The launcher has already recorded
/// the failure on the audit log; the queue only needs to move on.
#[derive(Debug, thiserror::Error)]
#[error("launch failure: {0}")]
pub struct LaunchFailure(pub String);

/// Starts the external work for a promoted queue entry.
///
/// Implementations own the full launch side effect: audit record creation,
/// provider calls, metadata. Returning `Err` means the job never started and
/// its audit record is already terminal.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    async fn launch(&self, job: &WaitingJob) -> Result<(), LaunchFailure>;
}

/// Cross-process admission controller for the phantom slot.
///
/// Every mutation goes through the store's atomic primitives; this type
/// holds no queue state of its own and any number of instances may exist
/// across processes.
pub struct SequentialQueue {
    store: Arc<dyn QueueStore>,
    launcher: Arc<dyn JobLauncher>,
}

impl SequentialQueue {
    pub fn new(store: Arc<dyn QueueStore>, launcher: Arc<dyn JobLauncher>) -> Self {
        Self { store, launcher }
    }

    /// Ask for the slot. Returns `started: true` when the caller's job was
    /// admitted and launched; otherwise the job waits in line at the
    /// returned 1-based position.
    ///
    /// A `started: false` with no position means the job was admitted but
    /// its launch failed; the failure is on the audit log and the queue has
    /// already moved on.
    pub async fn request_slot(&self, request: JobRequest) -> StoreResult<SlotDecision> {
        let job = WaitingJob::from_request(request);
        let job_id = job.job_id.clone();
        let outcome = self.store.enqueue_or_promote(&job).await?;

        let Some(promoted) = outcome.promoted else {
            debug!(
                "Slot busy, queued {} at position {}",
                job.target_id, outcome.queue_length
            );
            return Ok(SlotDecision::queued(outcome.queue_length));
        };

        match self.drive_launches(promoted).await? {
            Some(started) if started.job_id == job_id => Ok(SlotDecision::started()),
            Some(_) => Ok(SlotDecision::queued(outcome.queue_length)),
            // The queue drained without a successful launch, so this entry
            // was promoted at some point and failed.
            None => Ok(SlotDecision {
                started: false,
                position: None,
            }),
        }
    }

    /// Signal that the currently running job reached a terminal state.
    /// Releases the slot and starts the next waiting entry, if any. Safe to
    /// call when the slot is already free; racing completion signals make
    /// that a normal occurrence, not an error.
    ///
    /// Returns whether a next job was started.
    pub async fn job_completed(
        &self,
        target_id: Option<&str>,
        kind: CompletionKind,
    ) -> StoreResult<bool> {
        info!(
            "Releasing slot ({}) for {}",
            kind.as_str(),
            target_id.unwrap_or("current holder")
        );
        match self.store.release_and_promote().await? {
            Some(next) => Ok(self.drive_launches(next).await?.is_some()),
            None => Ok(false),
        }
    }

    /// Launch `next`; on synchronous launch failure, release the slot and
    /// promote again until a launch sticks or the queue drains. Returns the
    /// job that ended up running.
    async fn drive_launches(&self, mut next: WaitingJob) -> StoreResult<Option<WaitingJob>> {
        loop {
            match self.launcher.launch(&next).await {
                Ok(()) => {
                    info!(
                        "Started {} job for {} (queue job {})",
                        next.job_kind, next.target_id, next.job_id
                    );
                    return Ok(Some(next));
                }
                Err(err) => {
                    warn!(
                        "Launch failed for {}: {}. Advancing queue",
                        next.target_id, err
                    );
                    match self.store.release_and_promote().await? {
                        Some(job) => next = job,
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Read-only snapshot for the status surfaces.
    pub async fn queue_status(&self) -> StoreResult<QueueSnapshot> {
        self.store.snapshot().await
    }

    /// Waiting entries, head first.
    pub async fn queue_contents(&self) -> StoreResult<Vec<WaitingJob>> {
        self.store.queue_contents().await
    }

    /// 1-based position of the first waiting entry for `target_id`.
    pub async fn position_for(&self, target_id: &str) -> StoreResult<Option<usize>> {
        let contents = self.store.queue_contents().await?;
        Ok(contents
            .iter()
            .position(|job| job.target_id == target_id)
            .map(|idx| idx + 1))
    }

    /// Remove one waiting entry. Does not touch the running job.
    pub async fn remove_job(&self, job_id: &str) -> StoreResult<bool> {
        let removed = self.store.remove_entry(job_id).await?;
        if removed {
            info!("Removed queue entry {}", job_id);
        }
        Ok(removed)
    }

    /// Drop every waiting entry. The running job, if any, keeps its slot.
    pub async fn clear_queue(&self) -> StoreResult<usize> {
        let cleared = self.store.clear_queue().await?;
        if cleared > 0 {
            info!("Cleared {} waiting entries", cleared);
        }
        Ok(cleared)
    }

    /// Drop the lock without promoting anyone. Operator recovery for a
    /// wedged slot; pair with a manual advance to restart the queue.
    pub async fn force_release_lock(&self) -> StoreResult<bool> {
        let released = self.store.force_release().await?;
        if released {
            warn!("Lock force-released by operator");
        }
        Ok(released)
    }
}
