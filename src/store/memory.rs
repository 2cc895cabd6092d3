//! In-memory queue store for tests and single-process development.
//!
//! Holds the same semantics as the Redis store with one mutex guard per
//! operation standing in for the Lua scripts. No TTL handling: the lock TTL
//! exists to survive a crashed process, and in-process state does not.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{EnqueueOutcome, QueueStore, StoreResult};
use crate::models::{QueueSnapshot, WaitingJob};

#[derive(Default)]
struct MemoryState {
    lock: Option<crate::models::JobDescriptor>,
    queue: VecDeque<WaitingJob>,
}

/// Single-process queue store.
#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn enqueue_or_promote(&self, job: &WaitingJob) -> StoreResult<EnqueueOutcome> {
        let mut state = self.state.lock().await;
        state.queue.push_back(job.clone());

        if state.lock.is_some() {
            return Ok(EnqueueOutcome {
                promoted: None,
                queue_length: state.queue.len(),
            });
        }

        let head = state.queue.pop_front();
        if let Some(ref promoted) = head {
            state.lock = Some(promoted.descriptor());
        }
        Ok(EnqueueOutcome {
            promoted: head,
            queue_length: state.queue.len(),
        })
    }

    async fn release_and_promote(&self) -> StoreResult<Option<WaitingJob>> {
        let mut state = self.state.lock().await;
        state.lock = None;

        let head = state.queue.pop_front();
        if let Some(ref promoted) = head {
            state.lock = Some(promoted.descriptor());
        }
        Ok(head)
    }

    async fn snapshot(&self) -> StoreResult<QueueSnapshot> {
        let state = self.state.lock().await;
        Ok(QueueSnapshot {
            queue_length: state.queue.len(),
            is_processing: state.lock.is_some(),
            current_job: state.lock.clone(),
            lock_age_secs: state.lock.as_ref().map(|d| d.age_secs()),
        })
    }

    async fn queue_contents(&self) -> StoreResult<Vec<WaitingJob>> {
        let state = self.state.lock().await;
        Ok(state.queue.iter().cloned().collect())
    }

    async fn remove_entry(&self, job_id: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.queue.len();
        state.queue.retain(|job| job.job_id != job_id);
        Ok(state.queue.len() < before)
    }

    async fn clear_queue(&self) -> StoreResult<usize> {
        let mut state = self.state.lock().await;
        let count = state.queue.len();
        state.queue.clear();
        Ok(count)
    }

    async fn force_release(&self) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.lock.take().is_some())
    }
}
