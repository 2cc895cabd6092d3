//! Shared queue-state store.
//!
//! The lock and the waiting list are the only mutable state shared between
//! processes, so every mutation here is a single atomic unit on the backing
//! store. Callers never get a read-then-write pair; two concurrent processes
//! observing "free" and both acquiring is structurally impossible.

mod memory;
mod redis;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{QueueSnapshot, WaitingJob};

pub use memory::MemoryQueueStore;
pub use redis::RedisQueueStore;

/// Store-level errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached or a command failed. No state was left
    /// half-mutated; callers retry with backoff.
    #[error("queue store unavailable: {0}")]
    Unavailable(String),
    /// A persisted entry failed to parse.
    #[error("corrupt queue entry: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of [`QueueStore::enqueue_or_promote`].
#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    /// Entry promoted to lock holder within the same atomic unit, if the
    /// lock was free. Usually the entry just enqueued; after a lock expiry
    /// it can be an older head, which the caller must still launch.
    pub promoted: Option<WaitingJob>,
    /// Waiting-list length after the operation. When the submitted entry was
    /// not promoted this is its 1-based position in line.
    pub queue_length: usize,
}

/// Atomic admission primitives over the shared store.
///
/// Implementations must make each method a single atomic unit with respect
/// to every other method, across processes.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append `job` to the waiting list, then, if the lock is free, pop the
    /// head and acquire the lock on its behalf. The promoted entry (not
    /// necessarily `job`) is returned for the caller to launch.
    async fn enqueue_or_promote(&self, job: &WaitingJob) -> StoreResult<EnqueueOutcome>;

    /// Release the lock (idempotent) and, if the waiting list is non-empty,
    /// pop the head and acquire the lock on its behalf. No freshly arriving
    /// request can take the lock between the release and the promotion.
    async fn release_and_promote(&self) -> StoreResult<Option<WaitingJob>>;

    /// Read-only view of lock + queue length. Never mutates.
    async fn snapshot(&self) -> StoreResult<QueueSnapshot>;

    /// Ordered waiting-list contents, head first.
    async fn queue_contents(&self) -> StoreResult<Vec<WaitingJob>>;

    /// Remove one waiting entry by its queue job id.
    async fn remove_entry(&self, job_id: &str) -> StoreResult<bool>;

    /// Drop all waiting entries, returning how many were removed. Leaves the
    /// lock alone.
    async fn clear_queue(&self) -> StoreResult<usize>;

    /// Delete the lock without promoting. Emergency use only; the normal
    /// release path is [`release_and_promote`](Self::release_and_promote).
    async fn force_release(&self) -> StoreResult<bool>;
}
