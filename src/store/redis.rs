//! Redis-backed queue store for cross-process admission control.
//!
//! Every mutation is a Lua script so "check lock, touch list, set lock"
//! happens server-side as one unit. The lock key holds the holder descriptor
//! as JSON and carries a TTL as the last-resort recovery path if a holder
//! process dies and the monitor is down.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::Script;

use super::{EnqueueOutcome, QueueStore, StoreError, StoreResult};
use crate::models::{JobDescriptor, QueueSnapshot, WaitingJob};

/// Waiting-list key (FIFO list of job JSON).
const QUEUE_KEY: &str = "phantomq:sequential_queue";
/// Lock key (holder descriptor JSON, TTL-bounded).
const LOCK_KEY: &str = "phantomq:processing_lock";

/// Redis-backed queue store.
/// Uses atomic Lua scripts for concurrent access across processes.
pub struct RedisQueueStore {
    conn: ConnectionManager,
    lock_ttl_secs: i64,
}

impl RedisQueueStore {
    /// Create a new Redis queue store.
    ///
    /// # Arguments
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `lock_ttl` - Expiry on the lock key itself
    pub async fn new(redis_url: &str, lock_ttl: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StoreError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            StoreError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self {
            conn,
            lock_ttl_secs: lock_ttl.as_secs() as i64,
        })
    }

    fn parse_entry(json: &str) -> StoreResult<WaitingJob> {
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn hostname_arg() -> String {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    async fn enqueue_or_promote(&self, job: &WaitingJob) -> StoreResult<EnqueueOutcome> {
        let mut conn = self.conn.clone();

        // Append, then promote the head only if no job holds the lock.
        // Promotion builds the holder descriptor server-side from the popped
        // entry; corrupt entries are dropped rather than wedging the queue.
        let script = Script::new(
            r#"
            redis.call('RPUSH', KEYS[2], ARGV[1])
            if redis.call('EXISTS', KEYS[1]) == 1 then
                return {false, redis.call('LLEN', KEYS[2])}
            end
            while true do
                local entry = redis.call('LPOP', KEYS[2])
                if not entry then
                    return {false, 0}
                end
                local ok, job = pcall(cjson.decode, entry)
                if ok and type(job) == 'table' and job.job_id then
                    local descriptor = {
                        job_id = job.job_id,
                        target_id = job.target_id,
                        job_kind = job.job_kind,
                        acquired_at = ARGV[3],
                    }
                    if ARGV[2] ~= '' then
                        descriptor.host = ARGV[2]
                    end
                    redis.call('SET', KEYS[1], cjson.encode(descriptor), 'EX', tonumber(ARGV[4]))
                    return {entry, redis.call('LLEN', KEYS[2])}
                end
            end
        "#,
        );

        let entry_json =
            serde_json::to_string(job).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let (promoted_json, queue_length): (Option<String>, i64) = script
            .key(LOCK_KEY)
            .key(QUEUE_KEY)
            .arg(&entry_json)
            .arg(Self::hostname_arg())
            .arg(Utc::now().to_rfc3339())
            .arg(self.lock_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let promoted = match promoted_json {
            Some(json) => Some(Self::parse_entry(&json)?),
            None => None,
        };

        Ok(EnqueueOutcome {
            promoted,
            queue_length: queue_length.max(0) as usize,
        })
    }

    async fn release_and_promote(&self) -> StoreResult<Option<WaitingJob>> {
        let mut conn = self.conn.clone();

        // Release and head-promotion are one unit: a request_slot arriving
        // concurrently either sees the old holder or the promoted one, never
        // a free lock with entries still waiting.
        let script = Script::new(
            r#"
            redis.call('DEL', KEYS[1])
            while true do
                local entry = redis.call('LPOP', KEYS[2])
                if not entry then
                    return false
                end
                local ok, job = pcall(cjson.decode, entry)
                if ok and type(job) == 'table' and job.job_id then
                    local descriptor = {
                        job_id = job.job_id,
                        target_id = job.target_id,
                        job_kind = job.job_kind,
                        acquired_at = ARGV[2],
                    }
                    if ARGV[1] ~= '' then
                        descriptor.host = ARGV[1]
                    end
                    redis.call('SET', KEYS[1], cjson.encode(descriptor), 'EX', tonumber(ARGV[3]))
                    return entry
                end
            end
        "#,
        );

        let promoted_json: Option<String> = script
            .key(LOCK_KEY)
            .key(QUEUE_KEY)
            .arg(Self::hostname_arg())
            .arg(Utc::now().to_rfc3339())
            .arg(self.lock_ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        match promoted_json {
            Some(json) => Ok(Some(Self::parse_entry(&json)?)),
            None => Ok(None),
        }
    }

    async fn snapshot(&self) -> StoreResult<QueueSnapshot> {
        let mut conn = self.conn.clone();

        let (lock_json, queue_length): (Option<String>, i64) = redis::pipe()
            .get(LOCK_KEY)
            .llen(QUEUE_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let is_processing = lock_json.is_some();
        let current_job = lock_json.and_then(|json| {
            serde_json::from_str::<JobDescriptor>(&json)
                .map_err(|e| {
                    tracing::warn!("Unreadable lock descriptor: {}", e);
                    e
                })
                .ok()
        });
        let lock_age_secs = current_job.as_ref().map(|d| d.age_secs());

        Ok(QueueSnapshot {
            queue_length: queue_length.max(0) as usize,
            is_processing,
            current_job,
            lock_age_secs,
        })
    }

    async fn queue_contents(&self) -> StoreResult<Vec<WaitingJob>> {
        let mut conn = self.conn.clone();

        let entries: Vec<String> = redis::cmd("LRANGE")
            .arg(QUEUE_KEY)
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let mut jobs = Vec::with_capacity(entries.len());
        for entry in entries {
            match Self::parse_entry(&entry) {
                Ok(job) => jobs.push(job),
                Err(e) => tracing::warn!("Skipping unreadable queue entry: {}", e),
            }
        }
        Ok(jobs)
    }

    async fn remove_entry(&self, job_id: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        let script = Script::new(
            r#"
            local entries = redis.call('LRANGE', KEYS[1], 0, -1)
            for _, entry in ipairs(entries) do
                local ok, job = pcall(cjson.decode, entry)
                if ok and type(job) == 'table' and job.job_id == ARGV[1] then
                    redis.call('LREM', KEYS[1], 1, entry)
                    return 1
                end
            end
            return 0
        "#,
        );

        let removed: i64 = script
            .key(QUEUE_KEY)
            .arg(job_id)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(removed == 1)
    }

    async fn clear_queue(&self) -> StoreResult<usize> {
        let mut conn = self.conn.clone();

        let script = Script::new(
            r#"
            local count = redis.call('LLEN', KEYS[1])
            redis.call('DEL', KEYS[1])
            return count
        "#,
        );

        let count: i64 = script
            .key(QUEUE_KEY)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(count.max(0) as usize)
    }

    async fn force_release(&self) -> StoreResult<bool> {
        let mut conn = self.conn.clone();

        let deleted: i64 = redis::cmd("DEL")
            .arg(LOCK_KEY)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(deleted == 1)
    }
}

impl Clone for RedisQueueStore {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            lock_ttl_secs: self.lock_ttl_secs,
        }
    }
}
