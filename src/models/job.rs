//! Queue-side models: requests, waiting entries, the lock holder descriptor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Job kind recorded when a caller does not specify one.
///
/// Kinds are opaque to the queue; they only distinguish units of work in the
/// audit trail and the holder descriptor.
pub const DEFAULT_JOB_KIND: &str = "profile_extraction";

/// What a caller submits to `request_slot`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    /// Target entity (company/person) the extraction is for.
    pub target_id: String,
    /// Unit-of-work kind, defaults to profile extraction.
    pub job_kind: String,
    /// Search URL handed to the phantom (e.g. a Sales Navigator search).
    pub search_url: Option<String>,
    /// Opaque job-specific payload carried through to launch.
    #[serde(default)]
    pub extra_params: serde_json::Value,
}

impl JobRequest {
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            job_kind: DEFAULT_JOB_KIND.to_string(),
            search_url: None,
            extra_params: serde_json::json!({}),
        }
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.job_kind = kind.into();
        self
    }

    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = Some(url.into());
        self
    }
}

/// A queued extraction request waiting for the lock.
///
/// Serialized as JSON into the shared store's waiting list, so field names
/// are part of the persisted format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaitingJob {
    /// Queue-assigned id, used for targeted removal.
    pub job_id: String,
    pub target_id: String,
    pub job_kind: String,
    pub search_url: Option<String>,
    #[serde(default)]
    pub extra_params: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
}

impl WaitingJob {
    pub fn from_request(request: JobRequest) -> Self {
        Self {
            job_id: Uuid::new_v4().to_string(),
            target_id: request.target_id,
            job_kind: request.job_kind,
            search_url: request.search_url,
            extra_params: request.extra_params,
            enqueued_at: Utc::now(),
        }
    }

    /// Descriptor stored in the lock when this entry becomes the holder.
    pub fn descriptor(&self) -> JobDescriptor {
        JobDescriptor {
            job_id: self.job_id.clone(),
            target_id: self.target_id.clone(),
            job_kind: self.job_kind.clone(),
            host: get_hostname(),
            acquired_at: Utc::now(),
        }
    }
}

/// Identity of the job currently holding the lock.
///
/// Stored as the lock key's value so any process (and the ops surface) can
/// see who is running and since when.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub target_id: String,
    pub job_kind: String,
    /// Hostname of the process that performed the acquire.
    pub host: Option<String>,
    pub acquired_at: DateTime<Utc>,
}

impl JobDescriptor {
    /// Seconds the lock has been held.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.acquired_at).num_seconds().max(0)
    }
}

/// Result of a `request_slot` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDecision {
    /// Whether the job started immediately.
    pub started: bool,
    /// 1-based waiting-list position when not started.
    pub position: Option<usize>,
}

impl SlotDecision {
    pub fn started() -> Self {
        Self {
            started: true,
            position: None,
        }
    }

    pub fn queued(position: usize) -> Self {
        Self {
            started: false,
            position: Some(position),
        }
    }
}

/// Why `job_completed` is being signaled. Logging/audit only; every kind
/// releases the lock the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    Succeeded,
    Failed,
    TimedOut,
    /// Operator-initiated advance from the ops surface.
    Manual,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
            Self::Manual => "manual",
        }
    }
}

/// Read-only queue snapshot for the status surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue_length: usize,
    pub is_processing: bool,
    pub current_job: Option<JobDescriptor>,
    /// Seconds since the current holder acquired the lock.
    pub lock_age_secs: Option<i64>,
}

fn get_hostname() -> Option<String> {
    hostname::get().ok().and_then(|h| h.into_string().ok())
}
