//! Audit trail models for extraction job attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::WaitingJob;
use crate::config::SERVICE_NAME;

/// Lifecycle state of one extraction attempt.
///
/// Monitor-forced timeouts are recorded as `Failed` with the
/// `monitor_timeout` metadata flag rather than a fourth state, so the audit
/// surface stays a three-way filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Pending,
    Success,
    Failed,
}

impl ExtractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One row per launch attempt. Written `pending` at launch, closed exactly
/// once by whichever terminal signal arrives first (webhook, poll, monitor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub id: String,
    /// Service name the row is filed under on the audit surface.
    pub service: String,
    /// Target entity the extraction enriches.
    pub target_id: String,
    pub job_kind: String,
    /// Queue job id this attempt belongs to.
    pub job_id: String,
    pub status: ExtractionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall time from launch to terminal signal.
    pub execution_time_ms: Option<i64>,
    pub error_message: Option<String>,
    /// Free-form map: container id, launch params, progress, result counts,
    /// timeout flags.
    pub metadata: serde_json::Value,
}

impl ExtractionRecord {
    /// Fresh pending record for a job about to be launched.
    pub fn new_pending(job: &WaitingJob) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service: SERVICE_NAME.to_string(),
            target_id: job.target_id.clone(),
            job_kind: job.job_kind.clone(),
            job_id: job.job_id.clone(),
            status: ExtractionStatus::Pending,
            started_at: Utc::now(),
            completed_at: None,
            execution_time_ms: None,
            error_message: None,
            metadata: serde_json::json!({}),
        }
    }

    /// The provider's opaque container/run id, once the launch stored it.
    pub fn container_id(&self) -> Option<&str> {
        self.metadata.get("container_id").and_then(|v| v.as_str())
    }

    /// Whether the monitor force-closed this record.
    pub fn is_monitor_timeout(&self) -> bool {
        self.metadata
            .get("monitor_timeout")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Age of the attempt in seconds.
    pub fn age_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobRequest;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            ExtractionStatus::Pending,
            ExtractionStatus::Success,
            ExtractionStatus::Failed,
        ] {
            assert_eq!(ExtractionStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(ExtractionStatus::from_str("bogus"), None);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ExtractionStatus::Pending.is_terminal());
        assert!(ExtractionStatus::Success.is_terminal());
        assert!(ExtractionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_new_pending() {
        let job = WaitingJob::from_request(JobRequest::new("company-9"));
        let record = ExtractionRecord::new_pending(&job);
        assert_eq!(record.status, ExtractionStatus::Pending);
        assert_eq!(record.target_id, "company-9");
        assert_eq!(record.job_id, job.job_id);
        assert_eq!(record.service, SERVICE_NAME);
        assert!(record.completed_at.is_none());
        assert!(record.container_id().is_none());
    }

    #[test]
    fn test_container_id_from_metadata() {
        let job = WaitingJob::from_request(JobRequest::new("c"));
        let mut record = ExtractionRecord::new_pending(&job);
        record.metadata = serde_json::json!({"container_id": "abc123"});
        assert_eq!(record.container_id(), Some("abc123"));
    }

    #[test]
    fn test_monitor_timeout_flag() {
        let job = WaitingJob::from_request(JobRequest::new("c"));
        let mut record = ExtractionRecord::new_pending(&job);
        assert!(!record.is_monitor_timeout());
        record.metadata = serde_json::json!({"monitor_timeout": true});
        assert!(record.is_monitor_timeout());
    }
}
