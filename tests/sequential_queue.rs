//! End-to-end exercises of the sequential admission queue.
//!
//! Wires the real components together the way the server does (shared store,
//! launcher, completion service, monitor) and drives whole job lifecycles
//! through the public API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::Mutex;

use phantomq::config::Settings;
use phantomq::models::{
    CompletionKind, ExtractionRecord, ExtractionStatus, JobRequest, PhantomWebhookPayload,
    WaitingJob,
};
use phantomq::queue::{JobLauncher, LaunchFailure, SequentialQueue};
use phantomq::repository::{AuditRepository, PersonRepository};
use phantomq::services::{CompletionService, CompletionSignal, StuckJobMonitor, STUCK_REASON};
use phantomq::store::MemoryQueueStore;

/// Records launch order without talking to the provider.
struct RecordingLauncher {
    launched: Mutex<Vec<String>>,
}

impl RecordingLauncher {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            launched: Mutex::new(Vec::new()),
        })
    }

    async fn order(&self) -> Vec<String> {
        self.launched.lock().await.clone()
    }
}

#[async_trait]
impl JobLauncher for RecordingLauncher {
    async fn launch(&self, job: &WaitingJob) -> Result<(), LaunchFailure> {
        self.launched.lock().await.push(job.target_id.clone());
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    audit: Arc<AuditRepository>,
    people: Arc<PersonRepository>,
    queue: Arc<SequentialQueue>,
    launcher: Arc<RecordingLauncher>,
    completion: CompletionService,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let audit = Arc::new(AuditRepository::new(&dir.path().join("queue.db")).unwrap());
    let people = Arc::new(PersonRepository::new(&dir.path().join("queue.db")).unwrap());
    let launcher = RecordingLauncher::new();
    let queue = Arc::new(SequentialQueue::new(
        Arc::new(MemoryQueueStore::new()),
        launcher.clone() as Arc<dyn JobLauncher>,
    ));
    let completion = CompletionService::new(audit.clone(), people.clone(), queue.clone(), None);
    Harness {
        dir,
        audit,
        people,
        queue,
        launcher,
        completion,
    }
}

/// Create the audit record and container link a real launch would have made.
fn record_launch(h: &Harness, target: &str, container: &str) -> ExtractionRecord {
    let job = WaitingJob::from_request(JobRequest::new(target));
    let record = ExtractionRecord::new_pending(&job);
    h.audit.create(&record).unwrap();
    h.audit
        .record_launch(&record.id, container, &json!({}))
        .unwrap();
    h.audit.get(&record.id).unwrap().unwrap()
}

/// Decode a raw webhook body the way the webhook handler does.
fn webhook_signal(body: serde_json::Value) -> CompletionSignal {
    let payload: PhantomWebhookPayload = serde_json::from_value(body).unwrap();
    CompletionSignal {
        container_id: payload.container_id.clone().unwrap(),
        event: payload.decode().unwrap(),
        source: "webhook",
    }
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_one_and_order_the_rest() {
    let h = harness();

    let requests = (0..12).map(|i| {
        let queue = h.queue.clone();
        async move {
            queue
                .request_slot(JobRequest::new(format!("company-{i:02}")))
                .await
                .unwrap()
        }
    });
    let decisions = futures::future::join_all(requests).await;

    let started = decisions.iter().filter(|d| d.started).count();
    assert_eq!(started, 1);

    let mut positions: Vec<_> = decisions.iter().filter_map(|d| d.position).collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=11).collect::<Vec<_>>());

    let status = h.queue.queue_status().await.unwrap();
    assert!(status.is_processing);
    assert_eq!(status.queue_length, 11);
}

#[tokio::test]
async fn waiting_jobs_start_in_enqueue_order() {
    let h = harness();
    for target in ["alpha", "beta", "gamma", "delta"] {
        h.queue.request_slot(JobRequest::new(target)).await.unwrap();
    }

    // Remove one from the middle; the rest keep their relative order.
    let waiting = h.queue.queue_contents().await.unwrap();
    assert_eq!(waiting.len(), 3);
    let gamma = waiting.iter().find(|j| j.target_id == "gamma").unwrap();
    assert!(h.queue.remove_job(&gamma.job_id).await.unwrap());

    while h
        .queue
        .job_completed(None, CompletionKind::Manual)
        .await
        .unwrap()
    {}

    assert_eq!(h.launcher.order().await, vec!["alpha", "beta", "delta"]);
    assert!(!h.queue.queue_status().await.unwrap().is_processing);
}

#[tokio::test]
async fn webhook_success_closes_record_stores_profiles_and_promotes() {
    let h = harness();

    let first = h
        .queue
        .request_slot(JobRequest::new("company-a"))
        .await
        .unwrap();
    assert!(first.started);
    let second = h
        .queue
        .request_slot(JobRequest::new("company-b"))
        .await
        .unwrap();
    assert!(!second.started);
    assert_eq!(second.position, Some(1));

    let record = record_launch(&h, "company-a", "cont-1");

    h.completion
        .handle_signal(webhook_signal(json!({
            "containerId": "cont-1",
            "exitCode": 0,
            "status": "finished",
            "resultObject": [
                {
                    "profileUrl": "https://linkedin.com/in/ada",
                    "fullName": "Ada Day",
                    "email": "ada@example.com"
                },
                {"profileUrl": "https://linkedin.com/in/lin", "fullName": "Lin Bo"}
            ]
        })))
        .await
        .unwrap();

    let closed = h.audit.get(&record.id).unwrap().unwrap();
    assert_eq!(closed.status, ExtractionStatus::Success);
    assert!(closed.completed_at.is_some());
    assert!(closed.execution_time_ms.is_some());
    assert_eq!(h.people.count().unwrap(), 2);

    // The completion promoted company-b, exactly once.
    assert_eq!(h.launcher.order().await, vec!["company-a", "company-b"]);
    let status = h.queue.queue_status().await.unwrap();
    assert_eq!(status.current_job.unwrap().target_id, "company-b");
    assert_eq!(status.queue_length, 0);
}

#[tokio::test]
async fn duplicate_webhook_never_advances_twice() {
    let h = harness();
    for target in ["company-a", "company-b", "company-c"] {
        h.queue.request_slot(JobRequest::new(target)).await.unwrap();
    }
    record_launch(&h, "company-a", "cont-1");

    let body = json!({
        "containerId": "cont-1",
        "exitCode": 0,
        "resultObject": [{"profileUrl": "https://linkedin.com/in/ada"}]
    });
    h.completion
        .handle_signal(webhook_signal(body.clone()))
        .await
        .unwrap();
    h.completion.handle_signal(webhook_signal(body)).await.unwrap();

    // The retried delivery found a terminal record: no second upsert, no
    // second promotion.
    assert_eq!(h.people.count().unwrap(), 1);
    assert_eq!(h.launcher.order().await, vec!["company-a", "company-b"]);
    assert_eq!(h.queue.queue_status().await.unwrap().queue_length, 1);
}

#[tokio::test]
async fn monitor_fails_stale_job_and_frees_the_slot() {
    let h = harness();
    h.queue
        .request_slot(JobRequest::new("company-a"))
        .await
        .unwrap();
    h.queue
        .request_slot(JobRequest::new("company-b"))
        .await
        .unwrap();
    let record = record_launch(&h, "company-a", "cont-1");

    // Backdate the launch 15 minutes; no webhook ever arrives.
    let conn = rusqlite::Connection::open(h.dir.path().join("queue.db")).unwrap();
    let started = (chrono::Utc::now() - chrono::Duration::minutes(15)).to_rfc3339();
    conn.execute(
        "UPDATE extraction_jobs SET started_at = ?1 WHERE id = ?2",
        rusqlite::params![started, record.id],
    )
    .unwrap();

    let settings = Settings {
        stuck_timeout: Duration::from_secs(10 * 60),
        ..Settings::default()
    };
    let monitor = StuckJobMonitor::new(h.audit.clone(), h.queue.clone(), &settings);
    assert_eq!(monitor.sweep().await.unwrap(), 1);

    let failed = h.audit.get(&record.id).unwrap().unwrap();
    assert_eq!(failed.status, ExtractionStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some(STUCK_REASON));
    assert_eq!(
        failed.metadata.get("monitor_timeout").and_then(|v| v.as_bool()),
        Some(true)
    );

    // The slot moved on to company-b.
    assert_eq!(h.launcher.order().await, vec!["company-a", "company-b"]);
    assert_eq!(
        h.queue
            .queue_status()
            .await
            .unwrap()
            .current_job
            .unwrap()
            .target_id,
        "company-b"
    );
}

#[tokio::test]
async fn reprocessing_partial_data_never_clobbers_filled_fields() {
    let h = harness();

    // First run stores a complete profile.
    h.queue
        .request_slot(JobRequest::new("company-a"))
        .await
        .unwrap();
    record_launch(&h, "company-a", "cont-1");
    h.completion
        .handle_signal(webhook_signal(json!({
            "containerId": "cont-1",
            "exitCode": 0,
            "resultObject": [{
                "profileUrl": "https://linkedin.com/in/ada",
                "fullName": "Ada Day",
                "email": "ada@example.com",
                "title": "Engineer"
            }]
        })))
        .await
        .unwrap();

    // A later run re-extracts the same person with gaps and one new field.
    h.queue
        .request_slot(JobRequest::new("company-a"))
        .await
        .unwrap();
    record_launch(&h, "company-a", "cont-2");
    h.completion
        .handle_signal(webhook_signal(json!({
            "containerId": "cont-2",
            "exitCode": 0,
            "resultObject": [{
                "profileUrl": "https://linkedin.com/in/ada",
                "fullName": "Ada Day",
                "email": "",
                "location": "Oslo"
            }]
        })))
        .await
        .unwrap();

    let person = h
        .people
        .find_by_profile_url("https://linkedin.com/in/ada")
        .unwrap()
        .unwrap();
    assert_eq!(person.email.as_deref(), Some("ada@example.com"));
    assert_eq!(person.title.as_deref(), Some("Engineer"));
    assert_eq!(person.location.as_deref(), Some("Oslo"));
    assert_eq!(h.people.count().unwrap(), 1);
}
