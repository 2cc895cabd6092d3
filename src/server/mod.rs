//! HTTP server for the sequential queue.
//!
//! Surfaces:
//! - the provider webhook callback
//! - queue inspection and control (status, enqueue, advance, remove)
//! - the audit log read API
//!
//! Starting the server also starts the background pieces: the completion
//! worker, the stuck-job monitor, and the status poller.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::queue::SequentialQueue;
use crate::repository::{AuditRepository, PersonRepository};
use crate::services::{
    spawn_completion_worker, CompletionService, CompletionSignal, ExtractionLauncher,
    StatusPoller, StuckJobMonitor,
};
use crate::store::RedisQueueStore;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<SequentialQueue>,
    pub audit: Arc<AuditRepository>,
    /// Channel into the completion worker.
    pub signals: mpsc::Sender<CompletionSignal>,
    /// Per-job duration estimate for the wait figures.
    pub average_run: Duration,
}

/// Start the server and its background tasks.
pub async fn serve(settings: &Settings) -> anyhow::Result<()> {
    let audit = Arc::new(AuditRepository::new(&settings.database_path)?);
    let people = Arc::new(PersonRepository::new(&settings.database_path)?);
    let store = Arc::new(RedisQueueStore::new(&settings.redis_url, settings.lock_ttl).await?);

    let launcher = Arc::new(ExtractionLauncher::new(settings.clone(), audit.clone()));
    let client = launcher.client();
    let queue = Arc::new(SequentialQueue::new(store, launcher));

    let (signals_tx, signals_rx) = mpsc::channel(64);
    let completion = Arc::new(CompletionService::new(
        audit.clone(),
        people,
        queue.clone(),
        client.clone(),
    ));
    spawn_completion_worker(completion, signals_rx);

    let monitor = StuckJobMonitor::new(audit.clone(), queue.clone(), settings);
    tokio::spawn(async move { monitor.run().await });

    let poller = StatusPoller::new(
        audit.clone(),
        client,
        signals_tx.clone(),
        settings.poll_interval,
    );
    tokio::spawn(async move { poller.run().await });

    let state = AppState {
        queue,
        audit,
        signals: signals_tx,
        average_run: settings.average_run,
    };
    let app = create_router(state);

    let addr: SocketAddr = settings.bind_addr.parse()?;
    tracing::info!("Starting queue server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::models::{ExtractionRecord, ExtractionStatus, JobRequest, WaitingJob};
    use crate::queue::{JobLauncher, LaunchFailure};
    use crate::store::MemoryQueueStore;
    use async_trait::async_trait;

    struct StubLauncher;

    #[async_trait]
    impl JobLauncher for StubLauncher {
        async fn launch(&self, _job: &WaitingJob) -> Result<(), LaunchFailure> {
            Ok(())
        }
    }

    struct TestApp {
        _dir: TempDir,
        app: axum::Router,
        audit: Arc<AuditRepository>,
        people: Arc<PersonRepository>,
    }

    fn setup_test_app() -> TestApp {
        let dir = TempDir::new().unwrap();
        let audit = Arc::new(AuditRepository::new(&dir.path().join("test.db")).unwrap());
        let people = Arc::new(PersonRepository::new(&dir.path().join("test.db")).unwrap());
        let queue = Arc::new(SequentialQueue::new(
            Arc::new(MemoryQueueStore::new()),
            Arc::new(StubLauncher),
        ));

        let (signals_tx, signals_rx) = mpsc::channel(16);
        let completion = Arc::new(CompletionService::new(
            audit.clone(),
            people.clone(),
            queue.clone(),
            None,
        ));
        spawn_completion_worker(completion, signals_rx);

        let state = AppState {
            queue,
            audit: audit.clone(),
            signals: signals_tx,
            average_run: Duration::from_secs(300),
        };
        TestApp {
            _dir: dir,
            app: create_router(state),
            audit,
            people,
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let t = setup_test_app();
        let response = t.app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_queue_status_idle() {
        let t = setup_test_app();
        let response = t.app.oneshot(get("/api/queue/status")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["queue_length"], 0);
        assert_eq!(json["is_processing"], false);
        assert!(json["current_job"].is_null());
        assert!(json["container_id"].is_null());
        assert_eq!(json["estimated_wait_seconds"], 0);
    }

    #[tokio::test]
    async fn test_queue_status_reports_target_position() {
        let t = setup_test_app();
        for target in ["company-a", "company-b", "company-c"] {
            t.app
                .clone()
                .oneshot(post_json("/api/queue/jobs", json!({"target_id": target})))
                .await
                .unwrap();
        }

        let response = t
            .app
            .clone()
            .oneshot(get("/api/queue/status?target_id=company-c"))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["position"], 2);

        let response = t
            .app
            .oneshot(get("/api/queue/status?target_id=company-x"))
            .await
            .unwrap();
        assert!(body_json(response).await["position"].is_null());
    }

    #[tokio::test]
    async fn test_enqueue_starts_first_and_queues_second() {
        let t = setup_test_app();

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                "/api/queue/jobs",
                json!({"target_id": "company-a"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let first = body_json(response).await;
        assert_eq!(first["started"], true);
        assert!(first["position"].is_null());

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                "/api/queue/jobs",
                json!({"target_id": "company-b", "search_url": "https://example.com/search"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let second = body_json(response).await;
        assert_eq!(second["started"], false);
        assert_eq!(second["position"], 1);
        assert_eq!(second["estimated_wait_seconds"], 300);

        let response = t.app.oneshot(get("/api/queue/status")).await.unwrap();
        let status = body_json(response).await;
        assert_eq!(status["is_processing"], true);
        assert_eq!(status["queue_length"], 1);
        assert_eq!(status["current_job"]["target_id"], "company-a");
        // One running plus one waiting.
        assert_eq!(status["estimated_wait_seconds"], 600);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_blank_target() {
        let t = setup_test_app();
        let response = t
            .app
            .oneshot(post_json("/api/queue/jobs", json!({"target_id": "  "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_queue_listing_and_removal() {
        let t = setup_test_app();
        for target in ["company-a", "company-b", "company-c"] {
            t.app
                .clone()
                .oneshot(post_json("/api/queue/jobs", json!({"target_id": target})))
                .await
                .unwrap();
        }

        let response = t.app.clone().oneshot(get("/api/queue/jobs")).await.unwrap();
        let waiting = body_json(response).await;
        assert_eq!(waiting.as_array().unwrap().len(), 2);
        assert_eq!(waiting[0]["target_id"], "company-b");

        let job_id = waiting[0]["job_id"].as_str().unwrap().to_string();
        let response = t
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/queue/jobs/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = t
            .app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/queue/jobs/{job_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_advance_promotes_next() {
        let t = setup_test_app();
        t.app
            .clone()
            .oneshot(post_json("/api/queue/jobs", json!({"target_id": "company-a"})))
            .await
            .unwrap();
        t.app
            .clone()
            .oneshot(post_json("/api/queue/jobs", json!({"target_id": "company-b"})))
            .await
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(post_json("/api/queue/advance", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["next_started"], true);

        let response = t.app.oneshot(get("/api/queue/status")).await.unwrap();
        let status = body_json(response).await;
        assert_eq!(status["current_job"]["target_id"], "company-b");
        assert_eq!(status["queue_length"], 0);
    }

    #[tokio::test]
    async fn test_webhook_acknowledges_garbage() {
        let t = setup_test_app();
        let response = t
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/phantombuster")
                    .header("content-type", "application/json")
                    .body(Body::from("not json at all"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn test_webhook_without_container_id_is_ignored() {
        let t = setup_test_app();
        let response = t
            .app
            .oneshot(post_json(
                "/webhooks/phantombuster",
                json!({"status": "finished", "exitCode": 0}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");
    }

    #[tokio::test]
    async fn test_webhook_completion_end_to_end() {
        let t = setup_test_app();

        // A running job with a linked container.
        t.app
            .clone()
            .oneshot(post_json("/api/queue/jobs", json!({"target_id": "company-a"})))
            .await
            .unwrap();
        let job = WaitingJob::from_request(JobRequest::new("company-a"));
        let record = ExtractionRecord::new_pending(&job);
        t.audit.create(&record).unwrap();
        t.audit
            .record_launch(&record.id, "cont-77", &json!({}))
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(post_json(
                "/webhooks/phantombuster",
                json!({
                    "containerId": "cont-77",
                    "exitCode": 0,
                    "status": "finished",
                    "resultObject": [
                        {"profileUrl": "https://linkedin.com/in/ola", "fullName": "Ola Nordmann"}
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "received");

        // Processing happens on the worker task; wait for the record to close.
        let mut closed = None;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let current = t.audit.get(&record.id).unwrap().unwrap();
            if current.status.is_terminal() {
                closed = Some(current);
                break;
            }
        }
        let closed = closed.expect("webhook never closed the record");
        assert_eq!(closed.status, ExtractionStatus::Success);
        assert_eq!(t.people.count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_jobs_listing_filters_by_status() {
        let t = setup_test_app();
        let job = WaitingJob::from_request(JobRequest::new("company-a"));
        let record = ExtractionRecord::new_pending(&job);
        t.audit.create(&record).unwrap();
        t.audit
            .complete(&record.id, ExtractionStatus::Failed, Some("boom"), &json!({}))
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(get("/api/jobs?status=failed"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let failed = body_json(response).await;
        assert_eq!(failed.as_array().unwrap().len(), 1);
        assert_eq!(failed[0]["target_id"], "company-a");

        let response = t
            .app
            .clone()
            .oneshot(get("/api/jobs?status=pending"))
            .await
            .unwrap();
        assert!(body_json(response).await.as_array().unwrap().is_empty());

        let response = t.app.oneshot(get("/api/jobs?status=bogus")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
