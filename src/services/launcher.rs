//! Launching a promoted queue entry against the provider.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::models::{ExtractionRecord, ExtractionStatus, WaitingJob};
use crate::phantom::PhantomClient;
use crate::queue::{JobLauncher, LaunchFailure};
use crate::repository::AuditRepository;

/// Launches extraction jobs: writes the pending audit record, pushes the
/// job's parameters into the agent's argument, launches, and stores the
/// resulting container id.
///
/// Any synchronous failure closes the audit record as failed before the
/// error reaches the queue, so a `LaunchFailure` always corresponds to a
/// terminal audit row.
pub struct ExtractionLauncher {
    settings: Settings,
    audit: Arc<AuditRepository>,
    client: Option<PhantomClient>,
}

impl ExtractionLauncher {
    pub fn new(settings: Settings, audit: Arc<AuditRepository>) -> Self {
        let client = settings
            .api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .map(|key| {
                PhantomClient::new(
                    &settings.api_base,
                    key,
                    Duration::from_secs(settings.request_timeout),
                )
            });

        Self {
            settings,
            audit,
            client,
        }
    }

    pub fn client(&self) -> Option<PhantomClient> {
        self.client.clone()
    }

    /// Close the audit record and surface the failure to the queue.
    fn fail(&self, record_id: &str, reason: String) -> LaunchFailure {
        let patch = json!({ "launch_error": true });
        if let Err(err) =
            self.audit
                .complete(record_id, ExtractionStatus::Failed, Some(&reason), &patch)
        {
            error!("Could not record launch failure: {}", err);
        }
        LaunchFailure(reason)
    }
}

#[async_trait]
impl JobLauncher for ExtractionLauncher {
    async fn launch(&self, job: &WaitingJob) -> Result<(), LaunchFailure> {
        let record = ExtractionRecord::new_pending(job);
        self.audit
            .create(&record)
            .map_err(|e| LaunchFailure(format!("could not create audit record: {e}")))?;

        if let Err(reason) = self.settings.validate_for_launch() {
            return Err(self.fail(&record.id, reason));
        }
        // Both validated non-empty above.
        let agent_id = self.settings.agent_id.clone().unwrap_or_default();
        let client = match &self.client {
            Some(client) => client,
            None => return Err(self.fail(&record.id, "no provider client".to_string())),
        };

        let webhook_url = self.settings.webhook_url();
        if webhook_url.is_none() {
            debug!("No webhook base URL configured; relying on status polling");
        }

        if let Err(err) = client
            .configure_agent(
                &agent_id,
                job.search_url.as_deref(),
                webhook_url.as_deref(),
                &job.extra_params,
            )
            .await
        {
            return Err(self.fail(&record.id, format!("agent configuration failed: {err}")));
        }

        let container_id = match client.launch_agent(&agent_id).await {
            Ok(id) => id,
            Err(err) => return Err(self.fail(&record.id, format!("launch failed: {err}"))),
        };

        info!(
            "Launched phantom for {} (container {})",
            job.target_id, container_id
        );

        let patch = json!({
            "agent_id": agent_id,
            "launched_at": Utc::now().to_rfc3339(),
            "search_url": job.search_url,
            "webhook_url": webhook_url,
        });
        if let Err(err) = self.audit.record_launch(&record.id, &container_id, &patch) {
            // The phantom is running; failing the launch here would let the
            // queue start a second one. Keep the slot and let the monitor
            // reap this record if no signal ever routes to it.
            error!(
                "Could not store container id {} for {}: {}",
                container_id, record.id, err
            );
        }

        Ok(())
    }
}
