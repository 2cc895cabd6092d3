//! Provider callback payloads and their decoded event form.
//!
//! PhantomBuster's callbacks are loosely shaped: key presence varies by event
//! kind and agent version. The raw payload is decoded exactly once, at the
//! boundary, into [`PhantomEvent`]; everything downstream matches on the enum
//! and never re-inspects JSON.

use serde::{Deserialize, Serialize};

/// Raw webhook body as the provider sends it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhantomWebhookPayload {
    pub container_id: Option<String>,
    pub agent_id: Option<String>,
    pub agent_name: Option<String>,
    pub status: Option<String>,
    pub exit_code: Option<i64>,
    pub exit_message: Option<String>,
    pub progress: Option<f64>,
    pub result_url: Option<String>,
    pub result_object: Option<serde_json::Value>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub duration: Option<f64>,
}

/// Where a completed run's extracted data lives.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultSource {
    /// Provider-hosted JSON document to fetch.
    Url(String),
    /// Result embedded in the callback payload. May itself be a JSON string.
    Inline(serde_json::Value),
}

/// One decoded lifecycle event for a running container.
#[derive(Debug, Clone, PartialEq)]
pub enum PhantomEvent {
    /// The launch API call failed synchronously; no container exists.
    LaunchFailed { reason: String },
    /// Container still running; optional completion percentage.
    Progress {
        percent: Option<f64>,
        message: Option<String>,
    },
    /// Container finished cleanly. Result may be absent when the agent
    /// produced no output.
    Completed { result: Option<ResultSource> },
    /// Container finished with an error.
    Failed { reason: String },
}

impl PhantomEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::LaunchFailed { .. } => "launch_failed",
            Self::Progress { .. } => "progress",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl PhantomWebhookPayload {
    /// Whether the payload carries enough identity to route.
    pub fn is_routable(&self) -> bool {
        self.container_id.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Classify the payload. `None` means the shape is unrecognized and the
    /// caller should log and drop it without touching any record.
    ///
    /// Precedence follows the provider's observed behavior: a zero exit code
    /// or `finished` status wins even when other fields look odd, an explicit
    /// error status or nonzero exit code is a failure, `running` is progress,
    /// and an unknown status that nevertheless carries a result object is
    /// treated as completion.
    pub fn decode(&self) -> Option<PhantomEvent> {
        let status = self.status.as_deref();

        if self.exit_code == Some(0) || status == Some("finished") {
            return Some(PhantomEvent::Completed {
                result: self.result_source(),
            });
        }

        if status == Some("error") || self.exit_code.is_some_and(|code| code != 0) {
            return Some(PhantomEvent::Failed {
                reason: self.failure_reason(),
            });
        }

        if status == Some("running") {
            return Some(PhantomEvent::Progress {
                percent: self.progress,
                message: self.message.clone(),
            });
        }

        if self.has_result_object() {
            return Some(PhantomEvent::Completed {
                result: self.result_source(),
            });
        }

        None
    }

    fn result_source(&self) -> Option<ResultSource> {
        if let Some(url) = self.result_url.as_deref().filter(|s| !s.is_empty()) {
            return Some(ResultSource::Url(url.to_string()));
        }
        if self.has_result_object() {
            return self.result_object.clone().map(ResultSource::Inline);
        }
        None
    }

    fn has_result_object(&self) -> bool {
        match &self.result_object {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Array(a)) => !a.is_empty(),
            Some(serde_json::Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }

    fn failure_reason(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.exit_message.clone())
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| match self.exit_code {
                Some(code) => format!("phantom exited with code {}", code),
                None => "phantom reported an error".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: serde_json::Value) -> PhantomWebhookPayload {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_finished_status_is_completion() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "finished",
            "resultUrl": "https://files.example.com/result.json"
        }))
        .decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Completed {
                result: Some(ResultSource::Url(
                    "https://files.example.com/result.json".to_string()
                ))
            })
        );
    }

    #[test]
    fn test_zero_exit_code_wins_over_status() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "running",
            "exitCode": 0
        }))
        .decode();
        assert!(matches!(event, Some(PhantomEvent::Completed { .. })));
    }

    #[test]
    fn test_error_status_is_failure() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "error",
            "error": "agent crashed"
        }))
        .decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Failed {
                reason: "agent crashed".to_string()
            })
        );
    }

    #[test]
    fn test_nonzero_exit_code_is_failure() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "exitCode": 2,
            "exitMessage": "session expired"
        }))
        .decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Failed {
                reason: "session expired".to_string()
            })
        );
    }

    #[test]
    fn test_failure_reason_falls_back_to_exit_code() {
        let event = payload(serde_json::json!({"containerId": "c1", "exitCode": 137})).decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Failed {
                reason: "phantom exited with code 137".to_string()
            })
        );
    }

    #[test]
    fn test_running_is_progress() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "running",
            "progress": 0.4
        }))
        .decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Progress {
                percent: Some(0.4),
                message: None
            })
        );
    }

    #[test]
    fn test_unknown_status_with_result_object_is_completion() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "something-new",
            "resultObject": [{"profileUrl": "https://linkedin.com/in/x"}]
        }))
        .decode();
        assert!(matches!(
            event,
            Some(PhantomEvent::Completed {
                result: Some(ResultSource::Inline(_))
            })
        ));
    }

    #[test]
    fn test_unrecognized_payload_decodes_to_none() {
        assert_eq!(payload(serde_json::json!({"containerId": "c1"})).decode(), None);
        assert_eq!(
            payload(serde_json::json!({
                "containerId": "c1",
                "status": "something-new",
                "resultObject": ""
            }))
            .decode(),
            None
        );
    }

    #[test]
    fn test_result_url_preferred_over_inline() {
        let event = payload(serde_json::json!({
            "containerId": "c1",
            "status": "finished",
            "resultUrl": "https://files.example.com/r.json",
            "resultObject": [{"a": 1}]
        }))
        .decode();
        assert_eq!(
            event,
            Some(PhantomEvent::Completed {
                result: Some(ResultSource::Url(
                    "https://files.example.com/r.json".to_string()
                ))
            })
        );
    }

    #[test]
    fn test_routable_requires_container_id() {
        assert!(!payload(serde_json::json!({"status": "finished"})).is_routable());
        assert!(payload(serde_json::json!({"containerId": "c1"})).is_routable());
    }

    #[test]
    fn test_terminal_classification() {
        assert!(PhantomEvent::Completed { result: None }.is_terminal());
        assert!(PhantomEvent::Failed {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(!PhantomEvent::Progress {
            percent: None,
            message: None
        }
        .is_terminal());
    }
}
