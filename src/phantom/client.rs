//! Thin client for the PhantomBuster API v2.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

/// Errors from talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum PhantomError {
    /// Transport failure before a response arrived.
    #[error("connection error: {0}")]
    Connection(String),
    /// The API answered with a non-success status.
    #[error("api error: {0}")]
    Api(String),
    /// The response body was not in the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Authenticated client for one PhantomBuster account.
#[derive(Clone)]
pub struct PhantomClient {
    client: Client,
    api_base: String,
    api_key: String,
}

impl PhantomClient {
    pub fn new(api_base: &str, api_key: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Fetch an agent's current definition, including its saved argument.
    pub async fn fetch_agent(&self, agent_id: &str) -> Result<Value, PhantomError> {
        self.get_json("agents/fetch", &[("id", agent_id)]).await
    }

    /// Merge job parameters into the agent's saved argument and store it
    /// back. The provider reads the argument at launch time, so this must
    /// happen before [`launch_agent`](Self::launch_agent).
    ///
    /// Layering, later wins: saved argument, then per-job extras, then
    /// `spreadsheetUrl` from the job's search URL, then the webhook URL.
    pub async fn configure_agent(
        &self,
        agent_id: &str,
        search_url: Option<&str>,
        webhook_url: Option<&str>,
        extra_params: &Value,
    ) -> Result<(), PhantomError> {
        let agent = self.fetch_agent(agent_id).await?;
        let mut argument = parse_argument(agent.get("argument"));

        if let (Some(argument), Some(extras)) = (argument.as_object_mut(), extra_params.as_object())
        {
            for (key, value) in extras {
                argument.insert(key.clone(), value.clone());
            }
        }
        if let (Some(argument), Some(url)) = (argument.as_object_mut(), search_url) {
            argument.insert("spreadsheetUrl".to_string(), Value::String(url.to_string()));
        }
        if let (Some(argument), Some(url)) = (argument.as_object_mut(), webhook_url) {
            argument.insert("webhook".to_string(), Value::String(url.to_string()));
        }

        debug!("Saving argument for agent {}", agent_id);
        let argument_str = argument.to_string();
        self.post_json(
            "agents/save",
            &json!({ "id": agent_id, "argument": argument_str }),
        )
        .await?;
        Ok(())
    }

    /// Launch the agent. Returns the container id tracking this run.
    pub async fn launch_agent(&self, agent_id: &str) -> Result<String, PhantomError> {
        let response = self
            .post_json("agents/launch", &json!({ "id": agent_id }))
            .await?;
        container_id_from(&response)
            .ok_or_else(|| PhantomError::Parse("launch response missing containerId".to_string()))
    }

    /// Fetch a container's current state (status, exit code, timings).
    pub async fn fetch_container(&self, container_id: &str) -> Result<Value, PhantomError> {
        self.get_json("containers/fetch", &[("id", container_id)])
            .await
    }

    /// Fetch a container's console output. Finished runs print the URL of
    /// their result file here.
    pub async fn fetch_output(&self, container_id: &str) -> Result<String, PhantomError> {
        let response = self
            .get_json("containers/fetch-output", &[("id", container_id)])
            .await?;
        Ok(response
            .get("output")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string())
    }

    /// Download a result file from the provider's storage. These live on a
    /// separate host, so the path is absolute and unauthenticated.
    pub async fn download_result(&self, url: &str) -> Result<Value, PhantomError> {
        debug!("Downloading result file from {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PhantomError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PhantomError::Api(format!(
                "HTTP {} fetching result file",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PhantomError::Parse(e.to_string()))
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, PhantomError> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .client
            .get(&url)
            .header("X-Phantombuster-Key-1", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| PhantomError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PhantomError::Api(format!(
                "HTTP {} from {}",
                response.status(),
                path
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PhantomError::Parse(e.to_string()))
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, PhantomError> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .client
            .post(&url)
            .header("X-Phantombuster-Key-1", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| PhantomError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PhantomError::Api(format!(
                "HTTP {} from {}",
                response.status(),
                path
            )));
        }
        response
            .json()
            .await
            .map_err(|e| PhantomError::Parse(e.to_string()))
    }
}

/// The saved argument arrives either as a JSON object or as a JSON-encoded
/// string, depending on agent age. Unparseable arguments start fresh.
fn parse_argument(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            serde_json::from_str(s).unwrap_or_else(|_| json!({}))
        }
        _ => json!({}),
    }
}

/// Container ids arrive as numbers or strings depending on endpoint version.
fn container_id_from(response: &Value) -> Option<String> {
    match response.get("containerId") {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
