//! Configuration management for phantomq.
//!
//! All settings come from environment variables (a `.env` file is loaded by
//! main before anything else) with CLI flags taking precedence where a flag
//! exists. There is no config file discovery; the deployment surface is small
//! enough that env-only keeps operational drift down.

use std::path::PathBuf;
use std::time::Duration;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "phantomq.db";

/// Default Redis URL for the shared lock/queue store.
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// PhantomBuster API v2 base URL.
pub const DEFAULT_API_BASE: &str = "https://api.phantombuster.com/api/v2";

/// Service name recorded on audit rows for this subsystem.
pub const SERVICE_NAME: &str = "phantom_profile_extraction";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path to the SQLite database holding audit rows and extracted records.
    pub database_path: PathBuf,
    /// Redis URL backing the distributed lock and waiting list.
    pub redis_url: String,
    /// PhantomBuster API base URL.
    pub api_base: String,
    /// PhantomBuster API key (X-Phantombuster-Key-1 header).
    pub api_key: Option<String>,
    /// Agent (phantom) id launched for profile extraction jobs.
    pub agent_id: Option<String>,
    /// Public base URL this server is reachable at, used to build the
    /// webhook callback URL passed to the provider.
    pub webhook_base_url: Option<String>,
    /// Bind address for the HTTP server.
    pub bind_addr: String,
    /// TTL on the lock key itself. Safety net against a holder process that
    /// dies without ever producing a terminal signal; normally the monitor
    /// fires long before this.
    pub lock_ttl: Duration,
    /// Age past which a pending job is considered stuck and force-failed.
    pub stuck_timeout: Duration,
    /// Period of the stuck-job monitor sweep.
    pub monitor_period: Duration,
    /// Interval between container status polls while a job is running.
    pub poll_interval: Duration,
    /// Rough per-job duration used for the estimated-wait figure on the
    /// status surface.
    pub average_run: Duration,
    /// Outbound HTTP request timeout in seconds.
    pub request_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILENAME),
            redis_url: DEFAULT_REDIS_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            agent_id: None,
            webhook_base_url: None,
            bind_addr: "127.0.0.1:8420".to_string(),
            lock_ttl: Duration::from_secs(30 * 60),
            stuck_timeout: Duration::from_secs(10 * 60),
            monitor_period: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(30),
            average_run: Duration::from_secs(5 * 60),
            request_timeout: 30,
        }
    }
}

impl Settings {
    /// Build settings from the environment, starting from defaults.
    pub fn from_env() -> Self {
        let mut settings = Self::default();

        if let Some(path) = env_string("PHANTOMQ_DATABASE") {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(url) = env_string("REDIS_URL") {
            tracing::debug!("Using REDIS_URL from environment");
            settings.redis_url = url;
        }
        if let Some(base) = env_string("PHANTOMBUSTER_API_BASE") {
            settings.api_base = base;
        }
        settings.api_key = env_string("PHANTOMBUSTER_API_KEY");
        settings.agent_id = env_string("PHANTOMBUSTER_AGENT_ID");
        // A base URL the provider cannot reach means callbacks silently never
        // arrive, so a malformed one is rejected up front.
        if let Some(base) = env_string("PHANTOMQ_WEBHOOK_BASE_URL") {
            match url::Url::parse(&base) {
                Ok(_) => settings.webhook_base_url = Some(base),
                Err(err) => {
                    tracing::warn!("Ignoring invalid PHANTOMQ_WEBHOOK_BASE_URL: {}", err)
                }
            }
        }
        if let Some(addr) = env_string("PHANTOMQ_BIND") {
            settings.bind_addr = addr;
        }
        if let Some(secs) = env_u64("PHANTOMQ_LOCK_TTL_SECS") {
            settings.lock_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PHANTOMQ_STUCK_TIMEOUT_SECS") {
            settings.stuck_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PHANTOMQ_MONITOR_PERIOD_SECS") {
            settings.monitor_period = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PHANTOMQ_POLL_INTERVAL_SECS") {
            settings.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PHANTOMQ_AVERAGE_RUN_SECS") {
            settings.average_run = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("PHANTOMQ_REQUEST_TIMEOUT_SECS") {
            settings.request_timeout = secs;
        }

        settings
    }

    /// The webhook URL the provider should call back, if a public base URL
    /// is configured.
    pub fn webhook_url(&self) -> Option<String> {
        self.webhook_base_url
            .as_ref()
            .map(|base| format!("{}/webhooks/phantombuster", base.trim_end_matches('/')))
    }

    /// Verify the settings needed to launch real provider jobs are present.
    pub fn validate_for_launch(&self) -> Result<(), String> {
        if self.api_key.as_deref().is_none_or(str::is_empty) {
            return Err("PHANTOMBUSTER_API_KEY is not set".to_string());
        }
        if self.agent_id.as_deref().is_none_or(str::is_empty) {
            return Err("PHANTOMBUSTER_AGENT_ID is not set".to_string());
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
