//! Service layer for phantomq.
//!
//! Launching jobs against the provider, digesting completion signals,
//! reaping stuck jobs, and polling container status. Services are shared by
//! the CLI and the HTTP server.

pub mod completion;
pub mod launcher;
pub mod monitor;
pub mod poller;

use thiserror::Error;

pub use completion::{spawn_completion_worker, CompletionService, CompletionSignal};
pub use launcher::ExtractionLauncher;
pub use monitor::{StuckJobMonitor, STUCK_REASON};
pub use poller::StatusPoller;

/// Errors from digesting signals and sweeping for stuck jobs.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("store error: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("database error: {0}")]
    Repository(#[from] crate::repository::RepositoryError),
    #[error("provider error: {0}")]
    Provider(#[from] crate::phantom::PhantomError),
    /// A result URL needs fetching but no API client is configured.
    #[error("no provider client configured")]
    NoClient,
    /// The completion channel's receiving task is gone.
    #[error("completion worker stopped")]
    WorkerStopped,
}
