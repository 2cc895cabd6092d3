//! Error types from across the crate, gathered in one place for callers.

pub use crate::phantom::PhantomError;
pub use crate::queue::LaunchFailure;
pub use crate::repository::RepositoryError;
pub use crate::services::ProcessError;
pub use crate::store::StoreError;
