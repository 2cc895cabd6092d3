//! PhantomBuster API v2 client and result payload handling.
//!
//! The provider exposes a small REST surface: agents are configured and
//! launched, each launch yields a container, and containers report status,
//! console output and a result object. Everything here is transport; which
//! signals mean "done" is decided by [`crate::models::PhantomEvent`].

mod client;
mod results;

pub use client::{PhantomClient, PhantomError};
pub use results::{extract_result_url, parse_profiles};
