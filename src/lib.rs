//! PhantomQ - sequential admission queue for PhantomBuster profile extraction.
//!
//! PhantomBuster allows one extraction agent to run at a time, so every
//! process that wants a launch first requests the single extraction slot.
//! The slot and the FIFO waiting list live in Redis; completions arrive via
//! webhook or status polling and promote the next job in line. SQLite keeps
//! the audit log and the extracted person records.

pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod phantom;
pub mod queue;
pub mod repository;
pub mod server;
pub mod services;
pub mod store;
