//! Admission control for the single phantom slot.
//!
//! At most one extraction job runs at a time across every process sharing
//! the store. The controller here owns the decision "start now or wait",
//! the FIFO promotion when a slot frees, and the ops surface over both.

mod controller;

pub use controller::{JobLauncher, LaunchFailure, SequentialQueue};
