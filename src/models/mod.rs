//! Data models for phantomq.

mod event;
mod extraction;
mod job;
mod person;

pub use event::{PhantomEvent, PhantomWebhookPayload, ResultSource};
pub use extraction::{ExtractionRecord, ExtractionStatus};
pub use job::{
    CompletionKind, JobDescriptor, JobRequest, QueueSnapshot, SlotDecision, WaitingJob,
    DEFAULT_JOB_KIND,
};
pub use person::{PersonRecord, ProfileData, UpsertCounts};
