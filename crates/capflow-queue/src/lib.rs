//! Queue orchestration for the subtitle pipeline.
//!
//! This crate provides:
//! - A continuously refilled bounded window for draining batches of jobs
//! - The entitlement gate deciding plan concurrency and monthly quota
//! - Pause / resume and draft management for named job queues

pub mod batch;
pub mod entitlement;
pub mod error;
pub mod state;

pub use batch::{process_batch, BatchReport};
pub use entitlement::{month_start, BatchDecision, EntitlementGate, PlanEntitlementGate};
pub use error::{QueueError, QueueResult};
pub use state::{JobRunner, PauseOutcome, QueueStateManager, ResumeOutcome, DEFAULT_QUEUE_NAME};
