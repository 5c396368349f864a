//! HTTP handlers.

pub mod health;
pub mod jobs;
pub mod queues;

pub use health::health;
