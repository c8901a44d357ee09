//! Per-session stream orchestration.

mod coordinator;

pub use coordinator::{PublishError, PublishOutcome, StreamCoordinator, Subscription};
