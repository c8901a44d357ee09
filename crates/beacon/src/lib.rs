//! Beacon: agent activity streaming core.
//!
//! Streams the execution of a multi-step agent run to clients over a
//! persistent connection: classifies raw step events into a stable message
//! vocabulary, merges streaming deltas into coherent content, derives a
//! single consistent agent status, and delivers messages in strict
//! publish order per session.

pub mod api;
pub mod classify;
pub mod event;
pub mod merge;
pub mod message;
pub mod runtime;
pub mod session;
pub mod settings;
pub mod status;
pub mod stream;
pub mod ws;
