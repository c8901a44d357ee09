//! Canonical message envelope and metadata vocabulary.

mod models;

pub use models::{AgentStatus, Message, MessageMetadata, MessageType, Role};
