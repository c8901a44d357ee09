//! Raw step events published by the agent runtime.
//!
//! The runtime reports what it is doing through structured payloads rather
//! than free-form strings; the one deliberately open field is the phase
//! marker, so an unrecognized marker can still flow through the classifier's
//! fallback path instead of being rejected at the seam.

use serde::{Deserialize, Serialize};

/// A raw event for one agent step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepEvent {
    /// Monotonically non-decreasing step index; ties are allowed for
    /// multiple events within one step.
    pub step: u64,
    pub payload: EventPayload,
}

impl StepEvent {
    pub fn new(step: u64, payload: EventPayload) -> Self {
        Self { step, payload }
    }
}

/// Payload of a raw step event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// Structural phase marker. Recognized markers: `separator`,
    /// `planning_start`, `planning_end`, `action_start`, `action_end`.
    Phase { marker: String },

    /// Planning prose; `delta` marks an incremental fragment.
    Planning { text: String, delta: bool },

    /// Reasoning text within an action step.
    Thought { text: String, delta: bool },

    /// A tool invocation record as handed over by the runtime.
    ToolCall {
        tool_name: String,
        args_summary: String,
    },

    /// Incremental fragment of the final answer.
    AnswerDelta { text: String },

    /// The authoritative final answer. `structured` marks serialized
    /// title/content/sources payloads rather than plain prose.
    Answer { text: String, structured: bool },

    /// Explicit run-completion marker.
    Completed,
}
