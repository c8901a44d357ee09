//! Event classification.
//!
//! Maps raw step events onto the closed `message_type` vocabulary, flags
//! structural-only events, and decides which events are droppable before
//! they reach the transport. Tool identifiers are sanitized here so that
//! identical tools always normalize to one canonical token no matter how
//! the runtime decorated them.

use log::warn;

use crate::event::{EventPayload, StepEvent};
use crate::message::MessageType;

/// Whether a tool invocation counts as code execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Code,
    Other,
}

/// A classified step event, ready for merging and status derivation.
#[derive(Debug, Clone)]
pub struct Classified {
    pub message_type: MessageType,
    /// Structural-only: separators, bare headers/footers. Never allowed to
    /// drive a status transition on its own.
    pub structural: bool,
    pub content: String,
    /// Incremental fragment to be merged into the step buffer.
    pub delta: bool,
    /// Content is still being appended for this step.
    pub streaming: bool,
    pub tool_name: Option<String>,
    pub tool_kind: Option<ToolKind>,
    /// Content is a serialized structured object.
    pub structured: bool,
    /// Authoritative final answer of the run.
    pub final_answer: bool,
    /// Explicit completion marker.
    pub completion: bool,
    /// Classifier fell back to the generic content type.
    pub miss: bool,
}

impl Classified {
    fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            structural: false,
            content: String::new(),
            delta: false,
            streaming: false,
            tool_name: None,
            tool_kind: None,
            structured: false,
            final_answer: false,
            completion: false,
            miss: false,
        }
    }

    fn structural(message_type: MessageType) -> Self {
        Self {
            structural: true,
            ..Self::new(message_type)
        }
    }

    /// A droppable event never reaches the transport: separators always,
    /// and empty content unless it is a planning header, the final answer,
    /// or structured data.
    pub fn is_droppable(&self) -> bool {
        if self.message_type == MessageType::Separator {
            return true;
        }
        self.content.trim().is_empty()
            && self.message_type != MessageType::PlanningHeader
            && !self.final_answer
            && !self.structured
    }
}

/// Classifier with the configured coding-tool set.
#[derive(Debug, Clone)]
pub struct Classifier {
    coding_tools: Vec<String>,
}

impl Classifier {
    /// Tool names are normalized on the way in, so lookups are insensitive
    /// to case, hyphens, and decoration.
    pub fn new(coding_tools: &[String]) -> Self {
        Self {
            coding_tools: coding_tools.iter().map(|t| sanitize_tool_name(t)).collect(),
        }
    }

    pub fn classify(&self, event: &StepEvent) -> Classified {
        match &event.payload {
            EventPayload::Phase { marker } => self.classify_phase(event.step, marker),

            EventPayload::Planning { text, delta } => {
                let mut c = Classified::new(MessageType::PlanningContent);
                c.content = text.clone();
                c.delta = *delta;
                c.streaming = *delta;
                c
            }

            EventPayload::Thought { text, delta } => {
                let mut c = Classified::new(MessageType::ActionThought);
                c.content = text.clone();
                c.delta = *delta;
                c.streaming = *delta;
                c
            }

            EventPayload::ToolCall {
                tool_name,
                args_summary,
            } => {
                let name = sanitize_tool_name(tool_name);
                let mut c = Classified::new(MessageType::ToolCall);
                c.content = args_summary.clone();
                c.tool_kind = Some(if self.coding_tools.contains(&name) {
                    ToolKind::Code
                } else {
                    ToolKind::Other
                });
                c.tool_name = Some(name);
                c
            }

            EventPayload::AnswerDelta { text } => {
                let mut c = Classified::new(MessageType::FinalAnswer);
                c.content = text.clone();
                c.delta = true;
                c.streaming = true;
                c
            }

            EventPayload::Answer { text, structured } => {
                let mut c = Classified::new(MessageType::FinalAnswer);
                c.content = text.clone();
                c.structured = *structured;
                c.final_answer = true;
                c
            }

            EventPayload::Completed => {
                let mut c = Classified::structural(MessageType::Separator);
                c.completion = true;
                c
            }
        }
    }

    fn classify_phase(&self, step: u64, marker: &str) -> Classified {
        match normalize_marker(marker).as_str() {
            "separator" => Classified::structural(MessageType::Separator),
            // The wire vocabulary has no planning_footer; the closing marker
            // is structural noise and filters like a separator.
            "planning_end" => Classified::structural(MessageType::Separator),
            "planning_start" => Classified::new(MessageType::PlanningHeader),
            "action_start" => Classified::structural(MessageType::ActionHeader),
            "action_end" => Classified::structural(MessageType::ActionFooter),
            _ => {
                warn!(
                    "classifier miss: unrecognized phase marker {:?} at step {}",
                    marker, step
                );
                let mut c = Classified::new(MessageType::ActionThought);
                c.content = marker.to_string();
                c.miss = true;
                c
            }
        }
    }
}

/// Reduce a tool identifier to its canonical token: decorative characters
/// stripped, lowercased, separators collapsed to underscores.
pub fn sanitize_tool_name(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else if c == '_' || c == '-' || c.is_whitespace() {
                ' '
            } else {
                // markup artifacts, icons, stray punctuation
                '\0'
            }
        })
        .filter(|c| *c != '\0')
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

fn normalize_marker(marker: &str) -> String {
    sanitize_tool_name(marker)
}
