//! Message data models.
//!
//! These types define the outbound wire protocol: every delivered message is
//! one `Message` serialized as a JSON object. The `message_type` and
//! `agent_status` vocabularies are closed; the rendering layer on the other
//! side of the socket relies on them being stable and exhaustive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the agent is currently doing, as shown to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Idle; initial and terminal state of a run.
    Standby,
    /// Gap filler shown when no event has arrived for longer than the idle
    /// threshold during an active run.
    Loading,
    /// Planning the first run of a session.
    InitialPlanning,
    /// Re-planning on a follow-up query in the same session.
    UpdatePlanning,
    /// Producing reasoning text with no tool in flight.
    Thinking,
    /// Executing code.
    Coding,
    /// One or more non-code tool invocations outstanding.
    ActionsRunning,
    /// Streaming the final answer.
    Writing,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Standby => write!(f, "standby"),
            AgentStatus::Loading => write!(f, "loading"),
            AgentStatus::InitialPlanning => write!(f, "initial_planning"),
            AgentStatus::UpdatePlanning => write!(f, "update_planning"),
            AgentStatus::Thinking => write!(f, "thinking"),
            AgentStatus::Coding => write!(f, "coding"),
            AgentStatus::ActionsRunning => write!(f, "actions_running"),
            AgentStatus::Writing => write!(f, "writing"),
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standby" => Ok(AgentStatus::Standby),
            "loading" => Ok(AgentStatus::Loading),
            "initial_planning" => Ok(AgentStatus::InitialPlanning),
            "update_planning" => Ok(AgentStatus::UpdatePlanning),
            "thinking" => Ok(AgentStatus::Thinking),
            "coding" => Ok(AgentStatus::Coding),
            "actions_running" => Ok(AgentStatus::ActionsRunning),
            "writing" => Ok(AgentStatus::Writing),
            _ => Err(format!("unknown agent status: {}", s)),
        }
    }
}

impl TryFrom<String> for AgentStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Renderable message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Visual separation only; never delivered.
    Separator,
    /// Start of a planning phase. Delivered even with empty content so the
    /// client can flip status without waiting for planning text.
    PlanningHeader,
    /// Planning prose.
    PlanningContent,
    /// Start of an action phase.
    ActionHeader,
    /// Reasoning text within an action step.
    ActionThought,
    /// A tool invocation; carries `tool_name` in metadata.
    ToolCall,
    /// End of an action phase.
    ActionFooter,
    /// The answer, streamed and then finalized.
    FinalAnswer,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageType::Separator => write!(f, "separator"),
            MessageType::PlanningHeader => write!(f, "planning_header"),
            MessageType::PlanningContent => write!(f, "planning_content"),
            MessageType::ActionHeader => write!(f, "action_header"),
            MessageType::ActionThought => write!(f, "action_thought"),
            MessageType::ToolCall => write!(f, "tool_call"),
            MessageType::ActionFooter => write!(f, "action_footer"),
            MessageType::FinalAnswer => write!(f, "final_answer"),
        }
    }
}

/// Message originator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Metadata carried by every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    pub message_type: MessageType,
    /// True while content is still being appended for this step.
    pub streaming: bool,
    /// True if this is an incremental fragment rather than authoritative
    /// full content.
    pub is_delta: bool,
    /// Status in force at emission time.
    pub agent_status: AgentStatus,
    /// True exactly once per run, on the terminal message.
    pub is_final_answer: bool,
    /// Canonical tool identifier; only on `tool_call` messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    /// True when `content` is a serialized structured object rather than
    /// plain prose.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_structured_data: Option<bool>,
}

impl MessageMetadata {
    pub fn new(message_type: MessageType, agent_status: AgentStatus) -> Self {
        Self {
            message_type,
            streaming: false,
            is_delta: false,
            agent_status,
            is_final_answer: false,
            tool_name: None,
            has_structured_data: None,
        }
    }
}

/// The unit of communication delivered to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub step_number: u64,
    pub metadata: MessageMetadata,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build an assistant message, stamping id and timestamp at emission time.
    pub fn assistant(
        session_id: impl Into<String>,
        step_number: u64,
        content: impl Into<String>,
        metadata: MessageMetadata,
    ) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role: Role::Assistant,
            content: content.into(),
            step_number,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Build the user message that originates a run.
    ///
    /// The type vocabulary has no query kind, so the user message carries
    /// `action_thought`, the generic content type; clients key on
    /// `Role::User`. The planning header itself arrives as its own
    /// assistant message once the run starts planning.
    pub fn user(session_id: impl Into<String>, query: impl Into<String>, status: AgentStatus) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role: Role::User,
            content: query.into(),
            step_number: 0,
            metadata: MessageMetadata::new(MessageType::ActionThought, status),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_status_round_trip() {
        for status in [
            AgentStatus::Standby,
            AgentStatus::Loading,
            AgentStatus::InitialPlanning,
            AgentStatus::UpdatePlanning,
            AgentStatus::Thinking,
            AgentStatus::Coding,
            AgentStatus::ActionsRunning,
            AgentStatus::Writing,
        ] {
            assert_eq!(status.to_string().parse::<AgentStatus>().unwrap(), status);
        }
        assert!("invalid".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn test_message_wire_shape() {
        let mut metadata = MessageMetadata::new(MessageType::ToolCall, AgentStatus::ActionsRunning);
        metadata.tool_name = Some("web_search".to_string());
        let msg = Message::assistant("sess-1", 3, "searching", metadata);

        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["session_id"], "sess-1");
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["step_number"], 3);
        assert_eq!(value["metadata"]["message_type"], "tool_call");
        assert_eq!(value["metadata"]["agent_status"], "actions_running");
        assert_eq!(value["metadata"]["tool_name"], "web_search");
        // absent optionals are omitted, not null
        assert!(value["metadata"].get("has_structured_data").is_none());
        // RFC 3339 timestamp
        assert!(value["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_user_message_carries_generic_content_type() {
        let msg = Message::user("sess-1", "What is 2+2?", AgentStatus::InitialPlanning);
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.metadata.message_type, MessageType::ActionThought);
        assert_eq!(msg.metadata.agent_status, AgentStatus::InitialPlanning);
        assert!(!msg.metadata.is_delta);
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&AgentStatus::InitialPlanning).unwrap();
        assert_eq!(json, "\"initial_planning\"");
    }
}
