//! Agent status derivation.
//!
//! One state machine per session turns the storm of classified events into a
//! single `agent_status` value. The rules here exist to keep that signal
//! honest: structural noise never flips the status, `standby` is only ever
//! reached through a terminal event while the run is active, and repeated
//! targets are swallowed so deltas do not churn the status.

use chrono::{DateTime, Utc};
use log::debug;

use crate::classify::{Classified, ToolKind};
use crate::message::{AgentStatus, MessageType};

/// A committed status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: AgentStatus,
    pub to: AgentStatus,
    pub at: DateTime<Utc>,
}

/// Per-session status state machine.
#[derive(Debug)]
pub struct StatusTracker {
    status: AgentStatus,
    entered_at: DateTime<Utc>,
    active: bool,
    runs_started: u32,
    outstanding_tools: u32,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self {
            status: AgentStatus::Standby,
            entered_at: Utc::now(),
            active: false,
            runs_started: 0,
            outstanding_tools: 0,
        }
    }

    pub fn status(&self) -> AgentStatus {
        self.status
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// New query received: the session goes active and enters planning.
    /// The first run of a session plans from scratch; later runs re-plan
    /// against existing history.
    pub fn on_query(&mut self) -> Option<StatusChange> {
        self.runs_started += 1;
        self.active = true;
        self.transition(self.planning_target())
    }

    /// Apply a classified event. Returns the transition it caused, if any.
    ///
    /// Events for an inactive session are accepted but never reactivate it;
    /// the caller records them as out-of-order.
    pub fn on_event(&mut self, classified: &Classified) -> Option<StatusChange> {
        if !self.active {
            return None;
        }

        // Terminal events are the only path back to standby while active.
        if classified.completion || classified.final_answer {
            self.active = false;
            self.outstanding_tools = 0;
            return self.transition(AgentStatus::Standby);
        }

        if classified.structural {
            // A closed action phase leaves no tools outstanding, but the
            // footer itself never drives a transition.
            if classified.message_type == MessageType::ActionFooter {
                self.outstanding_tools = 0;
            }
            return None;
        }

        match classified.message_type {
            MessageType::PlanningHeader | MessageType::PlanningContent => {
                self.transition(self.planning_target())
            }
            MessageType::ActionThought => {
                if self.outstanding_tools > 0 {
                    self.transition(AgentStatus::ActionsRunning)
                } else {
                    self.transition(AgentStatus::Thinking)
                }
            }
            MessageType::ToolCall => match classified.tool_kind {
                Some(ToolKind::Code) => self.transition(AgentStatus::Coding),
                _ => {
                    self.outstanding_tools += 1;
                    self.transition(AgentStatus::ActionsRunning)
                }
            },
            MessageType::FinalAnswer => self.transition(AgentStatus::Writing),
            // Structural types were handled above.
            MessageType::Separator | MessageType::ActionHeader | MessageType::ActionFooter => None,
        }
    }

    /// The idle-gap timer fired: show `loading` rather than implying the
    /// agent is idle while work is still in flight.
    pub fn on_gap(&mut self) -> Option<StatusChange> {
        if !self.active || self.status == AgentStatus::Standby {
            return None;
        }
        self.transition(AgentStatus::Loading)
    }

    fn planning_target(&self) -> AgentStatus {
        if self.runs_started <= 1 {
            AgentStatus::InitialPlanning
        } else {
            AgentStatus::UpdatePlanning
        }
    }

    fn transition(&mut self, to: AgentStatus) -> Option<StatusChange> {
        if to == self.status {
            return None;
        }
        let change = StatusChange {
            from: self.status,
            to,
            at: Utc::now(),
        };
        debug!("status {} -> {}", change.from, change.to);
        self.status = to;
        self.entered_at = change.at;
        Some(change)
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
