//! Session data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::AgentStatus;

/// One agent run's bookkeeping record.
///
/// The record mirrors what the status tracker decided; the tracker is the
/// authority, the record is what snapshots and side effects read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Identifies the owning agent run; immutable for the session lifetime.
    pub session_id: String,
    /// Current value of `agent_status`.
    pub current_status: AgentStatus,
    /// When `current_status` was entered.
    pub status_entered_at: DateTime<Utc>,
    /// When the last event was processed.
    pub last_event_at: DateTime<Utc>,
    /// True between query receipt and final answer or error.
    pub active: bool,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            current_status: AgentStatus::Standby,
            status_entered_at: now,
            last_event_at: now,
            active: false,
            created_at: now,
        }
    }
}

/// Session state as served to reconnecting clients, including publish
/// accounting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub session: Session,
    /// Publishes dropped because the subscription was cancelled.
    pub dropped_after_cancel: u64,
    /// Events that arrived after the run completed.
    pub out_of_order_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_standby_and_inactive() {
        let session = Session::new("sess-1");
        assert_eq!(session.current_status, AgentStatus::Standby);
        assert!(!session.active);
    }

    #[test]
    fn test_snapshot_flattens_session_fields() {
        let snapshot = SessionSnapshot {
            session: Session::new("sess-1"),
            dropped_after_cancel: 2,
            out_of_order_events: 1,
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["session_id"], "sess-1");
        assert_eq!(value["current_status"], "standby");
        assert_eq!(value["dropped_after_cancel"], 2);
        assert_eq!(value["out_of_order_events"], 1);
    }
}
