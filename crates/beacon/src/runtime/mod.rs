//! Agent-runtime collaborator seam.
//!
//! The real runtime (model calls, tool execution) lives outside this
//! service; it drives runs by publishing step events through the
//! coordinator. `ScriptedRuntime` replays a deterministic script so the
//! full socket-to-stream path works without a model behind it.

use std::sync::Arc;

use async_trait::async_trait;
use log::warn;
use tokio::time::Duration;

use crate::event::{EventPayload, StepEvent};
use crate::stream::StreamCoordinator;

/// Drives one agent run by publishing raw step events.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn run(
        &self,
        coordinator: Arc<StreamCoordinator>,
        session_id: &str,
        query: &str,
    ) -> anyhow::Result<()>;
}

type ScriptFn = dyn Fn(&str) -> Vec<StepEvent> + Send + Sync;

/// Replays a fixed event script per query.
pub struct ScriptedRuntime {
    script: Box<ScriptFn>,
    pause: Duration,
}

impl ScriptedRuntime {
    pub fn new(script: impl Fn(&str) -> Vec<StepEvent> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            pause: Duration::ZERO,
        }
    }

    /// Sleep between events, to make streaming visible in a demo client.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// A canned run: plan, think, stream an answer echoing the query.
    pub fn echo() -> Self {
        Self::new(|query| {
            let query = query.to_string();
            vec![
                StepEvent::new(
                    0,
                    EventPayload::Phase {
                        marker: "planning_start".to_string(),
                    },
                ),
                StepEvent::new(
                    0,
                    EventPayload::Planning {
                        text: "I will answer this directly.".to_string(),
                        delta: false,
                    },
                ),
                StepEvent::new(
                    0,
                    EventPayload::Phase {
                        marker: "planning_end".to_string(),
                    },
                ),
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: String::new(),
                        delta: true,
                    },
                ),
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "Composing a reply.".to_string(),
                        delta: true,
                    },
                ),
                StepEvent::new(2, EventPayload::AnswerDelta { text: "You asked: ".to_string() }),
                StepEvent::new(2, EventPayload::AnswerDelta { text: query.clone() }),
                StepEvent::new(
                    2,
                    EventPayload::Answer {
                        text: format!("You asked: {}", query),
                        structured: false,
                    },
                ),
                StepEvent::new(2, EventPayload::Completed),
            ]
        })
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn run(
        &self,
        coordinator: Arc<StreamCoordinator>,
        session_id: &str,
        query: &str,
    ) -> anyhow::Result<()> {
        for event in (self.script)(query) {
            if self.pause > Duration::ZERO {
                tokio::time::sleep(self.pause).await;
            }
            // Merge errors are internal bug signals; the run keeps going.
            if let Err(e) = coordinator.publish(session_id, event).await {
                warn!("publish failed for session {}: {}", session_id, e);
            }
        }
        Ok(())
    }
}
