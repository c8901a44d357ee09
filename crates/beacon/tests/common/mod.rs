//! Shared helpers for integration tests.

use std::sync::Arc;
use std::time::Duration;

use beacon::event::{EventPayload, StepEvent};
use beacon::message::Message;
use beacon::settings::StreamSettings;
use beacon::stream::{StreamCoordinator, Subscription};

/// Coordinator with a gap threshold large enough to never fire in tests
/// that are not about the gap rule.
pub fn coordinator() -> Arc<StreamCoordinator> {
    coordinator_with_gap(60_000)
}

pub fn coordinator_with_gap(gap_threshold_ms: u64) -> Arc<StreamCoordinator> {
    StreamCoordinator::new(StreamSettings {
        gap_threshold_ms,
        coding_tools: vec!["python_interpreter".to_string()],
    })
}

pub fn thought(step: u64, text: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::Thought {
            text: text.to_string(),
            delta: false,
        },
    )
}

pub fn thought_delta(step: u64, text: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::Thought {
            text: text.to_string(),
            delta: true,
        },
    )
}

pub fn answer_delta(step: u64, text: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::AnswerDelta {
            text: text.to_string(),
        },
    )
}

pub fn answer(step: u64, text: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::Answer {
            text: text.to_string(),
            structured: false,
        },
    )
}

pub fn phase(step: u64, marker: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::Phase {
            marker: marker.to_string(),
        },
    )
}

pub fn tool_call(step: u64, name: &str, args: &str) -> StepEvent {
    StepEvent::new(
        step,
        EventPayload::ToolCall {
            tool_name: name.to_string(),
            args_summary: args.to_string(),
        },
    )
}

/// Receive the next message or panic after a short deadline, so a missing
/// delivery fails the test instead of hanging it.
pub async fn recv(subscription: &mut Subscription) -> Message {
    tokio::time::timeout(Duration::from_secs(2), subscription.recv())
        .await
        .expect("timed out waiting for message")
        .expect("subscription closed unexpectedly")
}
