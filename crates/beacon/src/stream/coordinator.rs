//! Stream coordinator: session registry and the publish pipeline.
//!
//! Each published event runs Classifier -> Merger -> Status Tracker ->
//! emission under the session's mutex, so emission order exactly matches
//! processing order and no two publishes for one session ever interleave.
//! Sessions are independent; the registry is the only process-wide state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::classify::Classifier;
use crate::event::StepEvent;
use crate::merge::{DeltaMerger, MergeError};
use crate::message::{Message, MessageMetadata, MessageType};
use crate::session::{Session, SessionSnapshot};
use crate::settings::StreamSettings;
use crate::status::{StatusChange, StatusTracker};

/// Size of the per-subscription send buffer.
const SUBSCRIBER_BUFFER_SIZE: usize = 64;

/// Publish pipeline errors. Merge errors are surfaced to the caller; the
/// run continues.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Merge(#[from] MergeError),
}

/// What happened to a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Emitted to the subscriber.
    Delivered,
    /// Structural or empty; filtered before the transport.
    Filtered,
    /// Not delivered: subscription cancelled, closed, or absent. Session
    /// state was still updated where applicable.
    Dropped,
}

/// A cancellable handle on a session's ordered message stream.
///
/// Cancelling stops delivery only; the underlying run is unaffected and
/// cancellation is safe concurrently with an in-flight publish.
pub struct Subscription {
    receiver: mpsc::Receiver<Message>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Receive the next message, or `None` once cancelled or closed.
    pub async fn recv(&mut self) -> Option<Message> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            msg = self.receiver.recv() => msg,
        }
    }

    /// Non-blocking receive for drain loops.
    pub fn try_recv(&mut self) -> Option<Message> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct SessionInner {
    session: Session,
    tracker: StatusTracker,
    merger: DeltaMerger,
    sender: Option<mpsc::Sender<Message>>,
    cancel: CancellationToken,
    /// Steps for which a thought placeholder has already gone out.
    seen_thought_steps: HashSet<u64>,
    /// Message type each open delta buffer was streamed as.
    open_types: HashMap<u64, MessageType>,
    /// Highest step observed; synthetic status messages reuse it.
    last_step: u64,
    /// Timer basis for gap detection.
    last_event: Instant,
    final_sent: bool,
    dropped_after_cancel: u64,
    out_of_order: u64,
}

impl SessionInner {
    fn new(session_id: &str) -> Self {
        Self {
            session: Session::new(session_id),
            tracker: StatusTracker::new(),
            merger: DeltaMerger::new(),
            sender: None,
            cancel: CancellationToken::new(),
            seen_thought_steps: HashSet::new(),
            open_types: HashMap::new(),
            last_step: 0,
            last_event: Instant::now(),
            final_sent: false,
            dropped_after_cancel: 0,
            out_of_order: 0,
        }
    }

    fn apply_change(&mut self, change: StatusChange) {
        self.session.current_status = change.to;
        self.session.status_entered_at = change.at;
        self.session.active = self.tracker.active();
    }

    fn touch(&mut self, step: u64) {
        self.session.last_event_at = Utc::now();
        self.last_event = Instant::now();
        self.last_step = self.last_step.max(step);
    }

    /// Send to the subscriber. A closed receiver means the transport went
    /// away: delivery stops for this session, nothing is raised upward.
    async fn deliver(&mut self, message: Message) -> PublishOutcome {
        let Some(sender) = &self.sender else {
            return PublishOutcome::Dropped;
        };
        if sender.send(message).await.is_err() {
            debug!(
                "transport disconnected for session {}, stopping delivery",
                self.session.session_id
            );
            self.sender = None;
            self.cancel.cancel();
            return PublishOutcome::Dropped;
        }
        PublishOutcome::Delivered
    }
}

struct SessionHandle {
    inner: Mutex<SessionInner>,
    /// Stops the session's gap watcher.
    closed: CancellationToken,
}

/// Orchestrates per-session delivery for all sessions in the process.
pub struct StreamCoordinator {
    sessions: DashMap<String, Arc<SessionHandle>>,
    classifier: Classifier,
    settings: StreamSettings,
}

impl StreamCoordinator {
    pub fn new(settings: StreamSettings) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            classifier: Classifier::new(&settings.coding_tools),
            settings,
        })
    }

    /// Subscribe to a session's ordered message stream, creating the
    /// session if needed. A new subscription replaces the previous one.
    pub async fn subscribe(self: &Arc<Self>, session_id: &str) -> Subscription {
        let handle = self.ensure_session(session_id);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER_SIZE);
        let cancel = CancellationToken::new();

        let mut inner = handle.inner.lock().await;
        inner.sender = Some(tx);
        inner.cancel = cancel.clone();
        info!("subscribed to session {}", session_id);

        Subscription {
            receiver: rx,
            cancel,
        }
    }

    /// Start (or continue) a run with a new user query. Emits the user
    /// message and flips the session into planning.
    pub async fn begin_query(self: &Arc<Self>, session_id: &str, query: &str) -> Message {
        let handle = self.ensure_session(session_id);
        let mut inner = handle.inner.lock().await;

        // Fresh run: step numbering and delta buffers restart.
        inner.merger = DeltaMerger::new();
        inner.open_types.clear();
        inner.seen_thought_steps.clear();
        inner.final_sent = false;

        if let Some(change) = inner.tracker.on_query() {
            inner.apply_change(change);
        }
        inner.session.active = true;
        inner.touch(0);

        let message = Message::user(session_id, query, inner.tracker.status());
        inner.deliver(message.clone()).await;
        message
    }

    /// Accept a raw agent-step event and drive it through classification,
    /// merging, status derivation, and emission, in that order.
    pub async fn publish(
        &self,
        session_id: &str,
        event: StepEvent,
    ) -> Result<PublishOutcome, PublishError> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PublishError::SessionNotFound(session_id.to_string()))?;

        let mut inner = handle.inner.lock().await;

        if inner.cancel.is_cancelled() {
            inner.dropped_after_cancel += 1;
            debug!(
                "publish on cancelled session {} dropped ({} so far)",
                session_id, inner.dropped_after_cancel
            );
            return Ok(PublishOutcome::Dropped);
        }

        let mut classified = self.classifier.classify(&event);

        let was_active = inner.tracker.active();
        if !was_active && !classified.structural {
            inner.out_of_order += 1;
            warn!(
                "out-of-order event for completed session {} at step {}",
                session_id, event.step
            );
        }

        // Merge: deltas grow the step buffer and carry the accumulated
        // content; authoritative content closes it. The buffer stands in
        // for a missing body only when the types agree, so an unrelated
        // event at the same step never inherits streamed text.
        if classified.delta {
            classified.content = inner.merger.append(event.step, &classified.content)?;
            inner
                .open_types
                .entry(event.step)
                .or_insert(classified.message_type);
        } else if !classified.structural && inner.merger.has_buffer(event.step) {
            let merged = inner.merger.finalize(event.step)?;
            let streamed_as = inner.open_types.remove(&event.step);
            if classified.content.trim().is_empty() && streamed_as == Some(classified.message_type)
            {
                classified.content = merged;
            }
        }

        // The very first thought for a step goes out even when empty, so
        // the client can leave its idle indicator immediately.
        let first_thought = classified.message_type == MessageType::ActionThought
            && !classified.structural
            && inner.seen_thought_steps.insert(event.step);

        let change = inner.tracker.on_event(&classified);
        if let Some(change) = change {
            inner.apply_change(change);
        }
        inner.touch(event.step);

        if classified.is_droppable() && !first_thought {
            // A bare completion marker is filtered, but the standby
            // transition it caused still has to reach the client.
            if classified.completion && change.is_some() {
                let mut metadata =
                    MessageMetadata::new(MessageType::ActionThought, inner.tracker.status());
                metadata.streaming = false;
                let message = Message::assistant(session_id, event.step, "", metadata);
                return Ok(inner.deliver(message).await);
            }
            return Ok(PublishOutcome::Filtered);
        }

        let is_final = classified.final_answer && was_active && !inner.final_sent;
        if is_final {
            inner.final_sent = true;
        }

        let mut metadata = MessageMetadata::new(classified.message_type, inner.tracker.status());
        metadata.streaming = classified.streaming;
        metadata.is_delta = classified.delta;
        metadata.is_final_answer = is_final;
        metadata.tool_name = classified.tool_name.clone();
        metadata.has_structured_data = classified.structured.then_some(true);

        let message = Message::assistant(session_id, event.step, classified.content, metadata);
        Ok(inner.deliver(message).await)
    }

    /// Current session state for reconnecting clients.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionSnapshot> {
        let handle = self
            .sessions
            .get(session_id)
            .map(|entry| entry.value().clone())?;
        let inner = handle.inner.lock().await;
        Some(SessionSnapshot {
            session: inner.session.clone(),
            dropped_after_cancel: inner.dropped_after_cancel,
            out_of_order_events: inner.out_of_order,
        })
    }

    /// Tear down one session: drop it from the registry, stop its gap
    /// watcher, and cancel delivery. Later publishes for the id get
    /// `SessionNotFound`. Called when the owning transport goes away.
    pub async fn close_session(&self, session_id: &str) {
        let Some((_, handle)) = self.sessions.remove(session_id) else {
            return;
        };
        handle.closed.cancel();
        let mut inner = handle.inner.lock().await;
        inner.cancel.cancel();
        inner.sender = None;
        info!("closed session {}", session_id);
    }

    /// Stop all gap watchers. Used on server shutdown.
    pub fn shutdown(&self) {
        for entry in self.sessions.iter() {
            entry.value().closed.cancel();
        }
    }

    fn ensure_session(self: &Arc<Self>, session_id: &str) -> Arc<SessionHandle> {
        match self.sessions.entry(session_id.to_string()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let handle = Arc::new(SessionHandle {
                    inner: Mutex::new(SessionInner::new(session_id)),
                    closed: CancellationToken::new(),
                });
                entry.insert(handle.clone());
                info!("created session {}", session_id);

                let threshold = Duration::from_millis(self.settings.gap_threshold_ms);
                tokio::spawn(Self::gap_watcher(
                    session_id.to_string(),
                    handle.clone(),
                    threshold,
                ));
                handle
            }
        }
    }

    /// Per-session deadline task for the idle-gap rule. The firing is
    /// serialized through the same session mutex as publishes.
    async fn gap_watcher(session_id: String, handle: Arc<SessionHandle>, threshold: Duration) {
        loop {
            let deadline = {
                let inner = handle.inner.lock().await;
                inner.last_event + threshold
            };
            tokio::select! {
                _ = handle.closed.cancelled() => break,
                _ = tokio::time::sleep_until(deadline) => {}
            }

            let mut inner = handle.inner.lock().await;
            if inner.last_event + threshold > Instant::now() {
                // a real event arrived while we slept
                continue;
            }
            let Some(change) = inner.tracker.on_gap() else {
                // idle session or already loading; re-arm from now
                inner.last_event = Instant::now();
                continue;
            };
            inner.apply_change(change);
            inner.last_event = Instant::now();
            debug!("session {} idle past threshold, showing loading", session_id);

            // Synthetic status-only message so the client learns about the
            // transition without waiting for the next real event.
            let mut metadata =
                MessageMetadata::new(MessageType::ActionThought, inner.tracker.status());
            metadata.streaming = true;
            let step = inner.last_step;
            let message = Message::assistant(session_id.as_str(), step, "", metadata);
            inner.deliver(message).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;

    fn test_settings() -> StreamSettings {
        StreamSettings {
            gap_threshold_ms: 60_000,
            coding_tools: vec!["python_interpreter".to_string()],
        }
    }

    #[tokio::test]
    async fn test_publish_unknown_session_is_an_error() {
        let coordinator = StreamCoordinator::new(test_settings());
        let result = coordinator
            .publish(
                "missing",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "hi".to_string(),
                        delta: false,
                    },
                ),
            )
            .await;
        assert!(matches!(result, Err(PublishError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_publish_after_cancel_is_recorded_noop() {
        let coordinator = StreamCoordinator::new(test_settings());
        let subscription = coordinator.subscribe("sess").await;
        coordinator.begin_query("sess", "q").await;
        subscription.cancel();

        let outcome = coordinator
            .publish(
                "sess",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "dropped".to_string(),
                        delta: false,
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Dropped);

        let snapshot = coordinator.snapshot("sess").await.unwrap();
        assert_eq!(snapshot.dropped_after_cancel, 1);
    }

    #[tokio::test]
    async fn test_close_session_removes_it_from_the_registry() {
        let coordinator = StreamCoordinator::new(test_settings());
        let subscription = coordinator.subscribe("sess").await;
        coordinator.begin_query("sess", "q").await;

        coordinator.close_session("sess").await;

        assert!(coordinator.snapshot("sess").await.is_none());
        assert!(subscription.cancel_token().is_cancelled());

        let result = coordinator
            .publish(
                "sess",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "late".to_string(),
                        delta: false,
                    },
                ),
            )
            .await;
        assert!(matches!(result, Err(PublishError::SessionNotFound(_))));
    }

    #[tokio::test]
    async fn test_stale_delta_surfaces_but_run_continues() {
        let coordinator = StreamCoordinator::new(test_settings());
        let mut subscription = coordinator.subscribe("sess").await;
        coordinator.begin_query("sess", "q").await;
        let _ = subscription.recv().await; // user message

        coordinator
            .publish(
                "sess",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "a".to_string(),
                        delta: true,
                    },
                ),
            )
            .await
            .unwrap();
        coordinator
            .publish(
                "sess",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "done".to_string(),
                        delta: false,
                    },
                ),
            )
            .await
            .unwrap();

        let result = coordinator
            .publish(
                "sess",
                StepEvent::new(
                    1,
                    EventPayload::Thought {
                        text: "late delta".to_string(),
                        delta: true,
                    },
                ),
            )
            .await;
        assert!(matches!(
            result,
            Err(PublishError::Merge(MergeError::StaleDelta { step: 1 }))
        ));

        // the run is not poisoned
        let outcome = coordinator
            .publish(
                "sess",
                StepEvent::new(
                    2,
                    EventPayload::Thought {
                        text: "next step".to_string(),
                        delta: false,
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(outcome, PublishOutcome::Delivered);
    }
}
