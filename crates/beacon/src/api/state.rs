//! Application state shared across handlers.

use std::sync::Arc;

use crate::runtime::AgentRuntime;
use crate::settings::Settings;
use crate::stream::StreamCoordinator;

/// Shared state for HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<StreamCoordinator>,
    pub runtime: Arc<dyn AgentRuntime>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<StreamCoordinator>,
        runtime: Arc<dyn AgentRuntime>,
        settings: Settings,
    ) -> Self {
        Self {
            coordinator,
            runtime,
            settings: Arc::new(settings),
        }
    }
}
