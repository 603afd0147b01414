//! Shared application state for the dashboard API.

use std::sync::Arc;
use std::time::Instant;

use chronod_core::event::Subscription;
use chronod_core::{EventBus, JobRegistry, Worker};

use crate::history::RunHistory;

/// Cloned into every handler. All fields are cheap shared handles.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<JobRegistry>,
    pub worker: Arc<Worker>,
    pub bus: Arc<EventBus>,
    pub history: Arc<RunHistory>,
    pub started_at: Instant,
    /// Keeps the history ring subscribed to the bus.
    _history_subscription: Arc<Subscription>,
}

impl AppState {
    pub fn new(
        registry: Arc<JobRegistry>,
        worker: Arc<Worker>,
        bus: Arc<EventBus>,
        history_limit: usize,
    ) -> Self {
        let history = Arc::new(RunHistory::new(history_limit));
        let subscription = RunHistory::attach(&history, &bus);
        Self {
            registry,
            worker,
            bus,
            history,
            started_at: Instant::now(),
            _history_subscription: Arc::new(subscription),
        }
    }
}
