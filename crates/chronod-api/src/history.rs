//! In-memory ring of recent executions per job.
//!
//! Populated by subscribing to terminal events on the bus; capped per
//! job, newest first. History does not survive restarts.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

use chronod_core::EventBus;
use chronod_core::event::Subscription;
use chronod_types::event::ExecutionEvent;
use chronod_types::execution::{ExecutionError, RunStatus};

/// Default per-job history cap.
pub const DEFAULT_LIMIT: usize = 50;

/// One settled run, as served by `/api/jobs/:id/runs`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration: u64,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl RunEntry {
    /// Build an entry from a terminal event. Start and retry events
    /// return `None`.
    fn from_terminal(event: &ExecutionEvent) -> Option<RunEntry> {
        let (status, duration, error) = match event {
            ExecutionEvent::Success { duration, .. } => (RunStatus::Success, *duration, None),
            ExecutionEvent::Failure {
                duration, error, ..
            } => (RunStatus::Failure, *duration, Some(error.clone())),
            ExecutionEvent::Timeout {
                duration, error, ..
            } => (RunStatus::Timeout, *duration, Some(error.clone())),
            ExecutionEvent::Start { .. } | ExecutionEvent::Retry { .. } => return None,
        };
        let completed_at = event.timestamp();
        Some(RunEntry {
            run_id: event.run_id().to_string(),
            status,
            started_at: completed_at - Duration::milliseconds(duration as i64),
            completed_at,
            duration,
            attempt: event.attempt(),
            error,
        })
    }
}

/// Newest-first per-job execution history.
pub struct RunHistory {
    per_job: DashMap<String, VecDeque<RunEntry>>,
    limit: usize,
}

impl RunHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            per_job: DashMap::new(),
            limit,
        }
    }

    /// Subscribe to terminal events on `bus`. The returned subscription
    /// must be kept alive as long as history should accumulate.
    pub fn attach(history: &Arc<Self>, bus: &EventBus) -> Subscription {
        let history = history.clone();
        bus.on_any(move |event| {
            if let Some(entry) = RunEntry::from_terminal(event) {
                history.record(event.job_id(), entry);
            }
        })
    }

    pub fn record(&self, job_id: &str, entry: RunEntry) {
        let mut runs = self.per_job.entry(job_id.to_string()).or_default();
        runs.push_front(entry);
        runs.truncate(self.limit);
    }

    /// All retained runs for a job, newest first.
    pub fn runs(&self, job_id: &str) -> Vec<RunEntry> {
        self.per_job
            .get(job_id)
            .map(|runs| runs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The most recently settled run for a job.
    pub fn latest(&self, job_id: &str) -> Option<RunEntry> {
        self.per_job
            .get(job_id)
            .and_then(|runs| runs.front().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success_event(job_id: &str, run_id: &str, duration: u64) -> ExecutionEvent {
        ExecutionEvent::Success {
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            attempt: 1,
            duration,
        }
    }

    #[test]
    fn terminal_events_become_entries() {
        let failure = ExecutionEvent::Failure {
            job_id: "a".to_string(),
            run_id: "run_1_xxxxxxxxx".to_string(),
            timestamp: Utc::now(),
            attempt: 2,
            duration: 120,
            error: ExecutionError::new("boom"),
        };
        let entry = RunEntry::from_terminal(&failure).unwrap();
        assert_eq!(entry.status, RunStatus::Failure);
        assert_eq!(entry.attempt, 2);
        assert_eq!(entry.duration, 120);
        assert_eq!(
            (entry.completed_at - entry.started_at).num_milliseconds(),
            120
        );

        let start = ExecutionEvent::Start {
            job_id: "a".to_string(),
            run_id: "run_1_xxxxxxxxx".to_string(),
            timestamp: Utc::now(),
            attempt: 1,
        };
        assert!(RunEntry::from_terminal(&start).is_none());
    }

    #[test]
    fn ring_is_newest_first_and_capped() {
        let history = RunHistory::new(3);
        for n in 0..5 {
            let entry =
                RunEntry::from_terminal(&success_event("a", &format!("run_{n}_xxxxxxxxx"), 10))
                    .unwrap();
            history.record("a", entry);
        }

        let runs = history.runs("a");
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[0].run_id, "run_4_xxxxxxxxx");
        assert_eq!(runs[2].run_id, "run_2_xxxxxxxxx");
        assert_eq!(history.latest("a").unwrap().run_id, "run_4_xxxxxxxxx");
    }

    #[test]
    fn attach_records_from_bus_events() {
        let bus = EventBus::new();
        let history = Arc::new(RunHistory::new(DEFAULT_LIMIT));
        let _sub = RunHistory::attach(&history, &bus);

        bus.emit(&success_event("a", "run_1_xxxxxxxxx", 10));
        bus.emit(&ExecutionEvent::Start {
            job_id: "a".to_string(),
            run_id: "run_2_xxxxxxxxx".to_string(),
            timestamp: Utc::now(),
            attempt: 1,
        });

        assert_eq!(history.runs("a").len(), 1);
        assert!(history.runs("other").is_empty());
        assert!(history.latest("other").is_none());
    }
}
