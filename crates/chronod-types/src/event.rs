//! Execution lifecycle events.
//!
//! `ExecutionEvent` is the unified event type emitted by the execution
//! engine and distributed over the event bus. The serialized form is
//! streamed verbatim to dashboard clients, so field names are camelCase
//! and the tag carries the `job:` prefix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::ExecutionError;

/// Event type tags, used as event-bus subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "job:start")]
    Start,
    #[serde(rename = "job:retry")]
    Retry,
    #[serde(rename = "job:success")]
    Success,
    #[serde(rename = "job:failure")]
    Failure,
    #[serde(rename = "job:timeout")]
    Timeout,
}

impl EventKind {
    /// The kinds that settle a run.
    pub const TERMINAL: [EventKind; 3] =
        [EventKind::Success, EventKind::Failure, EventKind::Timeout];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventKind::Start => "job:start",
            EventKind::Retry => "job:retry",
            EventKind::Success => "job:success",
            EventKind::Failure => "job:failure",
            EventKind::Timeout => "job:timeout",
        };
        f.write_str(s)
    }
}

/// Events emitted during a run.
///
/// For any single run the sequence is `Start (Retry)* (Success | Failure
/// | Timeout)`; the attempt number on `Retry` is the attempt that just
/// failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    #[serde(rename = "job:start", rename_all = "camelCase")]
    Start {
        job_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
        attempt: u32,
    },

    #[serde(rename = "job:retry", rename_all = "camelCase")]
    Retry {
        job_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
        /// The attempt that just failed.
        attempt: u32,
        error: ExecutionError,
    },

    #[serde(rename = "job:success", rename_all = "camelCase")]
    Success {
        job_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
        attempt: u32,
        /// Run duration in milliseconds.
        duration: u64,
    },

    #[serde(rename = "job:failure", rename_all = "camelCase")]
    Failure {
        job_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
        attempt: u32,
        duration: u64,
        error: ExecutionError,
    },

    #[serde(rename = "job:timeout", rename_all = "camelCase")]
    Timeout {
        job_id: String,
        run_id: String,
        timestamp: DateTime<Utc>,
        attempt: u32,
        duration: u64,
        error: ExecutionError,
    },
}

impl ExecutionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ExecutionEvent::Start { .. } => EventKind::Start,
            ExecutionEvent::Retry { .. } => EventKind::Retry,
            ExecutionEvent::Success { .. } => EventKind::Success,
            ExecutionEvent::Failure { .. } => EventKind::Failure,
            ExecutionEvent::Timeout { .. } => EventKind::Timeout,
        }
    }

    pub fn job_id(&self) -> &str {
        match self {
            ExecutionEvent::Start { job_id, .. }
            | ExecutionEvent::Retry { job_id, .. }
            | ExecutionEvent::Success { job_id, .. }
            | ExecutionEvent::Failure { job_id, .. }
            | ExecutionEvent::Timeout { job_id, .. } => job_id,
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            ExecutionEvent::Start { run_id, .. }
            | ExecutionEvent::Retry { run_id, .. }
            | ExecutionEvent::Success { run_id, .. }
            | ExecutionEvent::Failure { run_id, .. }
            | ExecutionEvent::Timeout { run_id, .. } => run_id,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::Start { timestamp, .. }
            | ExecutionEvent::Retry { timestamp, .. }
            | ExecutionEvent::Success { timestamp, .. }
            | ExecutionEvent::Failure { timestamp, .. }
            | ExecutionEvent::Timeout { timestamp, .. } => *timestamp,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            ExecutionEvent::Start { attempt, .. }
            | ExecutionEvent::Retry { attempt, .. }
            | ExecutionEvent::Success { attempt, .. }
            | ExecutionEvent::Failure { attempt, .. }
            | ExecutionEvent::Timeout { attempt, .. } => *attempt,
        }
    }
}
