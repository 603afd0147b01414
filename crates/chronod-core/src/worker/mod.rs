//! Scheduler worker: binds jobs to cron triggers, tracks in-flight
//! runs, and performs bounded graceful shutdown.
//!
//! Each job gets its own trigger task that sleeps until the next
//! occurrence and fires the execution engine. `stop` aborts trigger
//! tasks but never cancels in-flight runs; `shutdown` additionally
//! waits for in-flight runs up to a deadline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use chronod_types::error::{ScheduleError, WorkerError};
use chronod_types::execution::{ExecutionError, ExecutionResult, RunStatus};

use crate::engine::{ExecutionEngine, run_id};
use crate::job::JobRecord;
use crate::schedule::evaluator::CronEvaluator;

/// Default deadline for [`Worker::shutdown`].
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// What to do when a trigger fires while a previous run of the same job
/// is still in flight. The default lets fires overlap; the skip mode is
/// opt-in and every skipped fire is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapPolicy {
    #[default]
    Allow,
    SkipIfRunning,
}

/// Outcome of a graceful shutdown: run ids that settled before the
/// deadline and run ids still outstanding when it elapsed.
#[derive(Debug, Clone, Default)]
pub struct ShutdownReport {
    pub completed: Vec<String>,
    pub interrupted: Vec<String>,
}

struct JobEntry {
    record: Arc<JobRecord>,
    evaluator: Arc<CronEvaluator>,
    trigger: Mutex<Option<JoinHandle<()>>>,
}

impl JobEntry {
    fn stop_trigger(&self) {
        let handle = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

struct InFlightRun {
    job_id: String,
    settled: watch::Receiver<bool>,
}

/// The scheduler worker.
pub struct Worker {
    inner: Arc<WorkerInner>,
}

struct WorkerInner {
    engine: ExecutionEngine,
    jobs: DashMap<String, Arc<JobEntry>>,
    in_flight: DashMap<String, InFlightRun>,
    running: AtomicBool,
    shutting_down: AtomicBool,
    overlap: OverlapPolicy,
}

impl Worker {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self::with_overlap_policy(engine, OverlapPolicy::default())
    }

    pub fn with_overlap_policy(engine: ExecutionEngine, overlap: OverlapPolicy) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                engine,
                jobs: DashMap::new(),
                in_flight: DashMap::new(),
                running: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                overlap,
            }),
        }
    }

    /// Register (or replace) a job. The trigger starts paused unless the
    /// worker is running.
    pub fn add(&self, record: Arc<JobRecord>) -> Result<(), ScheduleError> {
        let evaluator = Arc::new(CronEvaluator::for_descriptor(&record.schedule)?);
        let job_id = record.id.clone();
        let entry = Arc::new(JobEntry {
            record,
            evaluator,
            trigger: Mutex::new(None),
        });

        if let Some(previous) = self.inner.jobs.insert(job_id.clone(), entry.clone()) {
            previous.stop_trigger();
        }
        if self.inner.running.load(Ordering::SeqCst) {
            WorkerInner::arm_trigger(&self.inner, &entry);
        }
        tracing::info!(%job_id, cron = %entry.evaluator.expression(), "job added to worker");
        Ok(())
    }

    /// Stop and detach a job's trigger. Returns whether it was present.
    pub fn remove(&self, job_id: &str) -> bool {
        match self.inner.jobs.remove(job_id) {
            Some((_, entry)) => {
                entry.stop_trigger();
                tracing::info!(%job_id, "job removed from worker");
                true
            }
            None => false,
        }
    }

    /// Resume all triggers.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in self.inner.jobs.iter() {
            WorkerInner::arm_trigger(&self.inner, entry.value());
        }
        tracing::info!(jobs = self.inner.jobs.len(), "worker started");
    }

    /// Pause all triggers. In-flight runs are not cancelled.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        for entry in self.inner.jobs.iter() {
            entry.value().stop_trigger();
        }
        tracing::info!("worker stopped");
    }

    /// Run a job through the engine, tracked in the in-flight table.
    /// During shutdown the fire is rejected with a synthetic failure.
    pub async fn execute_job(&self, record: Arc<JobRecord>) -> ExecutionResult {
        self.inner.execute(record, Utc::now()).await
    }

    /// Manual fire by id. Unknown ids surface to the caller; everything
    /// else behaves exactly like a trigger fire.
    pub async fn trigger(&self, job_id: &str) -> Result<ExecutionResult, WorkerError> {
        let record = self
            .inner
            .jobs
            .get(job_id)
            .map(|entry| entry.value().record.clone())
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;
        Ok(self.inner.execute(record, Utc::now()).await)
    }

    /// Next fire instant for a job, per its evaluator.
    pub fn get_next_run(&self, job_id: &str) -> Result<Option<DateTime<Utc>>, WorkerError> {
        let entry = self
            .inner
            .jobs
            .get(job_id)
            .ok_or_else(|| WorkerError::JobNotFound(job_id.to_string()))?;
        Ok(entry.value().evaluator.next_run(Utc::now()))
    }

    /// Whether any run of this job is currently in flight.
    pub fn is_job_running(&self, job_id: &str) -> bool {
        self.inner.job_running(job_id)
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Stop all triggers, then wait for in-flight runs up to `timeout`.
    ///
    /// A run that settles (success or failure) before the deadline lands
    /// in `completed`; anything still outstanding is `interrupted`. When
    /// the drain was clean the shutting-down flag is cleared so the
    /// worker can be restarted; with interrupted runs it stays set and
    /// late fires keep being rejected while the process exits.
    pub async fn shutdown(&self, timeout: Duration) -> ShutdownReport {
        self.inner.shutting_down.store(true, Ordering::SeqCst);
        self.stop();

        let deadline = Instant::now() + timeout;
        let pending: Vec<(String, watch::Receiver<bool>)> = self
            .inner
            .in_flight
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().settled.clone()))
            .collect();
        tracing::info!(
            in_flight = pending.len(),
            timeout_ms = timeout.as_millis() as u64,
            "worker shutting down"
        );

        let waits = pending.into_iter().map(|(run_id, mut settled)| async move {
            let done = tokio::time::timeout_at(deadline, settled.wait_for(|done| *done))
                .await
                .is_ok();
            (run_id, done)
        });

        let mut report = ShutdownReport::default();
        for (run_id, done) in futures_util::future::join_all(waits).await {
            if done {
                report.completed.push(run_id);
            } else {
                report.interrupted.push(run_id);
            }
        }

        if report.interrupted.is_empty() {
            self.inner.shutting_down.store(false, Ordering::SeqCst);
        }
        tracing::info!(
            completed = report.completed.len(),
            interrupted = report.interrupted.len(),
            "worker shutdown complete"
        );
        report
    }
}

impl WorkerInner {
    /// Spawn the trigger loop for a job.
    fn arm_trigger(inner: &Arc<WorkerInner>, entry: &Arc<JobEntry>) {
        entry.stop_trigger();

        let weak = Arc::downgrade(inner);
        let job = entry.clone();
        let handle = tokio::spawn(async move {
            Self::trigger_loop(weak, job).await;
        });
        *entry
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn trigger_loop(worker: Weak<WorkerInner>, job: Arc<JobEntry>) {
        let mut after = Utc::now();
        loop {
            let Some(next) = job.evaluator.next_run(after) else {
                tracing::warn!(
                    job_id = %job.record.id,
                    "schedule has no further occurrences; trigger exiting"
                );
                break;
            };

            let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            tokio::time::sleep(wait).await;

            let Some(inner) = worker.upgrade() else {
                break;
            };
            Self::fire(&inner, &job, next);

            // A delayed wake catches up with a single (late) fire:
            // advancing past "now" skips every other instant that
            // elapsed while we slept, and advancing past "next" keeps
            // the same wall time from firing twice.
            let now = Utc::now();
            after = if now > next { now } else { next };
        }
    }

    fn fire(inner: &Arc<WorkerInner>, entry: &Arc<JobEntry>, scheduled_at: DateTime<Utc>) {
        if inner.overlap == OverlapPolicy::SkipIfRunning && inner.job_running(&entry.record.id) {
            tracing::info!(
                job_id = %entry.record.id,
                "previous run still in flight; fire skipped"
            );
            return;
        }

        let inner = inner.clone();
        let record = entry.record.clone();
        tokio::spawn(async move {
            inner.execute(record, scheduled_at).await;
        });
    }

    async fn execute(&self, record: Arc<JobRecord>, scheduled_at: DateTime<Utc>) -> ExecutionResult {
        if self.shutting_down.load(Ordering::SeqCst) {
            let now = Utc::now();
            tracing::warn!(job_id = %record.id, "fire rejected: scheduler is shutting down");
            return ExecutionResult {
                job_id: record.id.clone(),
                run_id: run_id::skipped(),
                status: RunStatus::Failure,
                started_at: now,
                completed_at: now,
                duration: 0,
                attempt: 0,
                error: Some(ExecutionError::new("Scheduler is shutting down")),
            };
        }

        let run_id = run_id::generate();
        let (settled_tx, settled_rx) = watch::channel(false);
        self.in_flight.insert(
            run_id.clone(),
            InFlightRun {
                job_id: record.id.clone(),
                settled: settled_rx,
            },
        );

        let result = self.engine.run_as(&record, run_id.clone(), scheduled_at).await;

        self.in_flight.remove(&run_id);
        let _ = settled_tx.send(true);
        result
    }

    fn job_running(&self, job_id: &str) -> bool {
        self.in_flight
            .iter()
            .any(|entry| entry.value().job_id == job_id)
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("jobs", &self.job_count())
            .field("in_flight", &self.in_flight_count())
            .field("running", &self.is_running())
            .finish()
    }
}
