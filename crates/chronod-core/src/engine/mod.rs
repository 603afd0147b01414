//! Single-run execution: attempt loop, timeout race, retry backoff,
//! event emission, and result construction.
//!
//! `run` never returns an error -- every failure mode is reified into
//! the [`ExecutionResult`] and the event stream.

pub mod run_id;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use chronod_types::event::ExecutionEvent;
use chronod_types::execution::{ExecutionError, ExecutionResult, RunStatus};
use chronod_types::retry::{Backoff, RetryConfig};

use crate::event::EventBus;
use crate::job::{JobContext, JobRecord};
use crate::schedule::duration::parse_duration;

/// Per-attempt timeout when the job config has none.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Distinguished error for an attempt that outlived its timeout.
#[derive(Debug, thiserror::Error)]
#[error("job '{job_id}' timed out after {timeout_ms}ms (attempt {attempt})")]
pub struct TimeoutError {
    pub job_id: String,
    pub attempt: u32,
    pub timeout_ms: u64,
}

/// Outcome of a single attempt.
enum AttemptError {
    Timeout(TimeoutError),
    Handler(ExecutionError),
}

impl AttemptError {
    fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::Timeout(_))
    }

    fn into_execution_error(self) -> ExecutionError {
        match self {
            AttemptError::Timeout(err) => ExecutionError::new(err.to_string()),
            AttemptError::Handler(err) => err,
        }
    }
}

/// Runs jobs to a terminal result. Re-entrant: carries no per-run state,
/// so concurrent runs (of the same or different jobs) do not interact.
pub struct ExecutionEngine {
    bus: Arc<EventBus>,
}

impl ExecutionEngine {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run a job with a fresh run id, fired at "now".
    pub async fn run(&self, job: &JobRecord) -> ExecutionResult {
        self.run_as(job, run_id::generate(), Utc::now()).await
    }

    /// Run with a caller-supplied run id and fire instant. The worker
    /// uses this so its in-flight table can be keyed before the run
    /// starts.
    pub async fn run_as(
        &self,
        job: &JobRecord,
        run_id: String,
        scheduled_at: DateTime<Utc>,
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let max_attempts = job.config.retry.as_ref().map_or(1, |r| r.attempts.max(1));
        let timeout = attempt_timeout(job);
        let run_token = CancellationToken::new();

        tracing::debug!(job_id = %job.id, %run_id, max_attempts, "run starting");
        self.bus.emit(&ExecutionEvent::Start {
            job_id: job.id.clone(),
            run_id: run_id.clone(),
            timestamp: started_at,
            attempt: 1,
        });

        let mut attempt = 1u32;
        loop {
            let ctx = JobContext {
                job_id: job.id.clone(),
                job_name: job.name.clone(),
                run_id: run_id.clone(),
                scheduled_at,
                started_at: Utc::now(),
                attempt,
                signal: run_token.child_token(),
            };

            match self.attempt_once(job, ctx.clone(), timeout).await {
                Ok(()) => {
                    let completed_at = Utc::now();
                    let duration = elapsed_ms(started_at, completed_at);
                    let result = ExecutionResult {
                        job_id: job.id.clone(),
                        run_id: run_id.clone(),
                        status: RunStatus::Success,
                        started_at,
                        completed_at,
                        duration,
                        attempt,
                        error: None,
                    };
                    tracing::info!(job_id = %job.id, %run_id, attempt, duration, "run succeeded");
                    self.bus.emit(&ExecutionEvent::Success {
                        job_id: job.id.clone(),
                        run_id: run_id.clone(),
                        timestamp: completed_at,
                        attempt,
                        duration,
                    });
                    self.invoke_success_hook(job, ctx).await;
                    return result;
                }
                Err(attempt_err) => {
                    let is_timeout = attempt_err.is_timeout();
                    let error = attempt_err.into_execution_error();

                    if attempt < max_attempts {
                        tracing::warn!(
                            job_id = %job.id,
                            %run_id,
                            attempt,
                            error = %error.message,
                            "attempt failed, retrying"
                        );
                        self.bus.emit(&ExecutionEvent::Retry {
                            job_id: job.id.clone(),
                            run_id: run_id.clone(),
                            timestamp: Utc::now(),
                            attempt,
                            error: error.clone(),
                        });
                        tokio::time::sleep(retry_delay(attempt, job.config.retry.as_ref())).await;
                        attempt += 1;
                        continue;
                    }

                    let completed_at = Utc::now();
                    let duration = elapsed_ms(started_at, completed_at);
                    let status = if is_timeout {
                        RunStatus::Timeout
                    } else {
                        RunStatus::Failure
                    };
                    let result = ExecutionResult {
                        job_id: job.id.clone(),
                        run_id: run_id.clone(),
                        status,
                        started_at,
                        completed_at,
                        duration,
                        attempt,
                        error: Some(error.clone()),
                    };
                    tracing::warn!(
                        job_id = %job.id,
                        %run_id,
                        attempt,
                        %status,
                        error = %error.message,
                        "run settled in failure"
                    );
                    let event = if is_timeout {
                        ExecutionEvent::Timeout {
                            job_id: job.id.clone(),
                            run_id: run_id.clone(),
                            timestamp: completed_at,
                            attempt,
                            duration,
                            error: error.clone(),
                        }
                    } else {
                        ExecutionEvent::Failure {
                            job_id: job.id.clone(),
                            run_id: run_id.clone(),
                            timestamp: completed_at,
                            attempt,
                            duration,
                            error: error.clone(),
                        }
                    };
                    self.bus.emit(&event);
                    self.invoke_failure_hook(job, error, ctx).await;
                    return result;
                }
            }
        }
    }

    /// One handler invocation raced against the per-attempt timer.
    ///
    /// The handler runs in a spawned task: when the timer wins, the task
    /// is left running detached (its signal is cancelled) rather than
    /// awaited, so a handler that ignores cancellation cannot wedge the
    /// engine.
    async fn attempt_once(
        &self,
        job: &JobRecord,
        ctx: JobContext,
        timeout: Duration,
    ) -> Result<(), AttemptError> {
        let signal = ctx.signal.clone();
        let attempt = ctx.attempt;
        let mut task = tokio::spawn((job.handler)(ctx));

        tokio::select! {
            joined = &mut task => match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(err)) => Err(AttemptError::Handler(execution_error_from_anyhow(&err))),
                Err(join_err) => Err(AttemptError::Handler(execution_error_from_join(join_err))),
            },
            _ = tokio::time::sleep(timeout) => {
                signal.cancel();
                Err(AttemptError::Timeout(TimeoutError {
                    job_id: job.id.clone(),
                    attempt,
                    timeout_ms: timeout.as_millis() as u64,
                }))
            }
        }
    }

    async fn invoke_success_hook(&self, job: &JobRecord, ctx: JobContext) {
        let Some(hook) = &job.config.on_success else {
            return;
        };
        match AssertUnwindSafe(hook(ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(job_id = %job.id, error = %err, "success hook failed")
            }
            Err(_) => tracing::warn!(job_id = %job.id, "success hook panicked"),
        }
    }

    async fn invoke_failure_hook(&self, job: &JobRecord, error: ExecutionError, ctx: JobContext) {
        let Some(hook) = &job.config.on_failure else {
            return;
        };
        match AssertUnwindSafe(hook(error, ctx)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::warn!(job_id = %job.id, error = %err, "failure hook failed")
            }
            Err(_) => tracing::warn!(job_id = %job.id, "failure hook panicked"),
        }
    }
}

/// Backoff delay before the attempt following `failed_attempt`.
///
/// Linear: `d0 * n`. Exponential: `d0 * 2^(n-1)`.
pub fn retry_delay(failed_attempt: u32, retry: Option<&RetryConfig>) -> Duration {
    let Some(config) = retry else {
        return Duration::ZERO;
    };
    let base = parse_duration(&config.initial_delay).unwrap_or(Duration::from_secs(1));
    match config.backoff {
        Backoff::Linear => base.saturating_mul(failed_attempt),
        Backoff::Exponential => {
            base.saturating_mul(2u32.saturating_pow(failed_attempt.saturating_sub(1)))
        }
    }
}

fn attempt_timeout(job: &JobRecord) -> Duration {
    match job.config.timeout.as_deref() {
        Some(raw) => parse_duration(raw).unwrap_or_else(|_| {
            // Registration validates this; an unparseable value can only
            // reach here through a hand-built record.
            tracing::warn!(job_id = %job.id, timeout = raw, "unparseable timeout, using default");
            DEFAULT_TIMEOUT
        }),
        None => DEFAULT_TIMEOUT,
    }
}

fn elapsed_ms(started_at: DateTime<Utc>, completed_at: DateTime<Utc>) -> u64 {
    (completed_at - started_at).num_milliseconds().max(0) as u64
}

fn execution_error_from_anyhow(err: &anyhow::Error) -> ExecutionError {
    let causes: Vec<String> = err
        .chain()
        .skip(1)
        .map(|cause| format!("caused by: {cause}"))
        .collect();
    if causes.is_empty() {
        ExecutionError::new(err.to_string())
    } else {
        ExecutionError::with_stack(err.to_string(), causes.join("\n"))
    }
}

/// Coerce a panicked (or aborted) handler task into an execution error.
fn execution_error_from_join(err: tokio::task::JoinError) -> ExecutionError {
    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "handler panicked".to_string());
            ExecutionError::new(message)
        }
        Err(err) => ExecutionError::new(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobConfig, JobRecord};
    use crate::schedule::builder::every;
    use chronod_types::event::EventKind;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn engine() -> (ExecutionEngine, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (ExecutionEngine::new(bus.clone()), bus)
    }

    fn collect_kinds(bus: &EventBus) -> (Arc<Mutex<Vec<EventKind>>>, crate::event::Subscription) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let events = sink.clone();
        let sub = bus.on_any(move |event| events.lock().unwrap().push(event.kind()));
        (sink, sub)
    }

    fn job_with(config: JobConfig, handler: crate::job::JobHandler) -> JobRecord {
        JobRecord::new("test-job", every("1h").unwrap(), config, handler)
    }

    #[tokio::test]
    async fn happy_path_single_attempt() {
        let (engine, bus) = engine();
        let (kinds, _sub) = collect_kinds(&bus);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let job = job_with(
            JobConfig::default(),
            JobRecord::handler_fn(move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.attempt, 1);
        assert!(result.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![EventKind::Start, EventKind::Success]
        );
    }

    #[tokio::test]
    async fn retries_until_success() {
        let (engine, bus) = engine();
        let (kinds, _sub) = collect_kinds(&bus);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let job = job_with(
            JobConfig {
                retry: Some(RetryConfig {
                    attempts: 3,
                    initial_delay: "10ms".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            JobRecord::handler_fn(move |_ctx| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        anyhow::bail!("transient failure");
                    }
                    Ok(())
                }
            }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.attempt, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![
                EventKind::Start,
                EventKind::Retry,
                EventKind::Retry,
                EventKind::Success
            ]
        );
        // Two backoff sleeps happened: 10ms + 20ms.
        assert!(result.duration >= 25, "duration was {}ms", result.duration);
    }

    #[tokio::test]
    async fn retry_events_carry_failed_attempt_numbers() {
        let (engine, bus) = engine();
        let attempts = Arc::new(Mutex::new(Vec::new()));
        let sink = attempts.clone();
        let _sub = bus.on(EventKind::Retry, move |event| {
            sink.lock().unwrap().push(event.attempt());
        });

        let job = job_with(
            JobConfig {
                retry: Some(RetryConfig {
                    attempts: 3,
                    initial_delay: "5ms".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            JobRecord::handler_fn(|_ctx| async { anyhow::bail!("always fails") }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.attempt, 3);
        assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn timeout_is_classified_and_cancels_signal() {
        let (engine, bus) = engine();
        let (kinds, _sub) = collect_kinds(&bus);
        let cancelled = Arc::new(AtomicU32::new(0));

        let flag = cancelled.clone();
        let job = job_with(
            JobConfig {
                timeout: Some("50ms".to_string()),
                ..Default::default()
            },
            JobRecord::handler_fn(move |ctx| {
                let flag = flag.clone();
                async move {
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                        _ = ctx.signal.cancelled() => {
                            flag.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    Ok(())
                }
            }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Timeout);
        assert_eq!(result.attempt, 1);
        let error = result.error.expect("timeout carries an error");
        assert!(error.message.contains("timed out"), "{}", error.message);
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![EventKind::Start, EventKind::Timeout]
        );

        // Give the detached handler a moment to observe the cancellation.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_without_retry_settles_on_first_attempt() {
        let (engine, bus) = engine();
        let (kinds, _sub) = collect_kinds(&bus);

        let job = job_with(
            JobConfig::default(),
            JobRecord::handler_fn(|_ctx| async {
                Err(anyhow::anyhow!("broken").context("outer context"))
            }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.attempt, 1);
        let error = result.error.unwrap();
        assert_eq!(error.message, "outer context");
        assert!(error.stack.as_deref().unwrap().contains("caused by: broken"));
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![EventKind::Start, EventKind::Failure]
        );
    }

    #[tokio::test]
    async fn panicking_handler_becomes_failure() {
        let (engine, _bus) = engine();

        let job = job_with(
            JobConfig::default(),
            JobRecord::handler_fn(|_ctx| async { panic!("handler exploded") }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(result.error.unwrap().message, "handler exploded");
    }

    #[tokio::test]
    async fn success_hook_runs_and_its_errors_are_swallowed() {
        let (engine, _bus) = engine();
        let hook_calls = Arc::new(AtomicU32::new(0));

        let counter = hook_calls.clone();
        let job = job_with(
            JobConfig {
                on_success: Some(JobConfig::success_hook(move |ctx| {
                    let counter = counter.clone();
                    async move {
                        assert_eq!(ctx.job_id, "test-job");
                        counter.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("hook failure must not change the result")
                    }
                })),
                ..Default::default()
            },
            JobRecord::handler_fn(|_ctx| async { Ok(()) }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_hook_receives_the_error() {
        let (engine, _bus) = engine();
        let messages = Arc::new(Mutex::new(Vec::new()));

        let sink = messages.clone();
        let job = job_with(
            JobConfig {
                on_failure: Some(JobConfig::failure_hook(move |error, _ctx| {
                    let sink = sink.clone();
                    async move {
                        sink.lock().unwrap().push(error.message);
                        Ok(())
                    }
                })),
                ..Default::default()
            },
            JobRecord::handler_fn(|_ctx| async { anyhow::bail!("disk full") }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Failure);
        assert_eq!(*messages.lock().unwrap(), vec!["disk full".to_string()]);
    }

    #[tokio::test]
    async fn timeout_then_retry_then_success() {
        let (engine, bus) = engine();
        let (kinds, _sub) = collect_kinds(&bus);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let job = job_with(
            JobConfig {
                timeout: Some("40ms".to_string()),
                retry: Some(RetryConfig {
                    attempts: 2,
                    initial_delay: "5ms".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            },
            JobRecord::handler_fn(move |_ctx| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                    Ok(())
                }
            }),
        );

        let result = engine.run(&job).await;

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.attempt, 2);
        assert_eq!(
            *kinds.lock().unwrap(),
            vec![EventKind::Start, EventKind::Retry, EventKind::Success]
        );
    }

    // -------------------------------------------------------------------
    // retry_delay
    // -------------------------------------------------------------------

    #[test]
    fn linear_backoff_scales_with_attempt() {
        let config = RetryConfig {
            attempts: 5,
            initial_delay: "10ms".to_string(),
            backoff: Backoff::Linear,
        };
        assert_eq!(retry_delay(1, Some(&config)), Duration::from_millis(10));
        assert_eq!(retry_delay(2, Some(&config)), Duration::from_millis(20));
        assert_eq!(retry_delay(3, Some(&config)), Duration::from_millis(30));
    }

    #[test]
    fn exponential_backoff_doubles() {
        let config = RetryConfig {
            attempts: 5,
            initial_delay: "10ms".to_string(),
            backoff: Backoff::Exponential,
        };
        assert_eq!(retry_delay(1, Some(&config)), Duration::from_millis(10));
        assert_eq!(retry_delay(2, Some(&config)), Duration::from_millis(20));
        assert_eq!(retry_delay(3, Some(&config)), Duration::from_millis(40));
        assert_eq!(retry_delay(4, Some(&config)), Duration::from_millis(80));
    }

    #[test]
    fn missing_retry_config_means_no_delay() {
        assert_eq!(retry_delay(1, None), Duration::ZERO);
    }

    #[test]
    fn default_initial_delay_is_one_second() {
        let config = RetryConfig {
            attempts: 2,
            ..Default::default()
        };
        assert_eq!(retry_delay(1, Some(&config)), Duration::from_secs(1));
    }
}
