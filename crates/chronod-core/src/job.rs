//! Job records, configuration, and the registration façade.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use chronod_types::error::{RegistryError, ScheduleError};
use chronod_types::execution::ExecutionError;
use chronod_types::retry::RetryConfig;
use chronod_types::schedule::ScheduleDescriptor;

use crate::registry;
use crate::schedule::duration::parse_duration;

/// Future returned by a job handler.
pub type HandlerFuture = BoxFuture<'static, anyhow::Result<()>>;
/// The job body. Invoked once per attempt.
pub type JobHandler = Arc<dyn Fn(JobContext) -> HandlerFuture + Send + Sync>;
/// Invoked after a run settles successfully. Errors are logged and
/// swallowed; they never change the result.
pub type SuccessHook = Arc<dyn Fn(JobContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
/// Invoked after a run settles in failure or timeout. Same swallowing
/// rule as [`SuccessHook`].
pub type FailureHook =
    Arc<dyn Fn(ExecutionError, JobContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

// ---------------------------------------------------------------------------
// JobContext
// ---------------------------------------------------------------------------

/// Per-attempt execution context passed to the handler and hooks.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: String,
    pub job_name: String,
    pub run_id: String,
    /// The fire instant the trigger demanded.
    pub scheduled_at: DateTime<Utc>,
    /// When this attempt actually started.
    pub started_at: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Cancelled when the attempt times out. Handlers that honor it can
    /// shorten cleanup; handlers that ignore it keep running detached.
    pub signal: CancellationToken,
}

// ---------------------------------------------------------------------------
// JobConfig
// ---------------------------------------------------------------------------

/// Optional job settings.
#[derive(Clone, Default)]
pub struct JobConfig {
    /// Human label; defaults to the job id.
    pub name: Option<String>,
    pub retry: Option<RetryConfig>,
    /// Per-attempt timeout as a duration string. Defaults to 5 minutes.
    pub timeout: Option<String>,
    pub on_success: Option<SuccessHook>,
    pub on_failure: Option<FailureHook>,
}

impl JobConfig {
    /// Validate the string-typed fields so execution never sees an
    /// unparseable timeout or retry delay.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if let Some(timeout) = &self.timeout {
            parse_duration(timeout)?;
        }
        if let Some(retry) = &self.retry {
            parse_duration(&retry.initial_delay)?;
        }
        Ok(())
    }

    /// Box a plain async closure into a [`SuccessHook`].
    pub fn success_hook<F, Fut>(hook: F) -> SuccessHook
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(move |ctx| Box::pin(hook(ctx)))
    }

    /// Box a plain async closure into a [`FailureHook`].
    pub fn failure_hook<F, Fut>(hook: F) -> FailureHook
    where
        F: Fn(ExecutionError, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(move |error, ctx| Box::pin(hook(error, ctx)))
    }
}

impl fmt::Debug for JobConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobConfig")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// A registered job. The registry owns records; every other component
/// refers to them by id.
#[derive(Clone)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub schedule: ScheduleDescriptor,
    pub config: JobConfig,
    pub handler: JobHandler,
    /// Source reference for discovery-loaded jobs.
    pub file_path: Option<String>,
}

impl JobRecord {
    pub fn new(
        id: impl Into<String>,
        schedule: ScheduleDescriptor,
        config: JobConfig,
        handler: JobHandler,
    ) -> Self {
        let id = id.into();
        let name = config.name.clone().unwrap_or_else(|| id.clone());
        Self {
            id,
            name,
            schedule,
            config,
            handler,
            file_path: None,
        }
    }

    /// Box a plain async closure into a [`JobHandler`].
    pub fn handler_fn<F, Fut>(handler: F) -> JobHandler
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Arc::new(move |ctx| Box::pin(handler(ctx)))
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("cron", &self.schedule.cron)
            .field("file_path", &self.file_path)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Registration façade
// ---------------------------------------------------------------------------

/// Register a job under an explicit id in the process-wide registry.
pub fn schedule_named<F, Fut>(
    id: &str,
    descriptor: ScheduleDescriptor,
    config: JobConfig,
    handler: F,
) -> Result<Arc<JobRecord>, RegistryError>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    config.validate()?;
    let record = Arc::new(JobRecord::new(
        id,
        descriptor,
        config,
        JobRecord::handler_fn(handler),
    ));
    registry::global().register(record.clone())?;
    Ok(record)
}

/// Register an anonymous job; it receives an `anonymous-job-<N>` id.
pub fn schedule<F, Fut>(
    descriptor: ScheduleDescriptor,
    config: JobConfig,
    handler: F,
) -> Result<Arc<JobRecord>, RegistryError>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    config.validate()?;
    let registry = registry::global();
    let record = Arc::new(JobRecord::new(
        registry.next_anonymous_id(),
        descriptor,
        config,
        JobRecord::handler_fn(handler),
    ));
    registry.register(record.clone())?;
    Ok(record)
}
