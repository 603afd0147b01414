//! Job projection and trigger endpoints.

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};

use chronod_core::job::JobRecord;
use chronod_core::schedule::evaluator::CronEvaluator;
use chronod_types::execution::RunStatus;

use crate::history::RunEntry;
use crate::http::error::ApiError;
use crate::state::AppState;

/// Dashboard status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Idle,
    Running,
    Success,
    Failed,
}

/// The `/api/jobs` projection of one job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    /// Human-readable schedule text.
    pub schedule: String,
    pub cron: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    pub status: JobStatus,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

fn project(state: &AppState, job: &JobRecord) -> JobSummary {
    let latest = state.history.latest(&job.id);
    let status = if state.worker.is_job_running(&job.id) {
        JobStatus::Running
    } else {
        match &latest {
            Some(entry) if entry.status == RunStatus::Success => JobStatus::Success,
            Some(_) => JobStatus::Failed,
            None => JobStatus::Idle,
        }
    };

    // The worker's evaluator when the job is armed; a fresh one otherwise.
    let next_run = state
        .worker
        .get_next_run(&job.id)
        .ok()
        .flatten()
        .or_else(|| {
            CronEvaluator::for_descriptor(&job.schedule)
                .ok()
                .and_then(|evaluator| evaluator.next_run(Utc::now()))
        });

    JobSummary {
        id: job.id.clone(),
        name: job.name.clone(),
        schedule: job.schedule.human_readable.clone(),
        cron: job.schedule.cron.clone(),
        timezone: job.schedule.timezone.clone(),
        status,
        last_run: latest.map(|entry| entry.completed_at),
        next_run,
    }
}

/// `GET /api/jobs`
pub async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    let jobs = state
        .registry
        .get_all()
        .iter()
        .map(|job| project(&state, job))
        .collect();
    Json(jobs)
}

/// `GET /api/jobs/:id` -- the summary plus retry/timeout config.
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.clone()))?;

    let mut body = serde_json::to_value(project(&state, &job))
        .unwrap_or_else(|_| json!({ "id": job.id }));
    body["config"] = json!({
        "retry": job.config.retry,
        "timeout": job.config.timeout,
    });
    Ok(Json(body))
}

/// `GET /api/jobs/:id/runs` -- retained history, newest first.
pub async fn job_runs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RunEntry>>, ApiError> {
    if state.registry.get(&id).is_none() {
        return Err(ApiError::JobNotFound(id));
    }
    Ok(Json(state.history.runs(&id)))
}

/// `POST /api/jobs/:id/trigger` -- kick off a run in the background and
/// return immediately.
pub async fn trigger_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state
        .registry
        .get(&id)
        .ok_or_else(|| ApiError::JobNotFound(id.clone()))?;

    tracing::info!(job_id = %id, "manual trigger requested");
    let worker = state.worker.clone();
    tokio::spawn(async move {
        worker.execute_job(job).await;
    });

    Ok(Json(json!({ "message": "Job triggered", "jobId": id })))
}
