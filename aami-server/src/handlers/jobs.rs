//! Job core endpoints (§6: `GET/DELETE /jobs/:id`, `GET /jobs`, `GET /jobs/stats`).

use aami_service::domain::job_core::{Job, JobStats};
use aami_service::error::Result;
use aami_service::ids::JobId;
use aami_service::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

/// Fetches a single job's current record.
pub async fn get_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Result<Json<Job>> {
    Ok(Json(state.jobs().get(&id).await?))
}

/// Requests cancellation of a running or pending job.
pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<JobId>) -> Result<StatusCode> {
    state.jobs().cancel(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Lists every job the manager currently tracks.
pub async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<Job>>> {
    Ok(Json(state.jobs().list().await?))
}

/// Aggregate job-core counters (§4.6).
pub async fn job_stats(State(state): State<AppState>) -> Result<Json<JobStats>> {
    Ok(Json(state.jobs().stats().await?))
}
