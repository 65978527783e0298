//! Backup run handlers.
//!
//! - GET  /status -> the last run report (null before the first run)
//! - POST /runs   -> run mirror-then-prune now

use crate::{errors::AppError, models::report::RunReport, routes::routes::AppState};
use axum::{Json, extract::State};
use serde::Serialize;

#[derive(Serialize)]
pub struct StatusResponse {
    pub prefix: String,
    pub keep: i64,
    pub last_run: Option<RunReport>,
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let policy = &state.job.settings().policy;
    Json(StatusResponse {
        prefix: policy.prefix.clone(),
        keep: policy.keep,
        last_run: state.job.last_report().await,
    })
}

/// `POST /runs`
///
/// Runs synchronously and returns the report. 409 if a run is already in
/// progress, 503 if the listing failed.
pub async fn trigger_run(State(state): State<AppState>) -> Result<Json<RunReport>, AppError> {
    tracing::info!("manual backup run requested");
    let report = state.job.try_run_once().await?;
    Ok(Json(report))
}
