//! Job endpoints: submit, poll, stop, list

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use desk_foundation::Error;
use desk_task::{Job, JobKind, JobState};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SubmitCommandRequest {
    #[serde(default)]
    pub command: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScriptRequest {
    #[serde(default, alias = "script")]
    pub script_name: String,
}

#[derive(Debug, Deserialize)]
pub struct StopJobRequest {
    pub pid: Option<u32>,
    pub job_id: Option<String>,
}

/// `POST /api/submit-command` -> `202 {job_id}`
pub async fn submit_command(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubmitCommandRequest>,
) -> ApiResult<impl IntoResponse> {
    let job_id = state.jobs.submit_command(&request.command)?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "job_id": job_id.to_string() })),
    ))
}

/// `GET /api/job-status/{job_id}`. A finished job is handed out once.
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let job = state.jobs.job_status(&job_id)?;
    Ok(Json(status_body(&job)))
}

/// `POST /api/submit-script` -> `200 {pid, script, job_id}`
pub async fn submit_script(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SubmitScriptRequest>,
) -> ApiResult<Json<Value>> {
    let launch = state.jobs.submit_script(&request.script_name)?;
    Ok(Json(json!({
        "pid": launch.pid,
        "script": launch.script,
        "job_id": launch.job_id.to_string(),
    })))
}

/// `POST /api/stop-job` by `job_id` or `pid`
pub async fn stop_job(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<StopJobRequest>,
) -> ApiResult<Json<Value>> {
    let job = match (&request.job_id, request.pid) {
        (Some(job_id), _) => state.jobs.stop_job(job_id)?,
        (None, Some(pid)) => state.jobs.stop_pid(pid)?,
        (None, None) => {
            return Err(Error::InvalidInput("pid or job_id required".to_string()).into());
        }
    };

    Ok(Json(json!({
        "stopped": job.pid,
        "job_id": job.id.to_string(),
    })))
}

/// `GET /api/list-jobs` -> running jobs
pub async fn list_jobs(State(state): State<AppState>) -> Json<Value> {
    let processes: Vec<Value> = state.jobs.list_jobs().iter().map(list_entry).collect();
    Json(json!({ "processes": processes }))
}

fn status_body(job: &Job) -> Value {
    match &job.state {
        JobState::Running => json!({
            "status": "running",
            "job_id": job.id.to_string(),
        }),
        JobState::Finished(result) => json!({
            "status": "finished",
            "job_id": job.id.to_string(),
            "return_code": result.return_code,
            "returncode": result.return_code,
            "output": result.output,
            "timed_out": result.timed_out,
        }),
        JobState::Failed(error) => json!({
            "status": "failed",
            "job_id": job.id.to_string(),
            "error": error,
        }),
    }
}

fn list_entry(job: &Job) -> Value {
    match &job.kind {
        JobKind::Command { command } => json!({
            "job_id": job.id.to_string(),
            "pid": job.pid,
            "command": command,
        }),
        JobKind::Script { script, .. } => json!({
            "job_id": job.id.to_string(),
            "pid": job.pid,
            "script": script,
        }),
    }
}
