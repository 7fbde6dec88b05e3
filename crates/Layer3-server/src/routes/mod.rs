//! Router assembly
//!
//! Primary route names first, then the aliases the existing front end still
//! calls. Anything not under `/api` is a static file from the root.

pub mod files;
pub mod jobs;
pub mod ollama;
pub mod system;

use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Multipart framing on top of the largest accepted file
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes + BODY_OVERHEAD_BYTES;
    let static_files = ServeDir::new(state.guard.root()).append_index_html_on_directories(true);

    Router::new()
        // Jobs
        .route("/api/submit-command", post(jobs::submit_command))
        .route("/api/job-status/{job_id}", get(jobs::job_status))
        .route("/api/submit-script", post(jobs::submit_script))
        .route("/api/stop-job", post(jobs::stop_job))
        .route("/api/list-jobs", get(jobs::list_jobs))
        .route("/api/execute-command", post(jobs::submit_command))
        .route("/api/command-status/{job_id}", get(jobs::job_status))
        .route("/api/run-script", post(jobs::submit_script))
        .route("/api/stop-script", post(jobs::stop_job))
        .route("/api/list-scripts", get(jobs::list_jobs))
        // File manager
        .route("/api/list-directory", get(files::list_directory))
        .route("/api/create-folder", post(files::create_folder))
        .route("/api/rename", post(files::rename))
        .route("/api/delete", post(files::delete))
        .route("/api/upload", post(files::upload))
        // System
        .route("/api/status", get(system::status))
        .route("/api/system-stats", get(system::system_stats))
        .route("/api/list-icons", get(system::list_icons))
        .route("/api/upload-icon", post(system::upload_icon))
        .route("/api/log-client-error", post(system::log_client_error))
        // Ollama
        .route("/api/ollama/models", get(ollama::models))
        .route("/api/ollama/chat", post(ollama::chat))
        .route("/api/ollama/history/{user}", get(ollama::history))
        .fallback_service(static_files)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
