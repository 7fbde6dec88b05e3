//! Status, icons and client error reports

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Multipart, State};
use axum::Json;
use desk_foundation::permission::resolve_name;
use desk_foundation::Error;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{info, warn};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ClientErrorReport {
    pub timestamp: Option<String>,
    pub app: Option<String>,
    pub message: Option<String>,
    pub stack: Option<String>,
}

/// `GET /api/status`
pub async fn status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /api/list-icons` - `.png` files in the icons directory, sorted
pub async fn list_icons(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let icons = png_files(&state.icons_dir).await?;
    Ok(Json(json!({ "icons": icons })))
}

async fn png_files(dir: &Path) -> ApiResult<Vec<String>> {
    let mut icons = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(icons),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_png_name(&name) && entry.path().is_file() {
            icons.push(name);
        }
    }
    icons.sort();
    Ok(icons)
}

fn is_png_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}

/// `POST /api/upload-icon` multipart `file`, PNG only
pub async fn upload_icon(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let limit = state.config.max_upload_bytes;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let name = resolve_name(field.file_name().unwrap_or_default())?.to_string();
        if !is_png_name(&name) {
            return Err(Error::InvalidInput("Only .png icons are accepted".to_string()).into());
        }

        let data = field.bytes().await?;
        if data.len() > limit {
            return Err(Error::PayloadTooLarge("File too large".to_string()).into());
        }
        if !data.starts_with(PNG_SIGNATURE) {
            return Err(Error::InvalidInput("File is not a PNG image".to_string()).into());
        }

        tokio::fs::create_dir_all(&state.icons_dir).await?;
        tokio::fs::write(state.icons_dir.join(&name), &data).await?;
        info!("Stored icon {} ({} bytes)", name, data.len());
        return Ok(Json(json!({ "ok": true, "file": name })));
    }

    Err(Error::InvalidInput("No file provided".to_string()).into())
}

/// `GET /api/system-stats` CPU and memory usage in percent
pub async fn system_stats(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let monitor = state.monitor.clone();
    let stats = tokio::task::spawn_blocking(move || monitor.sample())
        .await
        .map_err(|e| Error::Internal(format!("Stats sampler failed: {}", e)))?;
    Ok(Json(json!(stats)))
}

/// `POST /api/log-client-error`
pub async fn log_client_error(ApiJson(report): ApiJson<ClientErrorReport>) -> Json<Value> {
    warn!(
        app = report.app.as_deref().unwrap_or("unknown"),
        timestamp = report.timestamp.as_deref().unwrap_or(""),
        "Client error: {}",
        report.message.as_deref().unwrap_or("(no message)")
    );
    if let Some(stack) = report.stack.as_deref().filter(|s| !s.is_empty()) {
        warn!("Client stack: {}", stack);
    }
    Json(json!({ "ok": true }))
}
