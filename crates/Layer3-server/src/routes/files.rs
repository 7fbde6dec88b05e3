//! File manager endpoints
//!
//! Every client path goes through the [`PathGuard`](desk_foundation::PathGuard)
//! before the filesystem is touched, and only guard-relative paths go back
//! out.

use crate::error::{ApiError, ApiResult};
use crate::extract::ApiJson;
use crate::state::AppState;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use desk_foundation::Error;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub path: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub path: String,
    pub new_name: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct DirectoryItem {
    pub name: String,
    pub path: String,
    #[serde(rename = "isDir")]
    pub is_dir: bool,
    pub size: u64,
}

fn not_found() -> ApiError {
    Error::NotFound("Not found".to_string()).into()
}

/// `GET /api/list-directory?path=`
pub async fn list_directory(
    State(state): State<AppState>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<Value>> {
    let dir = state.guard.resolve(&query.path)?;
    if !dir.is_dir() {
        return Err(not_found());
    }

    let mut items = Vec::new();
    let mut entries = tokio::fs::read_dir(&dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let path = entry.path();
        items.push(DirectoryItem {
            name: entry.file_name().to_string_lossy().into_owned(),
            path: state.guard.display(&path),
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
        });
    }

    items.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(Json(json!({
        "path": state.guard.display(&dir),
        "items": items,
    })))
}

/// `POST /api/create-folder {path, name}`
pub async fn create_folder(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateFolderRequest>,
) -> ApiResult<Json<Value>> {
    let parent = state.guard.resolve(&request.path)?;
    if !parent.is_dir() {
        return Err(not_found());
    }

    let target = state.guard.resolve_child(&parent, &request.name)?;
    if target.exists() {
        return Err(Error::AlreadyExists("Already exists".to_string()).into());
    }

    tokio::fs::create_dir(&target).await?;
    let path = state.guard.display(&target);
    info!("Created folder {}", path);
    Ok(Json(json!({ "ok": true, "path": path })))
}

/// `POST /api/rename {path, new_name}` - renames within the same directory
pub async fn rename(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RenameRequest>,
) -> ApiResult<Json<Value>> {
    let source = state.guard.resolve(&request.path)?;
    if state.guard.is_root(&source) {
        return Err(Error::PathEscape(request.path).into());
    }
    if !source.exists() {
        return Err(not_found());
    }

    let parent = source.parent().ok_or_else(not_found)?;
    let target = state.guard.resolve_child(parent, &request.new_name)?;
    if target.exists() {
        return Err(Error::AlreadyExists("Already exists".to_string()).into());
    }

    tokio::fs::rename(&source, &target).await?;
    let path = state.guard.display(&target);
    info!("Renamed {} -> {}", state.guard.display(&source), path);
    Ok(Json(json!({ "ok": true, "path": path })))
}

/// `POST /api/delete {path}` - the root itself can never be deleted
pub async fn delete(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DeleteRequest>,
) -> ApiResult<Json<Value>> {
    let target = state.guard.resolve(&request.path)?;
    if state.guard.is_root(&target) {
        return Err(Error::PathEscape(request.path).into());
    }

    let metadata = tokio::fs::symlink_metadata(&target)
        .await
        .map_err(|_| not_found())?;
    if metadata.is_dir() {
        tokio::fs::remove_dir_all(&target).await?;
    } else {
        tokio::fs::remove_file(&target).await?;
    }

    info!("Deleted {}", state.guard.display(&target));
    Ok(Json(json!({ "ok": true })))
}

/// `POST /api/upload` multipart `path` + `file`
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let limit = state.config.max_upload_bytes;
    let mut dir = String::new();
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("path") => dir = field.text().await?,
            Some("file") => {
                let name = field.file_name().unwrap_or_default().to_string();
                let mut data = Vec::new();
                while let Some(chunk) = field.chunk().await? {
                    if data.len() + chunk.len() > limit {
                        return Err(Error::PayloadTooLarge("File too large".to_string()).into());
                    }
                    data.extend_from_slice(&chunk);
                }
                file = Some((name, data));
            }
            _ => {}
        }
    }

    let (name, data) = file.ok_or_else(|| Error::InvalidInput("No file provided".to_string()))?;
    let parent = state.guard.resolve(&dir)?;
    if !parent.is_dir() {
        return Err(not_found());
    }
    let target = state.guard.resolve_child(&parent, &name)?;

    tokio::fs::write(&target, &data).await?;
    let path = state.guard.display(&target);
    info!("Uploaded {} ({} bytes)", path, data.len());
    Ok(Json(json!({ "ok": true, "path": path })))
}

