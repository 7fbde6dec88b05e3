//! Ollama pass-through

use crate::error::ApiResult;
use crate::extract::ApiJson;
use crate::ollama::{build_conversation, ChatMessage};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::Json;
use desk_foundation::Error;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub image: Option<String>,
    /// Saves the conversation under this user when set
    pub profile: Option<String>,
}

/// `GET /api/ollama/models`. An unreachable Ollama is not an error for the
/// front end, it just has nothing to offer.
pub async fn models(State(state): State<AppState>) -> Json<Value> {
    match state.ollama.list_models().await {
        Ok(models) => Json(json!({ "models": models })),
        Err(e) => {
            warn!("Listing Ollama models failed: {}", e);
            Json(json!({ "models": [], "error": "Ollama is not reachable" }))
        }
    }
}

/// `GET /api/ollama/history/{user}`
pub async fn history(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> ApiResult<Json<Value>> {
    let store = state.history.clone();
    let history = tokio::task::spawn_blocking(move || store.load(&user))
        .await
        .map_err(|e| Error::Internal(format!("History load failed: {}", e)))??;
    Ok(Json(json!({ "history": history })))
}

/// `POST /api/ollama/chat {model, prompt, history, image, profile}`
pub async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<Value>> {
    if request.model.trim().is_empty() {
        return Err(Error::InvalidInput("Model is required".to_string()).into());
    }

    let mut conversation = build_conversation(request.history, &request.prompt, request.image);
    if conversation.is_empty() {
        return Err(Error::InvalidInput("Prompt is required".to_string()).into());
    }

    let reply = state.ollama.chat(&request.model, &conversation).await?;
    let response = reply.content.clone();
    conversation.push(reply);

    if let Some(profile) = request.profile.filter(|p| !p.trim().is_empty()) {
        let store = state.history.clone();
        let saved = conversation.clone();
        let result = tokio::task::spawn_blocking(move || store.save(&profile, &saved)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Saving chat history failed: {}", e),
            Err(e) => warn!("Saving chat history failed: {}", e),
        }
    }

    Ok(Json(json!({
        "response": response,
        "history": conversation,
    })))
}
