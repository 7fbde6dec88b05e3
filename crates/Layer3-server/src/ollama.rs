//! Ollama client - thin pass-through to a local Ollama server

use desk_foundation::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_TIMEOUT_SECS: u64 = 600; // Local models can be slow
const TAGS_TIMEOUT_SECS: u64 = 5;

/// One chat turn, in Ollama's wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,

    #[serde(default)]
    pub content: String,

    /// Base64 images (vision models)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            images: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Deserialize)]
struct TagModel {
    #[serde(default)]
    name: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Names of locally installed models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(TAGS_TIMEOUT_SECS))
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "Ollama returned {}",
                response.status()
            )));
        }

        let tags: TagsResponse = response.json().await.map_err(upstream)?;
        Ok(tags
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// Send a conversation, get the assistant's reply
    pub async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<ChatMessage> {
        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} ({} messages, model {})", url, messages.len(), model);

        let response = self
            .client
            .post(&url)
            .json(&ChatRequest {
                model,
                messages,
                stream: false,
            })
            .send()
            .await
            .map_err(upstream)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("Ollama returned {}: {}", status, body.trim())));
        }

        let reply: ChatResponse = response.json().await.map_err(upstream)?;
        Ok(reply.message)
    }
}

fn upstream(err: reqwest::Error) -> Error {
    Error::Upstream(format!("Ollama request failed: {}", err))
}

/// Conversation to send: the client's history, the new prompt appended
/// unless the history already ends with it, and the image attached to the
/// last user turn
pub fn build_conversation(
    mut history: Vec<ChatMessage>,
    prompt: &str,
    image: Option<String>,
) -> Vec<ChatMessage> {
    let prompt = prompt.trim();
    let ends_with_prompt = history
        .last()
        .is_some_and(|m| m.role == "user" && m.content.trim() == prompt);

    if !prompt.is_empty() && !ends_with_prompt {
        history.push(ChatMessage::new("user", prompt));
    }

    if let Some(image) = image.filter(|i| !i.is_empty()) {
        match history.last_mut() {
            Some(last) if last.role == "user" => last.images.push(image),
            _ => {
                let mut turn = ChatMessage::new("user", "");
                turn.images.push(image);
                history.push(turn);
            }
        }
    }

    history
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_appended_once() {
        let history = vec![ChatMessage::new("user", "hi")];
        let conv = build_conversation(history, "hi", None);
        assert_eq!(conv.len(), 1);

        let conv = build_conversation(conv, "next", None);
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[1], ChatMessage::new("user", "next"));
    }

    #[test]
    fn test_image_attached_to_last_user_turn() {
        let conv = build_conversation(Vec::new(), "what is this?", Some("aGk=".into()));
        assert_eq!(conv.len(), 1);
        assert_eq!(conv[0].images, vec!["aGk="]);

        let history = vec![ChatMessage::new("assistant", "hello")];
        let conv = build_conversation(history, "", Some("aGk=".into()));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv[1].role, "user");
        assert_eq!(conv[1].images, vec!["aGk="]);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upstream_error() {
        let client = OllamaClient::new("http://127.0.0.1:9/");
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        assert!(matches!(client.list_models().await, Err(Error::Upstream(_))));
    }
}
