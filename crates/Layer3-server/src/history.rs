//! Saved chat conversations, one JSON file per profile

use crate::ollama::ChatMessage;
use desk_foundation::{Error, JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const MAX_PROFILE_LEN: usize = 64;

#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    history: Vec<ChatMessage>,
}

/// `None` store means history is switched off: loads are empty, saves are
/// dropped
#[derive(Debug, Clone)]
pub struct ChatHistory {
    store: Option<JsonStore>,
}

impl ChatHistory {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            store: dir.map(JsonStore::new),
        }
    }

    /// Conversation saved for `profile`; missing or unreadable files are empty
    pub fn load(&self, profile: &str) -> Result<Vec<ChatMessage>> {
        let file = profile_file(profile)?;
        Ok(match &self.store {
            Some(store) => store.load_or_default::<HistoryFile>(&file).history,
            None => Vec::new(),
        })
    }

    /// Replace the saved conversation. Images are not kept.
    pub fn save(&self, profile: &str, history: &[ChatMessage]) -> Result<()> {
        let file = profile_file(profile)?;
        let Some(store) = &self.store else {
            return Ok(());
        };

        let history = history
            .iter()
            .map(|m| ChatMessage::new(m.role.clone(), m.content.clone()))
            .collect();
        store.save(&file, &HistoryFile { history })
    }
}

/// File name for a profile id or name: letters, digits, `-` and `_` kept,
/// everything else becomes `_`
fn profile_file(profile: &str) -> Result<String> {
    let profile = profile.trim();
    if profile.is_empty() || profile.chars().count() > MAX_PROFILE_LEN {
        return Err(Error::InvalidInput("Invalid profile".to_string()));
    }

    let stem: String = profile
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    Ok(format!("{}.json", stem))
}
