//! Shared application state handed to every handler

use crate::history::ChatHistory;
use crate::monitor::SystemMonitor;
use crate::ollama::OllamaClient;
use desk_foundation::{DeskConfig, PathGuard, Result};
use desk_task::JobService;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DeskConfig>,

    /// Confinement for the file manager and static files
    pub guard: PathGuard,

    pub jobs: Arc<JobService>,

    pub icons_dir: PathBuf,

    pub ollama: OllamaClient,

    pub history: ChatHistory,

    pub monitor: SystemMonitor,
}

impl AppState {
    /// Build every service from runtime settings
    pub fn from_config(config: DeskConfig) -> Result<Self> {
        let jobs = Arc::new(JobService::from_config(&config)?);
        Self::new(config, jobs)
    }

    /// Use an already-built job service
    pub fn new(config: DeskConfig, jobs: Arc<JobService>) -> Result<Self> {
        let guard = PathGuard::new(&config.root_dir)?;
        let icons_dir = config
            .icons_dir
            .clone()
            .unwrap_or_else(|| guard.root().join("icons"));
        let ollama = OllamaClient::new(&config.ollama_url);
        let history = ChatHistory::new(config.chat_history_dir.clone());

        Ok(Self {
            config: Arc::new(config),
            guard,
            jobs,
            icons_dir,
            ollama,
            history,
            monitor: SystemMonitor::new(),
        })
    }
}
