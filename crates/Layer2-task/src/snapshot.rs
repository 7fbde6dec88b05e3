//! Job snapshot - advisory on-disk mirror of running jobs
//!
//! Lets a restarted server keep tracking (and stopping) processes it spawned
//! before. Entries are never trusted blindly: every pid is checked on restore.

use crate::job::{JobId, JobKind};
use desk_foundation::{JsonStore, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// One running job as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: JobId,
    pub pid: u32,
    pub kind: JobKind,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    jobs: Vec<SnapshotEntry>,
}

/// JSON snapshot file
#[derive(Debug, Clone)]
pub struct JobSnapshot {
    store: JsonStore,
    file: String,
}

impl JobSnapshot {
    pub fn new(path: &Path) -> Result<Self> {
        let (store, file) = JsonStore::for_file(path)?;
        Ok(Self { store, file })
    }

    /// Saved entries; a missing or unreadable file yields nothing
    pub fn load(&self) -> Vec<SnapshotEntry> {
        match self.store.load_optional::<SnapshotFile>(&self.file) {
            Ok(Some(snapshot)) => snapshot.jobs,
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Ignoring job snapshot: {}", e);
                Vec::new()
            }
        }
    }

    pub fn save(&self, jobs: Vec<SnapshotEntry>) -> Result<()> {
        self.store.save(&self.file, &SnapshotFile { jobs })
    }

    pub fn path(&self) -> std::path::PathBuf {
        self.store.file_path(&self.file)
    }
}
