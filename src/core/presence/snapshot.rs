//! Flat JSON snapshot of the presence records: `agent -> [action, timestamp]`.
//!
//! The waiting set is not saved; queries rebuild it after a restart.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{Action, PresenceRecord, PresenceStore};
use crate::core::lifecycle::LifecycleComponent;

pub type Snapshot = BTreeMap<String, (Action, String)>;

impl PresenceStore {
    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.lock().await;
        state
            .records
            .iter()
            .map(|(agent, record)| (agent.clone(), (record.action, record.at.to_rfc3339())))
            .collect()
    }

    /// Replaces the records with the snapshot's. Entries with unreadable
    /// timestamps are skipped. Returns the number of restored agents.
    pub async fn restore(&self, snapshot: Snapshot) -> usize {
        let mut state = self.state.lock().await;
        state.records.clear();
        state.waiting.clear();
        for (agent, (action, timestamp)) in snapshot {
            match parse_timestamp(&timestamp) {
                Some(at) => {
                    state.records.insert(agent, PresenceRecord { action, at });
                }
                None => warn!(
                    "Skipping saved record for [{}]: bad timestamp '{}'",
                    agent, timestamp
                ),
            }
        }
        state.records.len()
    }

    /// Writes the snapshot next to `path` and renames it into place.
    pub async fn save_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;

        info!("Saved {} presence record(s) to {}", snapshot.len(), path.display());
        Ok(())
    }

    /// Restores from `path` if it exists. A missing file leaves the store empty.
    pub async fn load_snapshot(&self, path: &Path) -> Result<usize> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("No saved presence at {}, starting empty", path.display());
            return Ok(0);
        }
        let contents = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        let restored = self.restore(snapshot).await;
        info!("Restored {} presence record(s) from {}", restored, path.display());
        Ok(restored)
    }
}

/// Restores the store on init and writes it back on shutdown.
pub struct PresencePersistence {
    store: PresenceStore,
    path: PathBuf,
}

impl PresencePersistence {
    pub fn new(store: PresenceStore, path: PathBuf) -> Self {
        Self { store, path }
    }
}

#[async_trait::async_trait]
impl LifecycleComponent for PresencePersistence {
    async fn on_init(&mut self) -> Result<()> {
        // A broken save file starts the store empty.
        if let Err(e) = self.store.load_snapshot(&self.path).await {
            warn!("Ignoring saved presence: {:#}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        self.store.save_snapshot(&self.path).await
    }
}

/// Accepts RFC 3339 and the naive local `2024-01-31 08:00:00.123456` form.
fn parse_timestamp(s: &str) -> Option<DateTime<Local>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(s) {
        return Some(at.with_timezone(&Local));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
}
