use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

use crate::execution::StateSnapshot;

/// JSON file persistence for the per-symbol position map
///
/// Saves are atomic: the snapshot is written to `<path>.tmp` and then
/// renamed over the real file, so a crash mid-write never leaves a
/// truncated state file behind.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// # Arguments
    /// * `path` - State file location (e.g., "state.json")
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the last saved snapshot
    ///
    /// A missing or unreadable file yields an empty snapshot (all FLAT).
    pub fn load(&self) -> StateSnapshot {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No state file at {}, starting flat", self.path.display());
                return StateSnapshot::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read {}: {}, starting flat", self.path.display(), e);
                return StateSnapshot::default();
            }
        };

        match serde_json::from_str::<StateSnapshot>(&raw) {
            Ok(snapshot) => {
                tracing::info!(
                    "Loaded state from {} ({} open positions)",
                    self.path.display(),
                    snapshot.open_positions().count()
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!("Corrupt state file {}: {}, starting flat", self.path.display(), e);
                StateSnapshot::default()
            }
        }
    }

    pub fn save(&self, snapshot: &StateSnapshot) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize state")?;

        let tmp_path = self.tmp_path();
        fs::write(&tmp_path, json)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;

        tracing::debug!("Saved state to {}", self.path.display());
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}
