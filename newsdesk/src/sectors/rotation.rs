use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Persisted round-robin position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RotationState {
    pub current_index: usize,
    pub sectors_queue: Vec<String>,
    pub last_run: Option<DateTime<Utc>>,
    pub cycle_count: u64,
}

/// Read-only view of the rotation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotationSnapshot {
    pub current_sector: Option<String>,
    pub sectors_remaining: usize,
    pub total_sectors: usize,
    pub cycle_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// Round-robin over sectors, saved to a JSON file after every change
#[derive(Debug)]
pub struct SectorRotation {
    path: PathBuf,
    state: RotationState,
}

impl SectorRotation {
    /// Load rotation state from `path`; a missing file starts a fresh rotation
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("Failed to parse rotation state: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no rotation state yet");
                RotationState::default()
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read rotation state: {}", path.display()))
            }
        };

        let mut rotation = Self { path, state };
        if rotation.state.current_index >= rotation.state.sectors_queue.len()
            && rotation.state.current_index != 0
        {
            warn!(
                index = rotation.state.current_index,
                total = rotation.state.sectors_queue.len(),
                "rotation index out of range, rewinding"
            );
            rotation.state.current_index = 0;
        }
        Ok(rotation)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }
        let data = serde_json::to_string_pretty(&self.state).context("Failed to encode rotation state")?;

        // Write then rename so a crash never leaves a truncated state file
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data)
            .await
            .with_context(|| format!("Failed to write rotation state: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace rotation state: {}", self.path.display()))?;
        Ok(())
    }

    /// Install `sectors` as the queue. The position is kept when the set of
    /// sectors is unchanged and rewound otherwise.
    pub async fn initialize(&mut self, sectors: &[String]) -> Result<()> {
        let current: HashSet<&String> = self.state.sectors_queue.iter().collect();
        let wanted: HashSet<&String> = sectors.iter().collect();
        if self.state.sectors_queue.is_empty() || current != wanted {
            info!(total = sectors.len(), "initializing sector rotation");
            self.state.sectors_queue = sectors.to_vec();
            self.state.current_index = 0;
            self.save().await?;
        }
        Ok(())
    }

    /// Return the current sector and advance. Wrapping past the end starts a
    /// new cycle. `None` when no sectors are configured.
    pub async fn next(&mut self) -> Result<Option<String>> {
        if self.state.sectors_queue.is_empty() {
            return Ok(None);
        }
        if self.state.current_index >= self.state.sectors_queue.len() {
            self.state.current_index = 0;
        }

        let sector = self.state.sectors_queue[self.state.current_index].clone();
        self.state.current_index += 1;
        if self.state.current_index >= self.state.sectors_queue.len() {
            self.state.current_index = 0;
            self.state.cycle_count += 1;
        }
        self.state.last_run = Some(Utc::now());
        self.save().await?;

        info!(sector = %sector, cycle = self.state.cycle_count, "rotated to sector");
        Ok(Some(sector))
    }

    pub fn state(&self) -> RotationSnapshot {
        let total = self.state.sectors_queue.len();
        RotationSnapshot {
            current_sector: self.state.sectors_queue.get(self.state.current_index).cloned(),
            sectors_remaining: total.saturating_sub(self.state.current_index),
            total_sectors: total,
            cycle_count: self.state.cycle_count,
            last_run: self.state.last_run,
        }
    }

    /// Rewind to the first sector and zero the cycle count
    pub async fn reset(&mut self) -> Result<()> {
        self.state.current_index = 0;
        self.state.cycle_count = 0;
        self.save().await
    }
}
