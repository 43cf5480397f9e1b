//! Snapshot File - Atomic JSON Store Persistence
//!
//! Saves `StoreSnapshot` to `store.json` using atomic writes (write to a
//! tmp file, then rename), so the file on disk is always either the
//! previous or the new snapshot, never a partial write.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::{info, instrument};

use super::memory::StoreSnapshot;

/// Atomic JSON snapshot file for the memory store.
pub struct SnapshotFile {
    /// Path to store.json.
    path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl SnapshotFile {
    /// Snapshot file in `data_dir`, creating the directory if needed.
    pub async fn new(data_dir: &str) -> Result<Self> {
        let dir = Path::new(data_dir);
        fs::create_dir_all(dir)
            .await
            .context("Failed to create data directory")?;

        Ok(Self {
            path: dir.join("store.json"),
            tmp_path: dir.join("store.json.tmp"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub async fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize store snapshot")?;

        fs::write(&self.tmp_path, &json)
            .await
            .context("Failed to write tmp snapshot file")?;

        fs::rename(&self.tmp_path, &self.path)
            .await
            .context("Failed to rename snapshot file")?;

        info!(
            path = %self.path.display(),
            loans = snapshot.loans.len(),
            offers = snapshot.offers.len(),
            "Store snapshot saved"
        );

        Ok(())
    }

    /// Load the last saved snapshot, `None` on first startup.
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("No store snapshot found, starting fresh");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .await
            .context("Failed to read store snapshot")?;

        let snapshot: StoreSnapshot =
            serde_json::from_str(&json).context("Failed to parse store snapshot JSON")?;

        info!(
            assets = snapshot.assets.len(),
            loans = snapshot.loans.len(),
            last_id = snapshot.last_id,
            "Store snapshot loaded"
        );

        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::Network;

    use super::*;

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = std::env::temp_dir().join(format!("nftlend-snapshot-{}", std::process::id()));
        let file = SnapshotFile::new(dir.to_str().unwrap()).await.unwrap();
        assert!(file.load().await.unwrap().is_none());

        let mut snapshot = StoreSnapshot::default();
        snapshot.block_cursors.insert(Network::Matic, 42);
        snapshot.last_id = 9;
        file.save(&snapshot).await.unwrap();

        let loaded = file.load().await.unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        let _ = std::fs::remove_dir_all(dir);
    }
}
