//! Snapshot persistence next to the project manifest.
//!
//! One `keel.<network>.json` file per network. Writes are skipped when the
//! serialized content equals what is on disk and otherwise go through a
//! temporary file and a rename.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::NetworkSnapshot;
use crate::config::paths::snapshot_file_name;
use crate::version::MANIFEST_VERSION;

/// Snapshot storage for one network.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    network: String,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>, network: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(snapshot_file_name(&self.network))
    }

    pub fn exists(&self) -> bool {
        self.path().exists()
    }

    /// Load the snapshot, or a new one when the network was never touched.
    ///
    /// Fails when the stored schema version is incompatible.
    pub fn load(&self) -> anyhow::Result<NetworkSnapshot> {
        let path = self.path();
        if !path.exists() {
            return Ok(NetworkSnapshot::new());
        }

        let bytes = fs::read(&path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let mut snapshot: NetworkSnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
        snapshot
            .validate()
            .with_context(|| format!("Invalid snapshot: {}", path.display()))?;

        // Accepted older tags are rewritten on the next save
        snapshot.manifest_version = MANIFEST_VERSION.to_string();
        Ok(snapshot)
    }

    /// Write `snapshot` if it differs from the file on disk. Returns whether it wrote.
    pub fn save_if_changed(&self, snapshot: &NetworkSnapshot) -> anyhow::Result<bool> {
        let path = self.path();
        let bytes = serde_json::to_vec_pretty(snapshot).context("Failed to serialize snapshot")?;

        if path.exists() {
            let current = fs::read(&path)
                .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
            if current == bytes {
                return Ok(false);
            }
        }

        write_atomic(&self.dir, &path, &bytes)?;
        tracing::debug!("Saved snapshot {}", path.display());
        Ok(true)
    }

    /// Load the snapshot into a session that is written back on commit.
    pub fn open(&self) -> anyhow::Result<SnapshotSession> {
        Ok(SnapshotSession {
            snapshot: self.load()?,
            store: self.clone(),
        })
    }
}

fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, std::process::id()));

    fs::write(&tmp_path, bytes)
        .with_context(|| format!("Failed to write tmp snapshot: {}", tmp_path.display()))?;
    if path.exists() {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove existing snapshot: {}", path.display()))?;
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename tmp snapshot: {}", tmp_path.display()))?;
    Ok(())
}

/// A loaded snapshot that is persisted on every exit path.
///
/// Network operations mutate the snapshot as each step succeeds; committing
/// writes it back whether the operation succeeded or not, so partial
/// on-chain progress is never lost from the local record.
#[derive(Debug)]
pub struct SnapshotSession {
    store: SnapshotStore,
    snapshot: NetworkSnapshot,
}

impl SnapshotSession {
    pub fn snapshot(&self) -> &NetworkSnapshot {
        &self.snapshot
    }

    pub fn snapshot_mut(&mut self) -> &mut NetworkSnapshot {
        &mut self.snapshot
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Persist the snapshot and hand back `result`.
    ///
    /// A failed save is reported on success paths; after a failed operation
    /// the original error wins and the save failure is only logged.
    pub fn commit<T, E>(self, result: Result<T, E>) -> anyhow::Result<T>
    where
        E: Into<anyhow::Error>,
    {
        let saved = self.store.save_if_changed(&self.snapshot);
        match (result, saved) {
            (Ok(value), Ok(_)) => Ok(value),
            (Ok(_), Err(save_err)) => Err(save_err),
            (Err(err), Ok(_)) => Err(err.into()),
            (Err(err), Err(save_err)) => {
                tracing::warn!("Failed to save snapshot after error: {:#}", save_err);
                Err(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeelError;
    use crate::snapshot::types::ContractRecord;
    use crate::artifacts::ContractDescriptor;
    use alloy_primitives::Address;
    use tempfile::TempDir;

    fn record() -> ContractRecord {
        ContractRecord::deployed(&ContractDescriptor::new("Greeter", "6080"), Address::repeat_byte(1))
    }

    #[test]
    fn test_load_missing_returns_new() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "dev");
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot, NetworkSnapshot::new());
        assert!(!store.exists());
    }

    #[test]
    fn test_save_if_changed_skips_identical_content() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "dev");
        let mut snapshot = NetworkSnapshot::new();
        snapshot.set_contract("Greeter", record());

        assert!(store.save_if_changed(&snapshot).unwrap());
        assert!(!store.save_if_changed(&snapshot).unwrap());
        snapshot.freeze();
        assert!(store.save_if_changed(&snapshot).unwrap());
        assert!(dir.path().join("keel.dev.json").exists());
    }

    #[test]
    fn test_load_rejects_incompatible_schema() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keel.dev.json"), r#"{"manifestVersion":"3.0"}"#).unwrap();
        let err = SnapshotStore::new(dir.path(), "dev").load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<KeelError>(),
            Some(KeelError::UnsupportedManifestVersion { .. })
        ));
    }

    #[test]
    fn test_load_migrates_tag_without_minor() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("keel.dev.json"), r#"{"manifestVersion":"2"}"#).unwrap();
        let snapshot = SnapshotStore::new(dir.path(), "dev").load().unwrap();
        assert_eq!(snapshot.manifest_version, MANIFEST_VERSION);
    }

    #[test]
    fn test_commit_persists_on_failure() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path(), "dev");
        let mut session = store.open().unwrap();
        session.snapshot_mut().set_contract("Greeter", record());

        let result: Result<(), KeelError> = Err(KeelError::InvalidRequest("boom".to_string()));
        let err = session.commit(result).unwrap_err();
        assert!(err.to_string().contains("boom"));

        let reloaded = store.load().unwrap();
        assert!(reloaded.contract("Greeter").is_some());
    }
}
