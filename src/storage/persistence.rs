//! Whole-store JSON snapshot written to a single file.

use crate::core::{CounterSnapshot, Result, TallyError};
use std::path::{Path, PathBuf};
use tokio::fs;

// ============================================================================
// Atomic file writes
// ============================================================================

/// `<name>.tmp` next to `path`, keeping the full file name so `foo.json` and
/// `foo.snap` never share a temp file.
fn temp_path(path: &Path) -> Result<PathBuf> {
    let mut name = path
        .file_name()
        .ok_or_else(|| {
            TallyError::PersistFailed(format!("'{}' does not name a file", path.display()))
        })?
        .to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

/// Writes `bytes` to a sibling temp file and renames it over `path`, so a
/// reader never observes a partially written snapshot.
pub(crate) async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| {
            TallyError::PersistFailed(format!(
                "Failed to create parent directory '{}': {}",
                parent.display(),
                err
            ))
        })?;
    }

    let tmp = temp_path(path)?;
    fs::write(&tmp, bytes).await.map_err(|err| {
        TallyError::PersistFailed(format!(
            "Failed to write temp file '{}': {}",
            tmp.display(),
            err
        ))
    })?;

    fs::rename(&tmp, path).await.map_err(|err| {
        TallyError::PersistFailed(format!(
            "Failed to rename temp file '{}' -> '{}': {}",
            tmp.display(),
            path.display(),
            err
        ))
    })?;
    Ok(())
}

// ============================================================================
// Snapshot File
// ============================================================================

/// Single-file backing store for the counter map.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Replaces the file with `bytes` in one step.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        atomic_write(&self.path, bytes).await
    }

    pub async fn load(&self) -> Result<CounterSnapshot> {
        let bytes = fs::read(&self.path).await.map_err(|err| {
            TallyError::LoadFailed(format!(
                "Could not open database file '{}': {}",
                self.path.display(),
                err
            ))
        })?;
        decode_snapshot(&bytes).map_err(|err| match err {
            TallyError::LoadFailed(msg) => {
                TallyError::LoadFailed(format!("{} ({})", msg, self.path.display()))
            }
            other => other,
        })
    }
}

pub fn encode_snapshot(snapshot: &CounterSnapshot) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(snapshot)
        .map_err(|err| TallyError::PersistFailed(format!("serialize snapshot: {}", err)))
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<CounterSnapshot> {
    serde_json::from_slice(bytes)
        .map_err(|err| TallyError::LoadFailed(format!("parse snapshot: {}", err)))
}
