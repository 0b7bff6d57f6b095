//! Persistent per-container records: one file per id, atomic rename on write, a process-wide
//! advisory lock guarding read-modify-write.

use super::lock::LockGuard;
use super::record::ContainerRecord;
use crate::error::{Result, ShimError};
use log::{trace, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// File-per-id persistence under `<root>/state/`, matching §4.3's crash-consistency contract.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn open(root: &Path) -> Result<Self> {
        let dir = root.join("state");
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    fn lock_path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!(".{id}.lock"))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.path_for(id).exists()
    }

    /// Acquires this id's advisory lock without touching its record. Lets a caller (`create`)
    /// serialize a whole read-check-then-write sequence instead of only the final write.
    pub fn lock(&self, id: &str) -> Result<LockGuard> {
        LockGuard::acquire(&self.lock_path_for(id))
            .map_err(|source| ShimError::Io(std::io::Error::other(source.to_string())))
    }

    /// Read a record. Missing files are `Ok(None)`; malformed files are `Corruption`, never
    /// silently discarded.
    pub fn load(&self, id: &str) -> Result<Option<ContainerRecord>> {
        let path = self.path_for(id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        trace!("loaded {} bytes for {id}", bytes.len());
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| {
                warn!("state record for {id} is corrupt: {source}");
                ShimError::Corruption {
                    path,
                    reason: source.to_string(),
                }
            })
    }

    /// Write `record`, replacing any existing record for its id, via write-temp-then-rename.
    pub fn save(&self, record: &ContainerRecord) -> Result<()> {
        let _guard = LockGuard::acquire(&self.lock_path_for(record.id()))?;
        self.write_atomic(record)
    }

    /// Writes without acquiring the per-id lock; for callers (`Orchestrator::create`) that
    /// already hold it across a larger read-check-then-write sequence.
    pub(crate) fn write_atomic(&self, record: &ContainerRecord) -> Result<()> {
        let path = self.path_for(record.id());
        let tmp = self.dir.join(format!(".{}.tmp", record.id()));
        let bytes = serde_json::to_vec_pretty(record).map_err(|source| ShimError::Corruption {
            path: path.clone(),
            reason: source.to_string(),
        })?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        trace!("persisted record for {}", record.id());
        Ok(())
    }

    /// Read-modify-write under the per-id lock. `mutator` receives the existing record (or
    /// `None` if absent) and returns the record to persist, or an error to abort without
    /// writing. `expected_state` is checked before invoking `mutator`, so callers get a single
    /// place to enforce §4.1 transition legality.
    pub fn compare_and_swap<F>(
        &self,
        id: &str,
        expected: Option<crate::state::record::LifecycleState>,
        mutator: F,
    ) -> Result<ContainerRecord>
    where
        F: FnOnce(Option<ContainerRecord>) -> Result<ContainerRecord>,
    {
        let _guard = LockGuard::acquire(&self.lock_path_for(id))?;
        let current = self.load(id)?;
        if let (Some(expected), Some(current)) = (expected, &current) {
            if current.state() != expected {
                return Err(ShimError::StateTransition {
                    container_id: id.to_string(),
                    from: current.state().to_string(),
                    to: expected.to_string(),
                });
            }
        }
        let next = mutator(current)?;
        self.write_atomic(&next)?;
        Ok(next)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let _guard = LockGuard::acquire(&self.lock_path_for(id))?;
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }?;
        let _ = fs::remove_file(self.lock_path_for(id));
        Ok(())
    }

    /// All ids currently recorded, regardless of lifecycle state.
    pub fn list(&self) -> Result<Vec<ContainerRecord>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.ends_with(".json") {
                continue;
            }
            let id = name.trim_end_matches(".json");
            if let Some(record) = self.load(id)? {
                out.push(record);
            }
        }
        Ok(out)
    }
}
