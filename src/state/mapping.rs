//! The bidirectional OCI-id ↔ VMID mapping, §3.3/§4.4.

use super::lock::LockGuard;
use crate::error::{Result, ShimError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

/// Proxmox's reserved VMID range.
pub const VMID_MIN: u32 = 100;
pub const VMID_MAX: u32 = 999_999;

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
struct MappingFile {
    /// id -> (vmid, bundle path). The inverse is derived and checked for consistency on load.
    entries: HashMap<String, (u32, PathBuf)>,
}

/// Allocates and releases VMIDs, maintaining the id<->VMID bijection under a single lock file.
pub struct IdentityMapper {
    path: PathBuf,
    lock_path: PathBuf,
    floor: u32,
}

impl IdentityMapper {
    pub fn open(root: &Path, floor: u32) -> Result<Self> {
        fs::create_dir_all(root)?;
        let mapper = Self {
            path: root.join("mapping.json"),
            lock_path: root.join(".mapping.lock"),
            floor: floor.max(VMID_MIN),
        };
        if !mapper.path.exists() {
            mapper.write(&MappingFile::default())?;
        }
        Ok(mapper)
    }

    fn read(&self) -> Result<MappingFile> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MappingFile::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&bytes).map_err(|source| ShimError::Corruption {
            path: self.path.clone(),
            reason: source.to_string(),
        })
    }

    fn write(&self, mapping: &MappingFile) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(mapping).map_err(|source| ShimError::Corruption {
            path: self.path.clone(),
            reason: source.to_string(),
        })?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Allocate the lowest free VMID at or above the configured floor and record `id` ↔ `vmid`.
    pub fn allocate(&self, id: &str, bundle: &Path) -> Result<u32> {
        let _guard = LockGuard::acquire(&self.lock_path)?;
        let mut mapping = self.read()?;
        if let Some((existing, _)) = mapping.entries.get(id) {
            return Ok(*existing);
        }
        let used: std::collections::HashSet<u32> =
            mapping.entries.values().map(|(vmid, _)| *vmid).collect();
        let mut candidate = self.floor;
        while used.contains(&candidate) {
            candidate = candidate
                .checked_add(1)
                .ok_or_else(|| ShimError::ResourceExhaustion("VMID space exhausted".into()))?;
            if candidate > VMID_MAX {
                return Err(ShimError::ResourceExhaustion(
                    "no free VMID within the Proxmox range".into(),
                ));
            }
        }
        mapping
            .entries
            .insert(id.to_string(), (candidate, bundle.to_path_buf()));
        self.write(&mapping)?;
        debug!("allocated vmid {candidate} for {id}");
        Ok(candidate)
    }

    pub fn resolve_vmid(&self, id: &str) -> Result<Option<u32>> {
        Ok(self.read()?.entries.get(id).map(|(vmid, _)| *vmid))
    }

    pub fn resolve_id(&self, vmid: u32) -> Result<Option<String>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .find(|(_, (v, _))| *v == vmid)
            .map(|(id, _)| id.clone()))
    }

    pub fn resolve_bundle(&self, id: &str) -> Result<Option<PathBuf>> {
        Ok(self.read()?.entries.get(id).map(|(_, bundle)| bundle.clone()))
    }

    /// Idempotent: releasing an id that is not mapped is not an error.
    pub fn release(&self, id: &str) -> Result<()> {
        let _guard = LockGuard::acquire(&self.lock_path)?;
        let mut mapping = self.read()?;
        mapping.entries.remove(id);
        self.write(&mapping)
    }

    pub fn all(&self) -> Result<Vec<(String, u32)>> {
        Ok(self
            .read()?
            .entries
            .iter()
            .map(|(id, (vmid, _))| (id.clone(), *vmid))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn allocate_is_idempotent_per_id() {
        let dir = TempDir::new().unwrap();
        let mapper = IdentityMapper::open(dir.path(), 100).unwrap();
        let a = mapper.allocate("t1", Path::new("/tmp/b")).unwrap();
        let b = mapper.allocate("t1", Path::new("/tmp/b")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn allocate_picks_lowest_free_above_floor() {
        let dir = TempDir::new().unwrap();
        let mapper = IdentityMapper::open(dir.path(), 100).unwrap();
        let a = mapper.allocate("a", Path::new("/tmp/a")).unwrap();
        let b = mapper.allocate("b", Path::new("/tmp/b")).unwrap();
        assert_eq!(a, 100);
        assert_eq!(b, 101);
    }

    #[test]
    fn release_then_allocate_reuses_vmid() {
        let dir = TempDir::new().unwrap();
        let mapper = IdentityMapper::open(dir.path(), 100).unwrap();
        let a = mapper.allocate("a", Path::new("/tmp/a")).unwrap();
        mapper.release("a").unwrap();
        let b = mapper.allocate("b", Path::new("/tmp/b")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn release_unknown_id_is_ok() {
        let dir = TempDir::new().unwrap();
        let mapper = IdentityMapper::open(dir.path(), 100).unwrap();
        mapper.release("never-allocated").unwrap();
    }

    #[test]
    fn bijection_holds_after_interleaved_allocate_release() {
        let dir = TempDir::new().unwrap();
        let mapper = IdentityMapper::open(dir.path(), 100).unwrap();
        let a = mapper.allocate("a", Path::new("/a")).unwrap();
        let _b = mapper.allocate("b", Path::new("/b")).unwrap();
        mapper.release("a").unwrap();
        let c = mapper.allocate("c", Path::new("/c")).unwrap();
        assert_eq!(c, a, "freed vmid must be reused before scanning higher");
        assert_eq!(mapper.resolve_id(c).unwrap().as_deref(), Some("c"));
        assert_eq!(mapper.resolve_vmid("a").unwrap(), None);
    }
}
