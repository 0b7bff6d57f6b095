//! Linux namespace identification, shared by the spec model, validator and LXC translator.

use crate::spec::LinuxNamespaceType;
use std::path::PathBuf;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
/// A namespace to join or create, either a type to create fresh or a path to an existing
/// namespace persisted on disk.
pub struct Namespace {
    pub typ: LinuxNamespaceType,
    pub path: Option<PathBuf>,
}

impl Namespace {
    pub fn new(typ: LinuxNamespaceType) -> Self {
        Self { typ, path: None }
    }

    pub fn joining(typ: LinuxNamespaceType, path: PathBuf) -> Self {
        Self {
            typ,
            path: Some(path),
        }
    }

    /// True if this namespace is joined from an existing path rather than created fresh.
    pub fn is_join(&self) -> bool {
        self.path.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_has_no_path() {
        let ns = Namespace::new(LinuxNamespaceType::Pid);
        assert!(!ns.is_join());
    }

    #[test]
    fn joining_carries_path() {
        let ns = Namespace::joining(LinuxNamespaceType::Network, PathBuf::from("/proc/123/ns/net"));
        assert!(ns.is_join());
    }
}
