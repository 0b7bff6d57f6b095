//! Placeholder for a future Proxmox qemu backend, §4.6: the variant exists in the interface so
//! the router and orchestrator are already polymorphic over it, but no VM lifecycle is wired up
//! on this host yet.

use super::{Backend, BackendState, ExecRequest};
use crate::error::ShimError;
use crate::state::BackendTag;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

pub struct VmBackend;

impl VmBackend {
    pub fn new() -> Self {
        Self
    }

    fn unsupported(&self, op: &str) -> anyhow::Error {
        ShimError::Translation {
            backend: "vm".into(),
            reason: format!("{op} is not implemented by the VM backend"),
        }
        .into()
    }
}

impl Default for VmBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for VmBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Vm
    }

    async fn exists(&self, _vmid: u32) -> Result<bool> {
        Ok(false)
    }

    async fn create(&self, _vmid: u32, _bundle: &Path) -> Result<()> {
        Err(self.unsupported("create"))
    }

    async fn start(&self, _vmid: u32) -> Result<()> {
        Err(self.unsupported("start"))
    }

    async fn stop(&self, _vmid: u32, _timeout: Duration) -> Result<()> {
        Err(self.unsupported("stop"))
    }

    async fn kill(&self, _vmid: u32, _signal: &str) -> Result<()> {
        Err(self.unsupported("kill"))
    }

    async fn delete(&self, _vmid: u32) -> Result<()> {
        Err(self.unsupported("delete"))
    }

    async fn state(&self, _vmid: u32) -> Result<BackendState> {
        Err(self.unsupported("state"))
    }

    async fn exec(&self, _vmid: u32, _request: &ExecRequest) -> Result<i32> {
        Err(self.unsupported("exec"))
    }

    async fn pause(&self, _vmid: u32) -> Result<()> {
        Err(self.unsupported("pause"))
    }

    async fn resume(&self, _vmid: u32) -> Result<()> {
        Err(self.unsupported("resume"))
    }

    async fn list(&self) -> Result<Vec<u32>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_reports_unsupported() {
        let backend = VmBackend::new();
        let err = backend.create(100, Path::new("/tmp/bundle")).await.unwrap_err();
        assert!(err.to_string().contains("not implemented"));
    }

    #[tokio::test]
    async fn exists_is_always_false() {
        let backend = VmBackend::new();
        assert!(!backend.exists(100).await.unwrap());
    }

    #[tokio::test]
    async fn list_is_always_empty() {
        let backend = VmBackend::new();
        assert!(backend.list().await.unwrap().is_empty());
    }
}
