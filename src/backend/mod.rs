//! The uniform backend capability set, §4.6. The orchestrator never branches on the concrete
//! backend except during router selection.

pub mod lxc;
pub mod native;
pub mod vm;

use crate::state::BackendTag;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerLifecycle {
    Created,
    Running,
    Paused,
    Stopped,
}

#[derive(Clone, Debug)]
pub struct BackendState {
    pub lifecycle: ContainerLifecycle,
    pub pid: Option<i32>,
    pub exit_code: Option<i32>,
}

#[derive(Clone, Debug, Default)]
pub struct ExecRequest {
    pub argv: Vec<String>,
    pub env: Vec<String>,
    pub cwd: Option<String>,
    pub user: Option<String>,
    pub tty: bool,
}

/// Output of a realized translation, materialized before any backend side effect is invoked
/// (§4.6.2's "pure, then one-step materialization" rule applies to every backend).
#[async_trait]
pub trait Backend: Send + Sync {
    fn tag(&self) -> BackendTag;

    async fn exists(&self, vmid: u32) -> Result<bool>;
    async fn create(&self, vmid: u32, bundle: &std::path::Path) -> Result<()>;
    async fn start(&self, vmid: u32) -> Result<()>;
    async fn stop(&self, vmid: u32, timeout: Duration) -> Result<()>;
    async fn kill(&self, vmid: u32, signal: &str) -> Result<()>;
    async fn delete(&self, vmid: u32) -> Result<()>;
    async fn state(&self, vmid: u32) -> Result<BackendState>;
    async fn exec(&self, vmid: u32, request: &ExecRequest) -> Result<i32>;
    async fn pause(&self, vmid: u32) -> Result<()>;
    async fn resume(&self, vmid: u32) -> Result<()>;
    async fn list(&self) -> Result<Vec<u32>>;

    /// Checkpoint support is optional; backends that lack it return `Ok(false)` from
    /// `supports_checkpoint` and the orchestrator reports a `Translation` error upstream.
    fn supports_checkpoint(&self) -> bool {
        false
    }

    async fn checkpoint(&self, _vmid: u32, _image_path: &std::path::Path) -> Result<()> {
        anyhow::bail!("checkpoint is not supported by this backend")
    }

    async fn restore(&self, _vmid: u32, _image_path: &std::path::Path) -> Result<()> {
        anyhow::bail!("restore is not supported by this backend")
    }
}
