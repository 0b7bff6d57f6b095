//! Drives `crun`/`runc` by invoking its CLI, §4.6.1.

use super::{Backend, BackendState, ContainerLifecycle, ExecRequest};
use crate::state::BackendTag;
use crate::subprocess::{DefaultSubprocess, Invocation, Subprocess};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
    time::Duration,
};

/// Mirrors `runc state`'s JSON output closely enough to recover lifecycle + pid + exit code.
#[derive(Deserialize)]
struct RuntimeState {
    status: String,
    pid: Option<i32>,
    #[serde(default)]
    #[allow(dead_code)]
    bundle: Option<String>,
}

#[derive(Clone, Copy, Debug)]
enum GlobalArg<'a> {
    Root(&'a Path),
    SystemdCgroup,
}

impl Display for GlobalArg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlobalArg::Root(path) => write!(f, "--root={}", path.display()),
            GlobalArg::SystemdCgroup => write!(f, "--systemd-cgroup"),
        }
    }
}

/// Options that shape a single `create` invocation, mirrored from the CLI verb's flags (§6).
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    pub pid_file: Option<PathBuf>,
    pub console_socket: Option<PathBuf>,
    pub no_pivot: bool,
    pub no_new_keyring: bool,
}

pub struct NativeRuntimeBackend {
    binary: PathBuf,
    /// The runtime's own `--root`, distinct from this shim's `--root` (§4.3 vs §4.6.1).
    runtime_root: PathBuf,
    systemd_cgroup: bool,
    subprocess: Box<dyn Subprocess>,
    create_options: CreateOptions,
}

impl NativeRuntimeBackend {
    pub fn new(binary: PathBuf, runtime_root: PathBuf, systemd_cgroup: bool) -> Self {
        Self {
            binary,
            runtime_root,
            systemd_cgroup,
            subprocess: Box::new(DefaultSubprocess),
            create_options: CreateOptions::default(),
        }
    }

    pub fn with_create_options(mut self, options: CreateOptions) -> Self {
        self.create_options = options;
        self
    }

    #[cfg(test)]
    fn with_subprocess(mut self, subprocess: Box<dyn Subprocess>) -> Self {
        self.subprocess = subprocess;
        self
    }

    fn global_args(&self) -> Vec<String> {
        let mut args = vec![GlobalArg::Root(&self.runtime_root).to_string()];
        if self.systemd_cgroup {
            args.push(GlobalArg::SystemdCgroup.to_string());
        }
        args
    }

    async fn run(&self, subcommand_args: Vec<String>) -> Result<crate::subprocess::RunOutcome> {
        let invocation = Invocation::new(self.binary.clone())
            .args(self.global_args())
            .args(subcommand_args)
            .timeout(Duration::from_secs(30));
        self.subprocess.run(&invocation).await
    }
}

fn vmid_str(vmid: u32) -> String {
    vmid.to_string()
}

#[async_trait]
impl Backend for NativeRuntimeBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Crun
    }

    async fn exists(&self, vmid: u32) -> Result<bool> {
        let outcome = self.run(vec!["state".into(), vmid_str(vmid)]).await?;
        Ok(outcome.success())
    }

    async fn create(&self, vmid: u32, bundle: &Path) -> Result<()> {
        let mut args = vec![
            "create".to_string(),
            format!("--bundle={}", bundle.display()),
        ];
        if self.create_options.no_pivot {
            args.push("--no-pivot".into());
        }
        if self.create_options.no_new_keyring {
            args.push("--no-new-keyring".into());
        }
        if let Some(pid_file) = &self.create_options.pid_file {
            args.push(format!("--pid-file={}", pid_file.display()));
        }
        if let Some(console_socket) = &self.create_options.console_socket {
            args.push(format!("--console-socket={}", console_socket.display()));
        }
        args.push(vmid_str(vmid));
        let outcome = self.run(args).await?;
        if !outcome.success() {
            bail!("create failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn start(&self, vmid: u32) -> Result<()> {
        let outcome = self.run(vec!["start".into(), vmid_str(vmid)]).await?;
        if !outcome.success() {
            bail!("start failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn stop(&self, vmid: u32, timeout: Duration) -> Result<()> {
        self.kill(vmid, "SIGTERM").await?;
        tokio::time::sleep(timeout).await;
        let state = self.state(vmid).await?;
        if state.lifecycle != ContainerLifecycle::Stopped {
            self.kill(vmid, "SIGKILL").await?;
        }
        Ok(())
    }

    async fn kill(&self, vmid: u32, signal: &str) -> Result<()> {
        let outcome = self
            .run(vec!["kill".into(), vmid_str(vmid), signal.to_string()])
            .await?;
        if !outcome.success() {
            bail!("kill failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn delete(&self, vmid: u32) -> Result<()> {
        let outcome = self.run(vec!["delete".into(), vmid_str(vmid)]).await?;
        if !outcome.success() {
            bail!("delete failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn state(&self, vmid: u32) -> Result<BackendState> {
        let outcome = self.run(vec!["state".into(), vmid_str(vmid)]).await?;
        if !outcome.success() {
            bail!("state failed: {}", outcome.stderr_lossy());
        }
        let parsed: RuntimeState = serde_json::from_slice(&outcome.stdout)
            .context("parse runtime state JSON")?;
        let lifecycle = match parsed.status.as_str() {
            "created" => ContainerLifecycle::Created,
            "running" => ContainerLifecycle::Running,
            "paused" => ContainerLifecycle::Paused,
            "stopped" => ContainerLifecycle::Stopped,
            other => bail!("unrecognized runtime state: {other}"),
        };
        Ok(BackendState {
            lifecycle,
            pid: parsed.pid,
            exit_code: None,
        })
    }

    async fn exec(&self, vmid: u32, request: &ExecRequest) -> Result<i32> {
        let mut args = vec!["exec".to_string()];
        if let Some(cwd) = &request.cwd {
            args.push(format!("--cwd={cwd}"));
        }
        for env in &request.env {
            args.push(format!("--env={env}"));
        }
        if let Some(user) = &request.user {
            args.push(format!("--user={user}"));
        }
        if request.tty {
            args.push("--tty".into());
        }
        args.push(vmid_str(vmid));
        args.extend(request.argv.iter().cloned());
        let outcome = self.run(args).await?;
        Ok(outcome.status.and_then(|s| s.code()).unwrap_or(-1))
    }

    async fn pause(&self, vmid: u32) -> Result<()> {
        let outcome = self.run(vec!["pause".into(), vmid_str(vmid)]).await?;
        if !outcome.success() {
            bail!("pause failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn resume(&self, vmid: u32) -> Result<()> {
        let outcome = self.run(vec!["resume".into(), vmid_str(vmid)]).await?;
        if !outcome.success() {
            bail!("resume failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<u32>> {
        let outcome = self.run(vec!["list".into(), "--format=json".into()]).await?;
        if !outcome.success() {
            bail!("list failed: {}", outcome.stderr_lossy());
        }
        #[derive(Deserialize)]
        struct Entry {
            id: String,
        }
        let entries: Vec<Entry> =
            serde_json::from_slice(&outcome.stdout).context("parse runtime list JSON")?;
        Ok(entries
            .into_iter()
            .filter_map(|e| e.id.parse::<u32>().ok())
            .collect())
    }

    fn supports_checkpoint(&self) -> bool {
        true
    }

    async fn checkpoint(&self, vmid: u32, image_path: &Path) -> Result<()> {
        let outcome = self
            .run(vec![
                "checkpoint".into(),
                format!("--image-path={}", image_path.display()),
                vmid_str(vmid),
            ])
            .await?;
        if !outcome.success() {
            bail!("checkpoint failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn restore(&self, vmid: u32, image_path: &Path) -> Result<()> {
        let outcome = self
            .run(vec![
                "restore".into(),
                format!("--image-path={}", image_path.display()),
                vmid_str(vmid),
            ])
            .await?;
        if !outcome.success() {
            bail!("restore failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }
}
