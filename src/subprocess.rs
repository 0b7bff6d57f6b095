//! A mockable, timeout-aware subprocess runner shared by the hook executor and both CLI-driven
//! backends.

use anyhow::{Context, Result};
use async_trait::async_trait;
use dyn_clone::{clone_trait_object, DynClone};
use std::{
    collections::HashMap,
    fmt::Debug,
    path::{Path, PathBuf},
    process::{ExitStatus, Output},
    time::Duration,
};
use tokio::process::Command;

#[derive(Clone, Debug, Default)]
/// A process invocation: binary, argv, environment overlay and optional working directory.
pub struct Invocation {
    pub binary: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Defaults to no timeout. The hook executor and backend drivers set this explicitly.
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug)]
/// Outcome of a completed (or timed-out) invocation.
pub struct RunOutcome {
    pub status: Option<ExitStatus>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub timed_out: bool,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.status.map(|s| s.success()).unwrap_or(false)
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[async_trait]
/// Runs subprocesses. The default implementation wraps `tokio::process::Command`; tests
/// substitute a mock to exercise backend drivers and the hook executor without touching the
/// host.
pub trait Subprocess: Debug + DynClone + Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<RunOutcome> {
        let mut cmd = Command::new(&invocation.binary);
        cmd.args(&invocation.args);
        for (k, v) in &invocation.env {
            cmd.env(k, v);
        }
        if let Some(cwd) = &invocation.cwd {
            cmd.current_dir(cwd);
        }

        let child_fut = cmd.output();
        let output: Output = match invocation.timeout {
            Some(duration) => match tokio::time::timeout(duration, child_fut).await {
                Ok(result) => result.with_context(|| {
                    format!("run {}", invocation.binary.display())
                })?,
                Err(_) => {
                    return Ok(RunOutcome {
                        status: None,
                        stdout: Vec::new(),
                        stderr: format!(
                            "{} timed out after {:?}",
                            invocation.binary.display(),
                            duration
                        )
                        .into_bytes(),
                        timed_out: true,
                    })
                }
            },
            None => child_fut
                .await
                .with_context(|| format!("run {}", invocation.binary.display()))?,
        };

        Ok(RunOutcome {
            status: Some(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
            timed_out: false,
        })
    }
}

clone_trait_object!(Subprocess);

#[derive(Clone, Debug, Default)]
pub struct DefaultSubprocess;

impl Subprocess for DefaultSubprocess {}

pub fn binary_path(name: &str) -> Result<PathBuf> {
    which::which(name).with_context(|| format!("locate {name} on PATH"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Debug)]
    struct MockSubprocess {
        called: Arc<AtomicBool>,
        outcome: Arc<dyn Fn() -> RunOutcome + Send + Sync>,
    }

    #[async_trait]
    impl Subprocess for MockSubprocess {
        async fn run(&self, _invocation: &Invocation) -> Result<RunOutcome> {
            self.called.store(true, Ordering::SeqCst);
            Ok((self.outcome)())
        }
    }

    #[tokio::test]
    async fn mock_records_invocation() {
        let called = Arc::new(AtomicBool::new(false));
        let mock = MockSubprocess {
            called: called.clone(),
            outcome: Arc::new(|| RunOutcome {
                status: None,
                stdout: b"ok".to_vec(),
                stderr: Vec::new(),
                timed_out: false,
            }),
        };
        let outcome = mock.run(&Invocation::new("/bin/true")).await.unwrap();
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(outcome.stdout_lossy(), "ok");
    }

    #[tokio::test]
    async fn default_subprocess_runs_true_and_false() {
        let runner = DefaultSubprocess;
        let ok = runner.run(&Invocation::new("/bin/true")).await.unwrap();
        assert!(ok.success());
        let bad = runner.run(&Invocation::new("/bin/false")).await.unwrap();
        assert!(!bad.success());
    }

    #[tokio::test]
    async fn timeout_is_reported_without_erroring() {
        let runner = DefaultSubprocess;
        let invocation = Invocation::new("/bin/sleep")
            .arg("5")
            .timeout(Duration::from_millis(50));
        let outcome = runner.run(&invocation).await.unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.status.is_none());
    }
}
