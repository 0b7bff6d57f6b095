//! Lifecycle hook execution, §4.5.

use crate::error::{Result, ShimError};
use crate::spec::Hook;
use crate::subprocess::{Invocation, Subprocess};
use log::{debug, warn};
use std::time::Duration;
use strum::{AsRefStr, Display};

const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "camelCase")]
pub enum Stage {
    Prestart,
    CreateRuntime,
    CreateContainer,
    StartContainer,
    Poststart,
    Poststop,
}

/// Whether a failing hook in this stage aborts the operation (and triggers compensation) or is
/// logged and ignored. Per OCI, only `poststop` hooks are best-effort.
impl Stage {
    pub fn is_required(&self) -> bool {
        !matches!(self, Stage::Poststop)
    }
}

#[derive(Clone, Debug)]
pub struct HookContext {
    pub container_id: String,
    pub bundle: String,
    pub state_json: String,
}

/// Runs the hooks for one stage, in listed order, to completion before returning.
pub struct HookExecutor<'a> {
    subprocess: &'a dyn Subprocess,
}

impl<'a> HookExecutor<'a> {
    pub fn new(subprocess: &'a dyn Subprocess) -> Self {
        Self { subprocess }
    }

    pub async fn run(&self, stage: Stage, hooks: &[Hook], context: &HookContext) -> Result<()> {
        for (index, hook) in hooks.iter().enumerate() {
            debug!("running {stage} hook {index} for {}", context.container_id);
            let mut invocation = Invocation::new(hook.path().clone())
                .env("OCI_CONTAINER_ID", &context.container_id)
                .env("OCI_BUNDLE", &context.bundle)
                .env("OCI_CONTAINER_STATE", &context.state_json)
                .timeout(
                    hook.timeout()
                        .map(|secs| Duration::from_secs(secs.max(0) as u64))
                        .unwrap_or(DEFAULT_HOOK_TIMEOUT),
                );
            if let Some(args) = hook.args() {
                invocation = invocation.args(args.iter().skip(1).cloned());
            }
            if let Some(env) = hook.env() {
                for entry in env {
                    if let Some((k, v)) = entry.split_once('=') {
                        invocation = invocation.env(k, v);
                    }
                }
            }

            let outcome = self
                .subprocess
                .run(&invocation)
                .await
                .map_err(|source| ShimError::HookFailure {
                    container_id: context.container_id.clone(),
                    name: format!("{stage}[{index}]"),
                    reason: source.to_string(),
                })?;

            if outcome.timed_out {
                let err = ShimError::HookFailure {
                    container_id: context.container_id.clone(),
                    name: format!("{stage}[{index}]"),
                    reason: "timed out".to_string(),
                };
                if stage.is_required() {
                    return Err(err);
                }
                warn!("optional hook timed out: {err}");
                continue;
            }

            if !outcome.success() {
                let err = ShimError::HookFailure {
                    container_id: context.container_id.clone(),
                    name: format!("{stage}[{index}]"),
                    reason: outcome.stderr_lossy(),
                };
                if stage.is_required() {
                    return Err(err);
                }
                warn!("optional hook failed, continuing: {err}");
            }
        }
        Ok(())
    }
}
