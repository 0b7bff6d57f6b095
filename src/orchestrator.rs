//! The lifecycle orchestrator, §4.7: wires the validator, identity mapper, router, hook
//! executor, backends and state store together into the verbs the CLI invokes.

use crate::backend::{lxc::LxcBackend, native::NativeRuntimeBackend, vm::VmBackend, Backend, ExecRequest};
use crate::config::Config;
use crate::error::{Result, ShimError};
use crate::hooks::{HookContext, HookExecutor, Stage};
use crate::router::{RouteRequest, Router};
use crate::spec::{Hook, Hooks, Spec};
use crate::state::record::{BackendTag, ContainerRecord, LifecycleState};
use crate::state::{IdentityMapper, StateStore};
use crate::subprocess::{DefaultSubprocess, Subprocess};
use crate::validate;
use anyhow::Context;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn hooks_for<'a>(hooks: Option<&'a Hooks>, pick: impl Fn(&'a Hooks) -> &'a Option<Vec<Hook>>) -> &'a [Hook] {
    hooks
        .and_then(|h| pick(h).as_ref())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn backend_failure(container_id: &str, reason: &str, source: anyhow::Error) -> ShimError {
    ShimError::BackendFailure {
        container_id: container_id.to_string(),
        reason: reason.to_string(),
        source: Some(source),
    }
}

/// One row of `list`'s output: a backend-reported vmid, unioned against its state record if one
/// exists. `orphan` is set when only one side knows about the container.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ListedContainer {
    pub vmid: u32,
    pub backend: BackendTag,
    pub orphan: bool,
    pub record: Option<ContainerRecord>,
}

/// Owns every collaborator a verb touches. One instance per process invocation.
pub struct Orchestrator {
    state: StateStore,
    mapper: IdentityMapper,
    subprocess: Box<dyn Subprocess>,
    native: NativeRuntimeBackend,
    lxc: LxcBackend,
    vm: VmBackend,
    id_patterns: Vec<(String, String)>,
    default_backend: String,
}

impl Orchestrator {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let state = StateStore::open(config.root()).context("open state store")?;
        let mapper = IdentityMapper::open(config.root(), *config.vmid_floor())
            .context("open identity mapper")?;

        let native_binary = crate::subprocess::binary_path("crun")
            .or_else(|_| crate::subprocess::binary_path("runc"))
            .context("locate a native OCI runtime (crun or runc) on PATH")?;
        let native = NativeRuntimeBackend::new(
            native_binary,
            config.root().join("runtime"),
            *config.systemd_cgroup(),
        );

        let pct_binary = crate::subprocess::binary_path("pct").unwrap_or_else(|_| PathBuf::from("pct"));
        let lxc = LxcBackend::new(pct_binary, config.root().join("lxc"));

        Ok(Self {
            state,
            mapper,
            subprocess: Box::new(DefaultSubprocess),
            native,
            lxc,
            vm: VmBackend::new(),
            id_patterns: config.id_patterns().clone(),
            default_backend: config.default_backend().clone(),
        })
    }

    fn backend_for(&self, tag: BackendTag) -> &dyn Backend {
        match tag {
            BackendTag::Crun => &self.native,
            BackendTag::Lxc => &self.lxc,
            BackendTag::Vm => &self.vm,
        }
    }

    fn hook_executor(&self) -> HookExecutor<'_> {
        HookExecutor::new(self.subprocess.as_ref())
    }

    fn hook_context(&self, id: &str, bundle: &Path, status: &str) -> HookContext {
        HookContext {
            container_id: id.to_string(),
            bundle: bundle.display().to_string(),
            state_json: serde_json::json!({ "id": id, "status": status }).to_string(),
        }
    }

    /// §4.7 `create`: parse+validate, allocate a VMID, pick a backend, run the pre-creation
    /// hooks, materialize and invoke the backend, then persist a `created` record. Every step
    /// after VMID allocation compensates (releases the VMID) on failure.
    pub async fn create(
        &self,
        id: &str,
        bundle: &Path,
        explicit: Option<BackendTag>,
    ) -> Result<ContainerRecord> {
        // Held for the whole create sequence, not just the final save: otherwise two concurrent
        // creates on the same id could both pass the exists check before either writes a record.
        let _id_lock = self.state.lock(id)?;
        if self.state.exists(id) {
            return Err(ShimError::IdConflict(id.to_string()));
        }

        let spec = Spec::parse(bundle)?;
        validate::validate(&spec)?;
        validate::validate_host_paths(&spec, bundle)?;

        let vmid = self.mapper.allocate(id, bundle)?;

        let router = Router::new(&self.id_patterns, &self.default_backend);
        let tag = match router.resolve(id, &spec, &RouteRequest { explicit }) {
            Some(tag) => tag,
            None => {
                let _ = self.mapper.release(id);
                return Err(ShimError::UsageError(format!(
                    "no backend resolved for {id} (check --runtime, annotations, and id patterns)"
                )));
            }
        };

        let hook_ctx = self.hook_context(id, bundle, "creating");
        let executor = self.hook_executor();
        let hooks = spec.hooks().as_ref();
        for stage in [Stage::Prestart, Stage::CreateRuntime, Stage::CreateContainer] {
            let stage_hooks = match stage {
                Stage::Prestart => hooks_for(hooks, |h| h.prestart()),
                Stage::CreateRuntime => hooks_for(hooks, |h| h.create_runtime()),
                Stage::CreateContainer => hooks_for(hooks, |h| h.create_container()),
                _ => unreachable!(),
            };
            if let Err(err) = executor.run(stage, stage_hooks, &hook_ctx).await {
                let _ = self.mapper.release(id);
                return Err(err);
            }
        }

        let backend = self.backend_for(tag);
        if let Err(source) = backend.create(vmid, bundle).await {
            let _ = backend.delete(vmid).await;
            let _ = self.mapper.release(id);
            return Err(backend_failure(id, "create", source));
        }

        let annotations = spec.annotations().clone().unwrap_or_default();
        let record = ContainerRecord::new(id, vmid, tag, bundle.to_path_buf(), now(), annotations);
        self.state.write_atomic(&record)?;
        Ok(record)
    }

    /// §4.7 `start`: only legal from `created`/`stopped`; runs `startContainer` then
    /// `poststart`, persisting `running` with the backend-reported pid in between.
    pub async fn start(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        if !matches!(record.state(), LifecycleState::Created | LifecycleState::Stopped) {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: LifecycleState::Running.to_string(),
            });
        }

        let spec = Spec::parse(record.bundle()).ok();
        let hooks = spec.as_ref().and_then(|s| s.hooks().as_ref());
        let hook_ctx = self.hook_context(id, record.bundle(), "starting");
        self.hook_executor()
            .run(Stage::StartContainer, hooks_for(hooks, |h| h.start_container()), &hook_ctx)
            .await?;

        let backend = self.backend_for(record.backend());
        backend
            .start(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "start", source))?;
        let backend_state = backend
            .state(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "state", source))?;

        let previous_state = record.state();
        let updated = self.state.compare_and_swap(id, Some(previous_state), |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_state(LifecycleState::Running);
            r.set_pid(backend_state.pid);
            r.set_started_at(Some(now()));
            Ok(r)
        })?;

        let poststart_ctx = self.hook_context(id, record.bundle(), "running");
        self.hook_executor()
            .run(Stage::Poststart, hooks_for(hooks, |h| h.poststart()), &poststart_ctx)
            .await?;
        Ok(updated)
    }

    /// §4.7 `stop`: graceful stop with `timeout`, degrading to the backend's own SIGKILL path
    /// when the backend doesn't report forward progress; always runs `poststop`.
    pub async fn stop(&self, id: &str, timeout: Duration) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        if record.state() != LifecycleState::Running {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: LifecycleState::Stopped.to_string(),
            });
        }
        let backend = self.backend_for(record.backend());
        backend
            .stop(record.vmid(), timeout)
            .await
            .map_err(|source| backend_failure(id, "stop", source))?;

        let updated = self.state.compare_and_swap(id, Some(LifecycleState::Running), |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_state(LifecycleState::Stopped);
            r.set_finished_at(Some(now()));
            r.set_exit_code(Some(0));
            r.set_exit_reason(Some("stopped".to_string()));
            Ok(r)
        })?;

        let spec = Spec::parse(record.bundle()).ok();
        let hooks = spec.as_ref().and_then(|s| s.hooks().as_ref());
        let hook_ctx = self.hook_context(id, record.bundle(), "stopped");
        self.hook_executor()
            .run(Stage::Poststop, hooks_for(hooks, |h| h.poststop()), &hook_ctx)
            .await?;
        Ok(updated)
    }

    /// §4.7 `kill`: sends `signal` if the backend distinguishes signals, else degrades to
    /// `stop` with a zero timeout (both `LxcBackend` and `NativeRuntimeBackend` already do this
    /// in their own `kill`).
    pub async fn kill(&self, id: &str, signal: &str) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        if !matches!(record.state(), LifecycleState::Created | LifecycleState::Running) {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: LifecycleState::Stopped.to_string(),
            });
        }
        let backend = self.backend_for(record.backend());
        backend
            .kill(record.vmid(), signal)
            .await
            .map_err(|source| backend_failure(id, "kill", source))?;

        self.state.compare_and_swap(id, None, |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_state(LifecycleState::Stopped);
            r.set_finished_at(Some(now()));
            r.set_exit_reason(Some(format!("killed by {signal}")));
            Ok(r)
        })
    }

    /// §4.7 `delete`: requires `stopped` unless `force` (then a best-effort stop runs first);
    /// tears down backend state, releases the VMID, and removes the record. `poststop` runs
    /// only if this path is the one that first transitions the container to `stopped`.
    pub async fn delete(&self, id: &str, force: bool) -> Result<()> {
        let record = self.require(id)?;
        let mut ran_poststop_here = false;
        if record.state() != LifecycleState::Stopped {
            if !force {
                return Err(ShimError::StateTransition {
                    container_id: id.to_string(),
                    from: record.state().to_string(),
                    to: LifecycleState::Stopped.to_string(),
                });
            }
            if record.state() == LifecycleState::Running {
                self.stop(id, Duration::from_secs(0)).await?;
                ran_poststop_here = true;
            } else {
                // Never started: nothing for the backend to stop, just record the transition.
                self.state.compare_and_swap(id, None, |existing| {
                    let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
                    r.set_state(LifecycleState::Stopped);
                    r.set_finished_at(Some(now()));
                    r.set_exit_reason(Some("deleted without starting".to_string()));
                    Ok(r)
                })?;
            }
        }

        let backend = self.backend_for(record.backend());
        backend
            .delete(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "delete", source))?;

        self.mapper.release(id)?;
        self.state.delete(id)?;

        if !ran_poststop_here {
            let spec = Spec::parse(record.bundle()).ok();
            let hooks = spec.as_ref().and_then(|s| s.hooks().as_ref());
            let hook_ctx = self.hook_context(id, record.bundle(), "deleted");
            self.hook_executor()
                .run(Stage::Poststop, hooks_for(hooks, |h| h.poststop()), &hook_ctx)
                .await?;
        }
        Ok(())
    }

    /// §4.7 `state`: the persisted record reconciled against the backend's live view.
    pub async fn state(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        let backend = self.backend_for(record.backend());
        let live = backend
            .state(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "state", source))?;

        self.state.compare_and_swap(id, None, |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_pid(live.pid);
            Ok(r)
        })
    }

    pub async fn pause(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        if record.state() != LifecycleState::Running {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: LifecycleState::Paused.to_string(),
            });
        }
        let backend = self.backend_for(record.backend());
        backend
            .pause(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "pause", source))?;
        self.state.compare_and_swap(id, Some(LifecycleState::Running), |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_state(LifecycleState::Paused);
            Ok(r)
        })
    }

    pub async fn resume(&self, id: &str) -> Result<ContainerRecord> {
        let record = self.require(id)?;
        if record.state() != LifecycleState::Paused {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: LifecycleState::Running.to_string(),
            });
        }
        let backend = self.backend_for(record.backend());
        backend
            .resume(record.vmid())
            .await
            .map_err(|source| backend_failure(id, "resume", source))?;
        self.state.compare_and_swap(id, Some(LifecycleState::Paused), |existing| {
            let mut r = existing.ok_or_else(|| ShimError::NotFound(id.to_string()))?;
            r.set_state(LifecycleState::Running);
            Ok(r)
        })
    }

    /// Checkpoints a running container, if the backend reports support.
    pub async fn checkpoint(&self, id: &str, image_path: &Path) -> Result<()> {
        let record = self.require(id)?;
        let backend = self.backend_for(record.backend());
        if !backend.supports_checkpoint() {
            return Err(ShimError::Translation {
                backend: record.backend().to_string(),
                reason: "checkpoint is not supported by this backend".to_string(),
            });
        }
        backend
            .checkpoint(record.vmid(), image_path)
            .await
            .map_err(|source| backend_failure(id, "checkpoint", source))
    }

    /// Restores a container from a checkpoint image, if the backend reports support.
    pub async fn restore(&self, id: &str, image_path: &Path) -> Result<()> {
        let record = self.require(id)?;
        let backend = self.backend_for(record.backend());
        if !backend.supports_checkpoint() {
            return Err(ShimError::Translation {
                backend: record.backend().to_string(),
                reason: "restore is not supported by this backend".to_string(),
            });
        }
        backend
            .restore(record.vmid(), image_path)
            .await
            .map_err(|source| backend_failure(id, "restore", source))
    }

    pub async fn exec(&self, id: &str, request: &ExecRequest) -> Result<i32> {
        let record = self.require(id)?;
        if record.state() != LifecycleState::Running {
            return Err(ShimError::StateTransition {
                container_id: id.to_string(),
                from: record.state().to_string(),
                to: "exec".to_string(),
            });
        }
        let backend = self.backend_for(record.backend());
        backend
            .exec(record.vmid(), request)
            .await
            .map_err(|source| backend_failure(id, "exec", source))
    }

    /// §4.7 `list`: the state store's records unioned with each backend's own `list`, tagging
    /// entries present on only one side as orphans. `filter` restricts the union to a single
    /// backend, mirroring the `--runtime` CLI flag.
    pub async fn list(&self, filter: Option<BackendTag>) -> Result<Vec<ListedContainer>> {
        let tags: Vec<BackendTag> = match filter {
            Some(tag) => vec![tag],
            None => vec![BackendTag::Crun, BackendTag::Lxc, BackendTag::Vm],
        };

        let mut by_key: HashMap<(BackendTag, u32), ContainerRecord> = self
            .state
            .list()?
            .into_iter()
            .filter(|record| tags.contains(&record.backend()))
            .map(|record| ((record.backend(), record.vmid()), record))
            .collect();

        let mut out = Vec::new();
        for tag in &tags {
            let live = self.backend_for(*tag).list().await.unwrap_or_default();
            for vmid in live {
                let record = by_key.remove(&(*tag, vmid));
                out.push(ListedContainer {
                    vmid,
                    backend: *tag,
                    orphan: record.is_none(),
                    record,
                });
            }
        }
        // Records left over exist in the state store but the owning backend never reported
        // them: orphans in the other direction.
        for ((backend, vmid), record) in by_key {
            out.push(ListedContainer {
                vmid,
                backend,
                orphan: true,
                record: Some(record),
            });
        }
        out.sort_by_key(|entry| (entry.backend as u8, entry.vmid));
        Ok(out)
    }

    /// Orphan reconciliation, §4.4: VMIDs the mapper knows about but the backend no longer has,
    /// and vice versa. Read-only; callers decide what to do with the mismatches.
    pub async fn reconcile(&self) -> Result<Vec<(String, u32)>> {
        let mapped = self.mapper.all()?;
        let mut live = HashMap::new();
        for tag in [BackendTag::Crun, BackendTag::Lxc, BackendTag::Vm] {
            if let Ok(vmids) = self.backend_for(tag).list().await {
                for vmid in vmids {
                    live.insert(vmid, tag);
                }
            }
        }
        Ok(mapped
            .into_iter()
            .filter(|(_, vmid)| !live.contains_key(vmid))
            .collect())
    }

    fn require(&self, id: &str) -> Result<ContainerRecord> {
        self.state
            .load(id)?
            .ok_or_else(|| ShimError::NotFound(id.to_string()))
    }
}
