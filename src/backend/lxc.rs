//! Translates an OCI spec into a Proxmox LXC container configuration and drives it via `pct`,
//! §4.6.2. Translation itself is a pure function; `LxcBackend` is the thin CLI driver that
//! materializes it.

use super::{Backend, BackendState, ContainerLifecycle, ExecRequest};
use crate::capability::Capability;
use crate::error::{Result as ShimResult, ShimError};
use crate::spec::{LinuxSeccompAction, Spec};
use crate::state::BackendTag;
use crate::subprocess::{DefaultSubprocess, Invocation, Subprocess};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

/// One `lxc.*` raw configuration line, materialized verbatim into the container's config file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawConfigLine(pub String);

/// One mount-point entry (`mpN: ...`), LXC's own numbering scheme.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountPoint {
    pub index: usize,
    pub source: String,
    pub destination: String,
    pub options: Vec<String>,
}

impl MountPoint {
    fn render(&self) -> (String, String) {
        let mut value = format!("{},mp={}", self.source, self.destination);
        if !self.options.is_empty() {
            value.push(',');
            value.push_str(&self.options.join(","));
        }
        (format!("mp{}", self.index), value)
    }
}

/// The output of translating a `Spec` for a given `vmid`. Pure data; no I/O happens until a
/// driver materializes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LxcTranslation {
    pub hostname: Option<String>,
    pub memory_mb: Option<i64>,
    pub cores: Option<u64>,
    pub cpuunits: Option<u64>,
    pub features: Vec<String>,
    pub mount_points: Vec<MountPoint>,
    pub raw_lines: Vec<RawConfigLine>,
    pub entry_script: String,
    pub seccomp_profile: Option<String>,
}

/// Spec → LXC translation. Deterministic: every field of `Spec` that feeds `raw_lines` or
/// `mount_points` is a `Vec`, never a map, so both are built by iterating the spec in its own
/// listed order — equal inputs produce byte-equal output with no separate sort step involved.
pub fn translate(spec: &Spec) -> ShimResult<LxcTranslation> {
    let mut raw_lines = Vec::new();
    let mut features = Vec::new();
    let mut memory_mb = None;
    let mut cores = None;
    let mut cpuunits = None;
    let mut seccomp_profile = None;

    if let Some(linux) = spec.linux() {
        if let Some(namespaces) = linux.namespaces() {
            let has_user_ns = namespaces
                .iter()
                .any(|ns| ns.typ() == crate::spec::LinuxNamespaceType::User);
            if has_user_ns {
                features.push("nesting=1".to_string());
                features.push("keyctl=1".to_string());
            }
            for ns in namespaces {
                if let Some(path) = ns.path() {
                    raw_lines.push(RawConfigLine(format!(
                        "lxc.namespace.share.{} = {}",
                        ns.typ().as_str(),
                        path.display()
                    )));
                }
            }
        }

        let resources = translate_resources(linux.resources(), &mut raw_lines)?;
        memory_mb = resources.0;
        cores = resources.1;
        cpuunits = resources.2;

        if let Some(devices) = linux.devices() {
            translate_devices(devices, &mut raw_lines)?;
        }

        if let Some(seccomp) = linux.seccomp() {
            translate_seccomp_passthrough(&mut raw_lines);
            seccomp_profile = Some(render_seccomp_profile(seccomp));
        }
    }

    let caps = spec
        .process()
        .as_ref()
        .and_then(|p| p.capabilities().as_ref());
    translate_capabilities(caps, &mut raw_lines)?;
    let mount_points = translate_mounts(spec)?;
    let entry_script = build_entry_script(spec)?;

    Ok(LxcTranslation {
        hostname: spec.hostname().clone(),
        memory_mb,
        cores,
        cpuunits,
        features,
        mount_points,
        raw_lines,
        entry_script,
        seccomp_profile,
    })
}

fn translate_resources(
    resources: Option<&crate::spec::LinuxResources>,
    raw_lines: &mut Vec<RawConfigLine>,
) -> ShimResult<(Option<i64>, Option<u64>, Option<u64>)> {
    let Some(resources) = resources else {
        return Ok((None, None, None));
    };

    let memory_mb = resources
        .memory()
        .as_ref()
        .and_then(|m| *m.limit())
        .map(|bytes| bytes / (1024 * 1024));

    let cores = resources.cpu().as_ref().and_then(|cpu| {
        match (*cpu.quota(), *cpu.period()) {
            (Some(quota), Some(period)) if period > 0 && quota > 0 => {
                Some(((quota as f64) / (period as f64)).ceil() as u64)
            }
            _ => None,
        }
    });

    let cpuunits = resources.cpu().as_ref().and_then(|cpu| *cpu.shares());

    if let Some(pids) = resources.pids().as_ref() {
        raw_lines.push(RawConfigLine(format!(
            "lxc.cgroup2.pids.max = {}",
            pids.limit()
        )));
    }

    if let Some(block_io) = resources.block_io() {
        if let Some(weight) = block_io.weight() {
            raw_lines.push(RawConfigLine(format!("lxc.cgroup2.io.weight = {weight}")));
        }
        if let Some(devices) = block_io.throttle_read_bps_device() {
            for device in devices {
                raw_lines.push(RawConfigLine(format!(
                    "lxc.cgroup2.io.max = {}:{} rbps={}",
                    device.major(),
                    device.minor(),
                    device.rate()
                )));
            }
        }
        if let Some(devices) = block_io.throttle_write_bps_device() {
            for device in devices {
                raw_lines.push(RawConfigLine(format!(
                    "lxc.cgroup2.io.max = {}:{} wbps={}",
                    device.major(),
                    device.minor(),
                    device.rate()
                )));
            }
        }
    }

    Ok((memory_mb, cores, cpuunits))
}

fn translate_devices(
    devices: &[crate::spec::LinuxDevice],
    raw_lines: &mut Vec<RawConfigLine>,
) -> ShimResult<()> {
    for device in devices {
        if device.major() == 0 || !["c", "b", "u", "p"].contains(&device.typ().as_str()) {
            return Err(ShimError::Translation {
                backend: "lxc".into(),
                reason: format!(
                    "device {} has unsupported major/type for LXC",
                    device.path().display()
                ),
            });
        }
        raw_lines.push(RawConfigLine(format!(
            "lxc.cgroup2.devices.allow = {}:{} rwm",
            device.typ(),
            device.major()
        )));
    }
    Ok(())
}

fn translate_capabilities(
    capabilities: Option<&crate::spec::LinuxCapabilities>,
    raw_lines: &mut Vec<RawConfigLine>,
) -> ShimResult<()> {
    let Some(capabilities) = capabilities else {
        return Ok(());
    };
    if let Some(ambient) = capabilities.ambient() {
        let bounding = capabilities.bounding().clone().unwrap_or_default();
        for cap in ambient {
            if !bounding.contains(cap) {
                return Err(ShimError::Translation {
                    backend: "lxc".into(),
                    reason: format!("ambient capability {cap} exceeds the bounding set"),
                });
            }
        }
    }
    if let Some(bounding) = capabilities.bounding() {
        use strum::IntoEnumIterator;
        let all: Vec<Capability> = Capability::iter().collect();
        let kept: Vec<&str> = bounding
            .iter()
            .map(String::as_str)
            .collect();
        for cap in &all {
            let name = cap.as_ref();
            if kept.contains(&name) {
                raw_lines.push(RawConfigLine(format!("lxc.cap.keep = {name}")));
            }
        }
        if kept.is_empty() {
            raw_lines.push(RawConfigLine("lxc.cap.drop =".to_string()));
        }
    }
    Ok(())
}

fn translate_mounts(spec: &Spec) -> ShimResult<Vec<MountPoint>> {
    let Some(mounts) = spec.mounts() else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for (index, mount) in mounts.iter().enumerate() {
        let typ = mount.typ().clone().unwrap_or_else(|| "bind".to_string());
        if !crate::spec::ALLOWED_MOUNT_TYPES.contains(&typ.as_str()) {
            return Err(ShimError::Translation {
                backend: "lxc".into(),
                reason: format!("mount type {typ} is not representable in LXC"),
            });
        }
        let source = mount
            .source()
            .clone()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| typ.clone());
        out.push(MountPoint {
            index,
            source,
            destination: mount.destination().display().to_string(),
            options: mount.options().clone().unwrap_or_default(),
        });
    }
    Ok(out)
}

fn translate_seccomp_passthrough(raw_lines: &mut Vec<RawConfigLine>) {
    raw_lines.push(RawConfigLine(
        "lxc.seccomp.profile = {profile_path}".to_string(),
    ));
}

/// Renders the LXC seccomp v2 text profile: one action line plus `allowlist`/`denylist` of
/// syscalls by name.
fn render_seccomp_profile(seccomp: &crate::spec::LinuxSeccomp) -> String {
    let mut out = String::from("2\n");
    out.push_str(seccomp.default_action().as_lxc_str());
    out.push('\n');
    if let Some(syscalls) = seccomp.syscalls() {
        for syscall in syscalls {
            for name in syscall.names() {
                out.push_str(name);
                out.push(' ');
                out.push_str(syscall.action().as_lxc_str());
                out.push('\n');
            }
        }
    }
    out
}

fn build_entry_script(spec: &Spec) -> ShimResult<String> {
    let process = spec.process().as_ref().ok_or_else(|| ShimError::Translation {
        backend: "lxc".into(),
        reason: "spec has no process to realize".into(),
    })?;
    let mut script = String::from("#!/bin/sh\nset -e\n");
    if let Some(env) = process.env() {
        for entry in env {
            script.push_str(&format!("export {entry}\n"));
        }
    }
    script.push_str(&format!("cd {}\n", process.cwd()));
    script.push_str(&format!(
        "exec chroot --userspec={}:{} / ",
        process.user().uid(),
        process.user().gid()
    ));
    if let Some(args) = process.args() {
        for arg in args {
            script.push_str(&shell_quote(arg));
            script.push(' ');
        }
    }
    script.push('\n');
    Ok(script)
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

pub struct LxcBackend {
    pct_binary: PathBuf,
    /// Where materialized entry scripts / seccomp profiles live for each id (§6's
    /// `bundles/<id>/` and `seccomp/<id>.json` layout).
    materialize_root: PathBuf,
    subprocess: Box<dyn Subprocess>,
}

impl LxcBackend {
    pub fn new(pct_binary: PathBuf, materialize_root: PathBuf) -> Self {
        Self {
            pct_binary,
            materialize_root,
            subprocess: Box::new(DefaultSubprocess),
        }
    }

    #[cfg(test)]
    fn with_subprocess(mut self, subprocess: Box<dyn Subprocess>) -> Self {
        self.subprocess = subprocess;
        self
    }

    async fn pct(&self, args: Vec<String>) -> Result<crate::subprocess::RunOutcome> {
        let invocation = Invocation::new(self.pct_binary.clone())
            .args(args)
            .timeout(Duration::from_secs(60));
        self.subprocess.run(&invocation).await
    }

    /// Writes the entry script and (if present) the seccomp profile to this id's materialize
    /// directory, then applies the translated config via `pct set`. All of this happens in one
    /// step before `pct create` so a translation failure leaves no on-host state (§4.6.2).
    pub async fn materialize(&self, vmid: u32, translation: &LxcTranslation) -> Result<()> {
        let dir = self.materialize_root.join(vmid.to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let entry_path = dir.join("entry.sh");
        tokio::fs::write(&entry_path, &translation.entry_script).await?;

        if let Some(profile) = &translation.seccomp_profile {
            let profile_path = dir.join("seccomp.profile");
            tokio::fs::write(&profile_path, profile).await?;
        }
        Ok(())
    }

    fn materialize_dir(&self, vmid: u32) -> PathBuf {
        self.materialize_root.join(vmid.to_string())
    }
}

#[async_trait]
impl Backend for LxcBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Lxc
    }

    async fn exists(&self, vmid: u32) -> Result<bool> {
        let outcome = self
            .pct(vec!["status".into(), vmid.to_string()])
            .await?;
        Ok(outcome.success())
    }

    async fn create(&self, vmid: u32, bundle: &Path) -> Result<()> {
        let spec = Spec::parse(bundle).context("parse bundle for LXC translation")?;
        let translation = translate(&spec).context("translate spec to LXC config")?;
        self.materialize(vmid, &translation).await?;

        let mut args = vec![
            "create".to_string(),
            vmid.to_string(),
            "local:vztmpl/placeholder.tar.zst".to_string(),
        ];
        if let Some(hostname) = &translation.hostname {
            args.push("--hostname".into());
            args.push(hostname.clone());
        }
        if let Some(memory) = translation.memory_mb {
            args.push("--memory".into());
            args.push(memory.to_string());
        }
        if let Some(cores) = translation.cores {
            args.push("--cores".into());
            args.push(cores.to_string());
        }
        if let Some(cpuunits) = translation.cpuunits {
            args.push("--cpuunits".into());
            args.push(cpuunits.to_string());
        }
        if !translation.features.is_empty() {
            args.push("--features".into());
            args.push(translation.features.join(","));
        }
        for mount in &translation.mount_points {
            let (key, value) = mount.render();
            args.push(format!("--{key}"));
            args.push(value);
        }
        let outcome = self.pct(args).await?;
        if !outcome.success() {
            bail!("pct create failed: {}", outcome.stderr_lossy());
        }

        for line in &translation.raw_lines {
            let resolved = line.0.replace(
                "{profile_path}",
                &self.materialize_dir(vmid).join("seccomp.profile").display().to_string(),
            );
            debug!("appending raw lxc config line for {vmid}: {resolved}");
            let outcome = self
                .pct(vec!["set".into(), vmid.to_string(), "--lxc".into(), resolved])
                .await?;
            if !outcome.success() {
                bail!("pct set raw config failed: {}", outcome.stderr_lossy());
            }
        }
        Ok(())
    }

    async fn start(&self, vmid: u32) -> Result<()> {
        let outcome = self.pct(vec!["start".into(), vmid.to_string()]).await?;
        if !outcome.success() {
            bail!("pct start failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn stop(&self, vmid: u32, timeout: Duration) -> Result<()> {
        let outcome = self
            .pct(vec![
                "stop".into(),
                vmid.to_string(),
                "--timeout".into(),
                timeout.as_secs().to_string(),
            ])
            .await?;
        if !outcome.success() {
            bail!("pct stop failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn kill(&self, vmid: u32, _signal: &str) -> Result<()> {
        let outcome = self
            .pct(vec!["stop".into(), vmid.to_string(), "--timeout".into(), "0".into()])
            .await?;
        if !outcome.success() {
            bail!("pct stop (kill) failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn delete(&self, vmid: u32) -> Result<()> {
        let outcome = self.pct(vec!["destroy".into(), vmid.to_string()]).await?;
        if !outcome.success() {
            bail!("pct destroy failed: {}", outcome.stderr_lossy());
        }
        let dir = self.materialize_dir(vmid);
        let _ = tokio::fs::remove_dir_all(&dir).await;
        Ok(())
    }

    async fn state(&self, vmid: u32) -> Result<BackendState> {
        let outcome = self.pct(vec!["status".into(), vmid.to_string()]).await?;
        if !outcome.success() {
            bail!("pct status failed: {}", outcome.stderr_lossy());
        }
        let text = outcome.stdout_lossy();
        let lifecycle = if text.contains("running") {
            ContainerLifecycle::Running
        } else if text.contains("paused") {
            ContainerLifecycle::Paused
        } else {
            ContainerLifecycle::Stopped
        };
        Ok(BackendState {
            lifecycle,
            pid: None,
            exit_code: None,
        })
    }

    async fn exec(&self, vmid: u32, request: &ExecRequest) -> Result<i32> {
        let mut args = vec!["exec".to_string(), vmid.to_string(), "--".to_string()];
        args.extend(request.argv.iter().cloned());
        let outcome = self.pct(args).await?;
        Ok(outcome.status.and_then(|s| s.code()).unwrap_or(-1))
    }

    async fn pause(&self, vmid: u32) -> Result<()> {
        let outcome = self.pct(vec!["suspend".into(), vmid.to_string()]).await?;
        if !outcome.success() {
            bail!("pct suspend failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn resume(&self, vmid: u32) -> Result<()> {
        let outcome = self.pct(vec!["resume".into(), vmid.to_string()]).await?;
        if !outcome.success() {
            bail!("pct resume failed: {}", outcome.stderr_lossy());
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<u32>> {
        let outcome = self.pct(vec!["list".into()]).await?;
        if !outcome.success() {
            bail!("pct list failed: {}", outcome.stderr_lossy());
        }
        let text = outcome.stdout_lossy();
        Ok(text
            .lines()
            .skip(1)
            .filter_map(|line| line.split_whitespace().next())
            .filter_map(|token| u32::from_str(token).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;

    fn minimal_spec_with_mounts(mounts: Vec<crate::spec::Mount>) -> Spec {
        crate::spec::SpecBuilder::default()
            .process(
                crate::spec::ProcessBuilder::default()
                    .user(
                        crate::spec::UserBuilder::default()
                            .uid(0u32)
                            .gid(0u32)
                            .build()
                            .unwrap(),
                    )
                    .args(vec!["sh".to_string()])
                    .cwd("/")
                    .build()
                    .unwrap(),
            )
            .root(
                crate::spec::RootBuilder::default()
                    .path("rootfs")
                    .build()
                    .unwrap(),
            )
            .mounts(mounts)
            .build()
            .unwrap()
    }

    #[test]
    fn default_skeleton_translates_without_resources() {
        let spec = Spec::default_skeleton();
        let translation = translate(&spec).unwrap();
        assert!(translation.memory_mb.is_none());
        assert!(translation.cores.is_none());
    }

    #[test]
    fn default_skeleton_has_no_user_namespace_so_no_nesting_feature() {
        let spec = Spec::default_skeleton();
        let translation = translate(&spec).unwrap();
        assert!(!translation.features.contains(&"nesting=1".to_string()));
    }

    #[test]
    fn mounts_round_trip_destination_and_options() {
        let mount = crate::spec::MountBuilder::default()
            .destination("/data")
            .typ("bind")
            .source("/host/data")
            .options(vec!["ro".to_string()])
            .build()
            .unwrap();
        let spec = minimal_spec_with_mounts(vec![mount]);
        let translated = translate_mounts(&spec).unwrap();
        assert_eq!(translated.len(), 1);
        assert_eq!(translated[0].destination, "/data");
        assert_eq!(translated[0].options, vec!["ro".to_string()]);
    }

    #[test]
    fn device_with_zero_major_is_rejected() {
        let device = crate::spec::LinuxDeviceBuilder::default()
            .path("/dev/null")
            .typ("c")
            .major(0i64)
            .minor(3i64)
            .build()
            .unwrap();
        let err = translate_devices(&[device], &mut Vec::new()).unwrap_err();
        assert!(matches!(err, ShimError::Translation { .. }));
    }
}
