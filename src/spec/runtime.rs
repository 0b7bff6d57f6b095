//! Typed in-memory representation of the OCI Runtime Specification bundle
//! `config.json`.

use derive_builder::Builder;
use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs::File,
    path::{Path, PathBuf},
};

use crate::error::{Result, ShimError};

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// Spec is the base configuration for the container.
pub struct Spec {
    #[getset(get = "pub")]
    #[serde(rename = "ociVersion")]
    /// Version of the Open Container Initiative Runtime Specification with which the bundle
    /// complies.
    version: String,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Process configures the container process.
    process: Option<Process>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Root configures the container's root filesystem.
    root: Option<Root>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Hostname configures the container's hostname.
    hostname: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Mounts configures additional mounts (on top of Root).
    mounts: Option<Vec<Mount>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Hooks configures callbacks for container lifecycle events.
    hooks: Option<Hooks>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Annotations contains arbitrary metadata for the container.
    annotations: Option<HashMap<String, String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Linux is platform-specific configuration for Linux based containers.
    linux: Option<Linux>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// VM marks the bundle as intended for a virtual-machine-based backend. Only a
    /// presence/absence marker is kept; hypervisor/kernel/image configuration is the VM
    /// backend's own concern and is out of scope here.
    vm: Option<VmMarker>,
}

impl Default for Spec {
    fn default() -> Self {
        Self {
            version: "1.0.2".into(),
            process: None,
            root: None,
            hostname: None,
            mounts: None,
            hooks: None,
            annotations: None,
            linux: None,
            vm: None,
        }
    }
}

/// OCI major.minor versions this shim understands.
const SUPPORTED_VERSION_PREFIXES: &[&str] = &["1.0."];

impl Spec {
    /// Parse a `Spec` out of `bundle_dir/config.json`.
    pub fn parse(bundle_dir: &Path) -> Result<Self> {
        let path = bundle_dir.join("config.json");
        let file = File::open(&path).map_err(|source| ShimError::SpecMissingFile {
            path: path.clone(),
            source,
        })?;
        let spec: Self =
            serde_json::from_reader(file).map_err(|source| ShimError::SpecMalformed {
                path: path.clone(),
                source,
            })?;
        if !SUPPORTED_VERSION_PREFIXES
            .iter()
            .any(|prefix| spec.version.starts_with(prefix))
        {
            return Err(ShimError::SpecUnsupportedVersion {
                version: spec.version.clone(),
            });
        }
        Ok(spec)
    }

    /// Serialize the spec back to `path`. Used by `spec` (emit a skeleton) and by tests that
    /// exercise the parse/emit round trip.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|source| ShimError::SpecMissingFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::to_writer_pretty(file, self).map_err(|source| ShimError::SpecMalformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// A minimal, valid default spec, as emitted by the `spec` verb.
    pub fn default_skeleton() -> Self {
        SpecBuilder::default()
            .version("1.0.2")
            .process(
                ProcessBuilder::default()
                    .terminal(true)
                    .user(UserBuilder::default().uid(0u32).gid(0u32).build().unwrap())
                    .args(vec!["sh".to_string()])
                    .env(vec!["PATH=/usr/bin:/bin".to_string()])
                    .cwd("/")
                    .build()
                    .unwrap(),
            )
            .root(
                RootBuilder::default()
                    .path("rootfs")
                    .readonly(false)
                    .build()
                    .unwrap(),
            )
            .hostname("runtime")
            .linux(
                LinuxBuilder::default()
                    .namespaces(vec![
                        LinuxNamespaceBuilder::default()
                            .typ(LinuxNamespaceType::Pid)
                            .build()
                            .unwrap(),
                        LinuxNamespaceBuilder::default()
                            .typ(LinuxNamespaceType::Network)
                            .build()
                            .unwrap(),
                        LinuxNamespaceBuilder::default()
                            .typ(LinuxNamespaceType::Ipc)
                            .build()
                            .unwrap(),
                        LinuxNamespaceBuilder::default()
                            .typ(LinuxNamespaceType::Uts)
                            .build()
                            .unwrap(),
                        LinuxNamespaceBuilder::default()
                            .typ(LinuxNamespaceType::Mount)
                            .build()
                            .unwrap(),
                    ])
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// Process contains information to start a specific application inside the container.
pub struct Process {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Terminal creates an interactive terminal for the container.
    terminal: Option<bool>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "consoleSize"
    )]
    /// ConsoleSize specifies the size of the console, only meaningful with `terminal` enabled.
    console_size: Option<ConsoleSize>,

    /// User specifies user information for the process.
    #[getset(get = "pub")]
    user: User,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Args specifies the binary and arguments for the application to execute.
    args: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Env populates the process environment for the process.
    env: Option<Vec<String>>,

    #[getset(get = "pub")]
    /// Cwd is the current working directory for the process and must be an absolute path.
    cwd: String,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Capabilities are Linux capabilities that are kept for the process.
    capabilities: Option<LinuxCapabilities>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Rlimits specifies rlimit options to apply to the process.
    rlimits: Option<Vec<PosixRlimit>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "noNewPrivileges"
    )]
    /// NoNewPrivileges controls whether additional privileges could be gained by processes in
    /// the container.
    no_new_privileges: Option<bool>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "apparmorProfile"
    )]
    /// ApparmorProfile specifies the apparmor profile for the container.
    apparmor_profile: Option<String>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "oomScoreAdj"
    )]
    /// Specify an oom_score_adj for the container.
    oom_score_adj: Option<i32>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "selinuxLabel"
    )]
    /// SelinuxLabel specifies the selinux context that the container process is run as.
    selinux_label: Option<String>,
}

impl Default for Process {
    fn default() -> Self {
        Self {
            terminal: None,
            console_size: None,
            user: User {
                uid: 0,
                gid: 0,
                additional_gids: None,
            },
            args: None,
            env: None,
            cwd: "/".into(),
            capabilities: None,
            rlimits: None,
            no_new_privileges: None,
            apparmor_profile: None,
            oom_score_adj: None,
            selinux_label: None,
        }
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxCapabilities specifies the list of allowed capabilities that are kept for a process.
/// http://man7.org/linux/man-pages/man7/capabilities.7.html
pub struct LinuxCapabilities {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Bounding is the set of capabilities checked by the kernel.
    bounding: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Effective is the set of capabilities checked by the kernel.
    effective: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Inheritable is the capabilities preserved across execve.
    inheritable: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Permitted is the limiting superset for effective capabilities.
    permitted: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Ambient is the ambient set of capabilities that are kept.
    ambient: Option<Vec<String>>,
}

/// User specifies specific user (and group) information for the container process.
#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct User {
    #[getset(get_copy = "pub")]
    /// UID is the user id.
    uid: u32,

    #[getset(get_copy = "pub")]
    /// GID is the group id.
    gid: u32,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "additionalGids"
    )]
    /// AdditionalGids are additional group ids set for the container's process.
    additional_gids: Option<Vec<u32>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// Root contains information about the container's root filesystem on the host.
pub struct Root {
    #[getset(get = "pub")]
    /// Path is the absolute path to the container's root filesystem.
    path: PathBuf,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Readonly makes the root filesystem for the container readonly before the process is
    /// executed.
    readonly: Option<bool>,
}

/// Mount types this shim is willing to translate for either backend.
pub const ALLOWED_MOUNT_TYPES: &[&str] = &[
    "bind", "proc", "sysfs", "tmpfs", "devpts", "devtmpfs", "overlay",
];

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// Mount specifies a mount for a container.
pub struct Mount {
    #[getset(get = "pub")]
    /// Destination is the absolute path where the mount will be placed in the container.
    destination: PathBuf,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    /// Type specifies the mount kind.
    typ: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Source specifies the source path of the mount.
    source: Option<PathBuf>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Options are fstab style mount options, applied in order.
    options: Option<Vec<String>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// Hook specifies a command that is run at a particular event in the lifecycle of a container.
pub struct Hook {
    #[getset(get = "pub")]
    path: PathBuf,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    args: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    env: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Timeout in seconds, per the OCI spec. Defaults to 10s (`spec.md` §4.5) when absent.
    timeout: Option<i64>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// Hooks specifies commands that are run at particular events in the lifecycle (setup and
/// teardown) of a container. All six stages are ordered vectors run sequentially.
pub struct Hooks {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Prestart is a list of hooks to be run before the container process is executed. It is
    /// called in the Runtime Namespace.
    prestart: Option<Vec<Hook>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "createRuntime"
    )]
    /// CreateRuntime is a list of hooks run after the container has been created but before
    /// pivot_root or any equivalent operation. It is called in the Runtime Namespace.
    create_runtime: Option<Vec<Hook>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "createContainer"
    )]
    /// CreateContainer is a list of hooks run after the container has been created but before
    /// pivot_root or any equivalent operation. It is called in the Container Namespace.
    create_container: Option<Vec<Hook>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "startContainer"
    )]
    /// StartContainer is a list of hooks run after the start operation is called but before the
    /// container process is started. It is called in the Container Namespace.
    start_container: Option<Vec<Hook>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Poststart is a list of hooks run after the container process is started. It is called in
    /// the Runtime Namespace.
    poststart: Option<Vec<Hook>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Poststop is a list of hooks run after the container process exits. It is called in the
    /// Runtime Namespace.
    poststop: Option<Vec<Hook>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// Linux contains platform-specific configuration for Linux based containers.
pub struct Linux {
    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "uidMappings"
    )]
    /// UIDMappings specifies user mappings for supporting user namespaces.
    uid_mappings: Option<Vec<LinuxIdMapping>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "gidMappings"
    )]
    /// GIDMappings specifies group mappings for supporting user namespaces.
    gid_mappings: Option<Vec<LinuxIdMapping>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Resources contain cgroup information for handling resource constraints for the
    /// container.
    resources: Option<LinuxResources>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "cgroupsPath"
    )]
    /// CgroupsPath specifies the path to cgroups that are created and/or joined by the
    /// container, relative to the cgroups mountpoint.
    cgroups_path: Option<PathBuf>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Namespaces contains the namespaces that are created and/or joined by the container.
    namespaces: Option<Vec<LinuxNamespace>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Devices are a list of device nodes that are created for the container.
    devices: Option<Vec<LinuxDevice>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Seccomp specifies the seccomp security settings for the container.
    seccomp: Option<LinuxSeccomp>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "mountLabel"
    )]
    /// MountLabel specifies the SELinux context for the mounts in the container.
    mount_label: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// IntelRdt contains Intel Resource Director Technology (e.g., L3 cache, memory bandwidth)
    /// settings for the container.
    intel_rdt: Option<LinuxIntelRdt>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Personality contains configuration for the Linux personality syscall.
    personality: Option<LinuxPersonality>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxIntelRdt has container runtime resource constraints for Intel RDT CAT and MBA features.
pub struct LinuxIntelRdt {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "closID")]
    /// ClosID is the identity for RDT Class of Service.
    clos_id: Option<String>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "l3CacheSchema"
    )]
    /// L3CacheSchema is a schema for L3 cache id and capacity bitmask.
    l3_cache_schema: Option<String>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "memBwSchema"
    )]
    /// MemBwSchema is a schema of memory bandwidth per L3 cache id.
    mem_bw_schema: Option<String>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxPersonality represents the Linux personality syscall input.
pub struct LinuxPersonality {
    #[getset(get = "pub")]
    /// Domain refers to a personality domain, e.g. `LINUX` or `LINUX32`.
    domain: String,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Flags are additional personality flags, currently unused upstream.
    flags: Option<Vec<String>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxNamespace is the configuration for a Linux namespace.
pub struct LinuxNamespace {
    #[getset(get_copy = "pub")]
    #[serde(rename = "type")]
    /// Type is the type of namespace.
    typ: LinuxNamespaceType,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Path is a path to an existing namespace persisted on disk that can be joined, of the
    /// same type.
    path: Option<PathBuf>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy, Hash)]
pub enum LinuxNamespaceType {
    #[serde(rename = "pid")]
    /// For isolating process IDs.
    Pid,

    #[serde(rename = "network")]
    /// For isolating network devices, stacks, ports, etc.
    Network,

    #[serde(rename = "mount")]
    /// For isolating mount points.
    Mount,

    #[serde(rename = "ipc")]
    /// For isolating System V IPC, POSIX message queues.
    Ipc,

    #[serde(rename = "uts")]
    /// For isolating hostname and NIS domain name.
    Uts,

    #[serde(rename = "user")]
    /// For isolating user and group IDs.
    User,

    #[serde(rename = "cgroup")]
    /// For isolating cgroup hierarchies.
    Cgroup,
}

impl LinuxNamespaceType {
    /// Lowercase name as it appears in `config.json`.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinuxNamespaceType::Pid => "pid",
            LinuxNamespaceType::Network => "network",
            LinuxNamespaceType::Mount => "mount",
            LinuxNamespaceType::Ipc => "ipc",
            LinuxNamespaceType::Uts => "uts",
            LinuxNamespaceType::User => "user",
            LinuxNamespaceType::Cgroup => "cgroup",
        }
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxIdMapping specifies UID/GID mappings.
pub struct LinuxIdMapping {
    #[getset(get_copy = "pub")]
    #[serde(rename = "containerID")]
    /// ContainerID is the starting UID/GID in the container.
    container_id: u32,

    #[getset(get_copy = "pub")]
    #[serde(rename = "hostID")]
    /// HostID is the starting UID/GID on the host to be mapped to `container_id`.
    host_id: u32,

    #[getset(get_copy = "pub")]
    /// Size is the number of IDs to be mapped.
    size: u32,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// PosixRlimit type and restrictions.
pub struct PosixRlimit {
    #[getset(get = "pub")]
    #[serde(rename = "type")]
    /// Type of the rlimit to set, e.g. `RLIMIT_NOFILE`.
    typ: String,

    #[getset(get_copy = "pub")]
    /// Hard is the hard limit for the specified type.
    hard: u64,

    #[getset(get_copy = "pub")]
    /// Soft is the soft limit for the specified type.
    soft: u64,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// ConsoleSize specifies the height/width of a pty, set when `Process.terminal` is true.
pub struct ConsoleSize {
    #[getset(get_copy = "pub")]
    /// Height is the vertical dimension of the console, in characters.
    height: u64,

    #[getset(get_copy = "pub")]
    /// Width is the horizontal dimension of the console, in characters.
    width: u64,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxHugepageLimit structure corresponds to limiting kernel hugepages.
pub struct LinuxHugepageLimit {
    #[getset(get = "pub")]
    #[serde(rename = "pageSize")]
    /// Pagesize is the hugepage size. Format: "<size><unit-prefix>B" (e.g. 64KB, 2MB, 1GB).
    page_size: String,

    #[getset(get_copy = "pub")]
    /// Limit is the limit of "hugepagesize" hugetlb usage.
    limit: i64,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxWeightDevice struct holds a `major:minor weight` pair for weightDevice.
pub struct LinuxWeightDevice {
    #[getset(get_copy = "pub")]
    major: i64,
    #[getset(get_copy = "pub")]
    minor: i64,
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    weight: Option<u16>,
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none", rename = "leafWeight")]
    leaf_weight: Option<u16>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters)]
#[builder(pattern = "owned", setter(into, strip_option))]
pub struct LinuxThrottleDevice {
    #[getset(get_copy = "pub")]
    major: i64,
    #[getset(get_copy = "pub")]
    minor: i64,
    #[getset(get_copy = "pub")]
    rate: u64,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxBlockIO for Linux cgroup 'blkio' resource management.
pub struct LinuxBlockIo {
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Specifies per cgroup weight.
    weight: Option<u16>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none", rename = "leafWeight")]
    leaf_weight: Option<u16>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "weightDevice"
    )]
    weight_device: Option<Vec<LinuxWeightDevice>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "throttleReadBpsDevice"
    )]
    throttle_read_bps_device: Option<Vec<LinuxThrottleDevice>>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "throttleWriteBpsDevice"
    )]
    throttle_write_bps_device: Option<Vec<LinuxThrottleDevice>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxMemory for Linux cgroup 'memory' resource management.
pub struct LinuxMemory {
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Memory limit (in bytes).
    limit: Option<i64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Memory reservation or soft_limit (in bytes).
    reservation: Option<i64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Total memory limit (memory + swap).
    swap: Option<i64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// How aggressive the kernel will swap memory pages.
    swappiness: Option<u64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none", rename = "disableOOMKiller")]
    /// DisableOOMKiller disables the OOM killer for out-of-memory conditions.
    disable_oom_killer: Option<bool>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxCPU for Linux cgroup 'cpu' resource management.
pub struct LinuxCpu {
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// CPU shares (relative weight vs. other cgroups with cpu shares).
    shares: Option<u64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// CPU hardcap limit (in usecs). Allowed cpu time in a given period.
    quota: Option<i64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    /// CPU period to be used for hardcapping (in usecs).
    period: Option<u64>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// CPUs to use within the cpuset. Default is to use any CPU available.
    cpus: Option<String>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// List of memory nodes in the cpuset. Default is to use any available memory node.
    mems: Option<String>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxPids for Linux cgroup 'pids' resource management (Linux 4.3).
pub struct LinuxPids {
    #[getset(get_copy = "pub")]
    /// Maximum number of PIDs. "no limit" if absent.
    limit: i64,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxNetwork identification and priority configuration.
pub struct LinuxNetwork {
    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none", rename = "classID")]
    /// Set class identifier for the container's network packets.
    class_id: Option<u32>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Set priority of network traffic for the container.
    priorities: Option<Vec<LinuxInterfacePriority>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxInterfacePriority for network interfaces.
pub struct LinuxInterfacePriority {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    priority: u32,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Default, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxResources has container runtime resource constraints.
pub struct LinuxResources {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Devices configures the device allowlist.
    devices: Option<Vec<LinuxDeviceCgroup>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Memory restriction configuration.
    memory: Option<LinuxMemory>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// CPU resource restriction configuration.
    cpu: Option<LinuxCpu>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Task resource restriction configuration.
    pids: Option<LinuxPids>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "blockIO")]
    /// BlockIO restriction configuration.
    block_io: Option<LinuxBlockIo>,

    #[getset(get = "pub")]
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "hugepageLimits"
    )]
    /// Hugetlb limits.
    hugepage_limits: Option<Vec<LinuxHugepageLimit>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Network restriction configuration.
    network: Option<LinuxNetwork>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxDevice represents the mknod information for a Linux special device file.
pub struct LinuxDevice {
    #[getset(get = "pub")]
    /// Path to the device.
    path: PathBuf,

    #[getset(get = "pub")]
    #[serde(rename = "type")]
    /// Device type: `c` (char), `b` (block), `u` (unbuffered char), or `p` (FIFO).
    typ: String,

    #[getset(get_copy = "pub")]
    major: i64,
    #[getset(get_copy = "pub")]
    minor: i64,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "fileMode")]
    file_mode: Option<u32>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<u32>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gid: Option<u32>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// LinuxDeviceCgroup represents a device rule for the devices controller.
pub struct LinuxDeviceCgroup {
    #[getset(get_copy = "pub")]
    /// Allow or deny.
    allow: bool,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    typ: Option<String>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    major: Option<i64>,

    #[getset(get = "pub")]
    #[serde(skip_serializing_if = "Option::is_none")]
    minor: Option<i64>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    /// Cgroup access permissions format, e.g. "rwm".
    access: Option<String>,
}

#[derive(Default, PartialEq, Eq, Serialize, Deserialize, Debug, Builder, CopyGetters, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxSeccomp represents syscall restrictions.
pub struct LinuxSeccomp {
    #[getset(get_copy = "pub")]
    #[serde(rename = "defaultAction")]
    default_action: LinuxSeccompAction,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    architectures: Option<Vec<Arch>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flags: Option<Vec<String>>,

    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    syscalls: Option<Vec<LinuxSyscall>>,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum LinuxSeccompAction {
    #[serde(rename = "SCMP_ACT_KILL")]
    Kill,
    #[serde(rename = "SCMP_ACT_KILL_PROCESS")]
    KillProcess,
    #[serde(rename = "SCMP_ACT_TRAP")]
    Trap,
    #[serde(rename = "SCMP_ACT_ERRNO")]
    Errno,
    #[serde(rename = "SCMP_ACT_TRACE")]
    Trace,
    #[serde(rename = "SCMP_ACT_ALLOW")]
    Allow,
    #[serde(rename = "SCMP_ACT_LOG")]
    Log,
}

impl Default for LinuxSeccompAction {
    fn default() -> Self {
        LinuxSeccompAction::Allow
    }
}

impl LinuxSeccompAction {
    /// Name as used in an LXC seccomp v2 profile.
    pub fn as_lxc_str(&self) -> &'static str {
        match self {
            LinuxSeccompAction::Kill | LinuxSeccompAction::KillProcess => "kill",
            LinuxSeccompAction::Trap => "trap",
            LinuxSeccompAction::Errno => "errno",
            LinuxSeccompAction::Trace => "trace",
            LinuxSeccompAction::Allow => "allow",
            LinuxSeccompAction::Log => "log",
        }
    }
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Clone, Copy)]
pub enum Arch {
    #[serde(rename = "SCMP_ARCH_X86")]
    X86,
    #[serde(rename = "SCMP_ARCH_X86_64")]
    X86_64,
    #[serde(rename = "SCMP_ARCH_ARM")]
    Arm,
    #[serde(rename = "SCMP_ARCH_AARCH64")]
    Aarch64,
}

#[derive(Default, PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
/// LinuxSyscall is used to match a syscall in seccomp.
pub struct LinuxSyscall {
    #[getset(get = "pub")]
    names: Vec<String>,

    #[getset(get = "pub")]
    #[serde(default)]
    action: LinuxSeccompAction,
}

#[derive(PartialEq, Eq, Serialize, Deserialize, Debug, Builder, Getters)]
#[builder(pattern = "owned", setter(into, strip_option))]
/// Marker carried when a bundle targets a virtual-machine-based backend. `spec.md` §4.6 keeps
/// the `Vm` backend variant as a placeholder; this type lets the router and validator see that
/// intent without modeling the full upstream VM hypervisor/kernel/image schema.
pub struct VmMarker {
    #[getset(get = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hypervisor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_skeleton_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let spec = Spec::default_skeleton();
        spec.save(&path).unwrap();
        let parsed = Spec::parse(dir.path()).unwrap();
        assert_eq!(spec, parsed);
    }

    #[test]
    fn parse_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = Spec::parse(dir.path()).unwrap_err();
        assert!(matches!(err, ShimError::SpecMissingFile { .. }));
    }

    #[test]
    fn parse_malformed_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), b"{not json").unwrap();
        let err = Spec::parse(dir.path()).unwrap_err();
        assert!(matches!(err, ShimError::SpecMalformed { .. }));
    }

    #[test]
    fn parse_rejects_unsupported_version() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            br#"{"ociVersion":"0.9.0","process":{"user":{"uid":0,"gid":0},"cwd":"/"}}"#,
        )
        .unwrap();
        let err = Spec::parse(dir.path()).unwrap_err();
        assert!(matches!(err, ShimError::SpecUnsupportedVersion { .. }));
    }

    #[test]
    fn namespace_type_round_trips_json() {
        let ns = LinuxNamespaceBuilder::default()
            .typ(LinuxNamespaceType::Uts)
            .build()
            .unwrap();
        let json = serde_json::to_string(&ns).unwrap();
        assert!(json.contains("\"uts\""));
    }
}
