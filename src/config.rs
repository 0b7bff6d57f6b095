//! Runtime configuration: the resolved set of options the orchestrator and router act on.
//!
//! Loading a `--config` file is an external collaborator's concern (§1 Non-goals); this struct
//! is what such a loader, or the CLI alone, would populate.

use derive_builder::Builder;
use getset::Getters;
use std::path::PathBuf;

use crate::state::mapping::VMID_MIN;

#[derive(Clone, Debug, Builder, Getters)]
#[builder(default, pattern = "owned", setter(into, strip_option))]
pub struct Config {
    #[getset(get = "pub")]
    /// State directory; the default matches §6 (`/run/pve-shim`).
    root: PathBuf,

    #[getset(get = "pub")]
    debug: bool,

    #[getset(get = "pub")]
    systemd_cgroup: bool,

    #[getset(get = "pub")]
    /// Lowest VMID the identity mapper is allowed to hand out.
    vmid_floor: u32,

    #[getset(get = "pub")]
    /// Default backend used when neither an explicit flag nor an annotation nor a glob pattern
    /// selects one (§4.6.3 step 4).
    default_backend: String,

    #[getset(get = "pub")]
    /// Ordered `(glob, backend)` pairs, evaluated in declaration order (§4.6.3 step 3).
    id_patterns: Vec<(String, String)>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/run/pve-shim"),
            debug: false,
            systemd_cgroup: false,
            vmid_floor: VMID_MIN,
            default_backend: "crun".to_string(),
            id_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Build a `Config` from the parsed CLI, applying `PVE_SHIM_ROOT`/`--root` precedence the
    /// way §6 documents (env var is a fallback, `--root` wins when both are present).
    pub fn from_cli(cli: &crate::cli::Cli) -> Self {
        let mut builder = ConfigBuilder::default();
        if let Some(root) = &cli.root {
            builder = builder.root(root.clone());
        }
        builder.debug(cli.debug).systemd_cgroup(cli.systemd_cgroup).build().unwrap()
    }
}
