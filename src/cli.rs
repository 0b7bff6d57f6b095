//! CLI surface, §6. Global options plus the verb grammar.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "pve-shim", about = "OCI runtime shim for Proxmox VE hosts")]
pub struct Cli {
    /// State directory (default /run/pve-shim).
    #[arg(long, global = true, env = "PVE_SHIM_ROOT")]
    pub root: Option<PathBuf>,

    /// Log sink path (default stderr).
    #[arg(long, global = true)]
    pub log: Option<PathBuf>,

    /// Log output format.
    #[arg(long = "log-format", global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Enable debug-level logging.
    #[arg(long, global = true)]
    pub debug: bool,

    /// Tell the LXC backend to join the host's systemd cgroup hierarchy.
    #[arg(long = "systemd-cgroup", global = true)]
    pub systemd_cgroup: bool,

    /// Optional config file. Loading it is an external collaborator's concern; this crate only
    /// accepts the path.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub verb: Verb,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum RuntimeTag {
    Crun,
    Runc,
    Lxc,
    Vm,
}

#[derive(Subcommand, Debug)]
pub enum Verb {
    /// Create a container from a bundle.
    Create {
        id: String,
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long)]
        runtime: Option<RuntimeTag>,
        #[arg(long = "pid-file")]
        pid_file: Option<PathBuf>,
        #[arg(long = "console-socket")]
        console_socket: Option<PathBuf>,
        #[arg(long = "no-pivot")]
        no_pivot: bool,
        #[arg(long = "no-new-keyring")]
        no_new_keyring: bool,
        #[arg(long = "preserve-fds")]
        preserve_fds: Option<String>,
    },
    /// Start a previously created container.
    Start { id: String },
    /// Stop a running container.
    Stop {
        id: String,
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Send a signal to a container's init process.
    Kill { id: String, signal: Option<String> },
    /// Remove a container's resources.
    Delete {
        id: String,
        #[arg(long)]
        force: bool,
    },
    /// Report a container's composed status.
    State { id: String },
    /// Execute a new process inside a running container.
    Exec {
        id: String,
        #[arg(long)]
        cwd: Option<PathBuf>,
        #[arg(long = "env")]
        env: Vec<String>,
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        tty: bool,
        #[arg(last = true)]
        argv: Vec<String>,
    },
    /// List all known containers.
    List {
        #[arg(long)]
        runtime: Option<RuntimeTag>,
    },
    /// Create then immediately start a container.
    Run {
        id: String,
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long)]
        runtime: Option<RuntimeTag>,
    },
    /// Emit a default bundle skeleton to stdout.
    Spec,
    /// Checkpoint a running container, if the backend supports it.
    Checkpoint {
        id: String,
        #[arg(long = "image-path")]
        image_path: Option<PathBuf>,
    },
    /// Restore a container from a checkpoint, if the backend supports it.
    Restore {
        id: String,
        #[arg(long = "image-path")]
        image_path: Option<PathBuf>,
    },
}
