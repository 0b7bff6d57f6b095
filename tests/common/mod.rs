//! Shared black-box test harness: spawns the real `pve-shim` binary against a scratch state
//! root, backed by fake `crun`/`pct` scripts that stand in for the host tooling.

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    process::{Command, Output},
};
use tempfile::TempDir;

const FAKE_CRUN: &str = r#"#!/bin/sh
set -e
STATE_DIR="${FAKE_RUNTIME_STATE:?FAKE_RUNTIME_STATE not set}"
mkdir -p "$STATE_DIR"

cmd=""
vmid=""
for a in "$@"; do
  case "$a" in
    --*) : ;;
    *)
      if [ -z "$cmd" ]; then cmd="$a"
      elif [ -z "$vmid" ]; then vmid="$a"
      fi
      ;;
  esac
done

case "$cmd" in
  create)
    echo '{"status":"created","pid":null}' > "$STATE_DIR/$vmid.json"
    ;;
  start)
    echo "{\"status\":\"running\",\"pid\":$$}" > "$STATE_DIR/$vmid.json"
    ;;
  kill)
    echo '{"status":"stopped","pid":null}' > "$STATE_DIR/$vmid.json"
    ;;
  state)
    if [ -f "$STATE_DIR/$vmid.json" ]; then
      cat "$STATE_DIR/$vmid.json"
    else
      echo '{"status":"stopped","pid":null}'
    fi
    ;;
  delete)
    rm -f "$STATE_DIR/$vmid.json"
    ;;
  list)
    echo '[]'
    ;;
  *)
    echo "fake-crun: unsupported subcommand '$cmd'" >&2
    exit 1
    ;;
esac
"#;

const FAKE_PCT: &str = r#"#!/bin/sh
set -e
STATE_DIR="${FAKE_PCT_STATE:?FAKE_PCT_STATE not set}"
mkdir -p "$STATE_DIR"

cmd="$1"
[ $# -gt 0 ] && shift
vmid="$1"

case "$cmd" in
  create) echo stopped > "$STATE_DIR/$vmid" ;;
  set) : ;;
  start) echo running > "$STATE_DIR/$vmid" ;;
  stop) echo stopped > "$STATE_DIR/$vmid" ;;
  destroy) rm -f "$STATE_DIR/$vmid" ;;
  suspend) echo paused > "$STATE_DIR/$vmid" ;;
  resume) echo running > "$STATE_DIR/$vmid" ;;
  status)
    status=$(cat "$STATE_DIR/$vmid" 2>/dev/null || echo stopped)
    echo "status: $status"
    ;;
  list) echo "VMID STATUS" ;;
  *)
    echo "fake-pct: unsupported subcommand '$cmd'" >&2
    exit 1
    ;;
esac
"#;

fn install_fixture(dir: &Path, name: &str, script: &str) {
    let path = dir.join(name);
    fs::write(&path, script).expect("write fixture script");
    let mut perms = fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).unwrap();
}

/// One scratch environment: a shim state root plus fake `crun`/`pct` binaries on `PATH`.
pub struct Sut {
    root: TempDir,
    bin_dir: TempDir,
}

impl Sut {
    pub fn new() -> Self {
        let root = TempDir::new().expect("state root");
        let bin_dir = TempDir::new().expect("fixture bin dir");
        install_fixture(bin_dir.path(), "crun", FAKE_CRUN);
        install_fixture(bin_dir.path(), "pct", FAKE_PCT);
        Self { root, bin_dir }
    }

    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    pub fn record_path(&self, id: &str) -> PathBuf {
        self.root.path().join("state").join(format!("{id}.json"))
    }

    /// Writes a minimal OCI bundle (`config.json` + `rootfs/`) under the scratch root and
    /// returns its directory. `extra` is spliced into the top-level spec object, e.g.
    /// `r#""linux": {"resources": {...}}"#`.
    pub fn write_bundle(&self, name: &str, hostname: &str, extra: &str) -> PathBuf {
        let bundle = self.root.path().join("bundles").join(name);
        let rootfs = bundle.join("rootfs");
        fs::create_dir_all(&rootfs).expect("create rootfs");

        let extra_field = if extra.is_empty() {
            String::new()
        } else {
            format!(",{extra}")
        };
        let config = format!(
            r#"{{
  "ociVersion": "1.0.2",
  "process": {{"user": {{"uid": 0, "gid": 0}}, "args": ["/bin/true"], "cwd": "/"}},
  "root": {{"path": "{root}"}},
  "hostname": "{hostname}",
  "linux": {{"namespaces": [{{"type": "pid"}}, {{"type": "mount"}}]}}{extra_field}
}}"#,
            root = rootfs.display(),
        );
        fs::write(bundle.join("config.json"), config).expect("write config.json");
        bundle
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut path = self.bin_dir.path().display().to_string();
        if let Ok(existing) = std::env::var("PATH") {
            path.push(':');
            path.push_str(&existing);
        }
        let mut command = Command::new(env!("CARGO_BIN_EXE_pve-shim"));
        command
            .arg("--root")
            .arg(self.root.path())
            .args(args)
            .env("PATH", path)
            .env("FAKE_RUNTIME_STATE", self.root.path().join("fake-crun"))
            .env("FAKE_PCT_STATE", self.root.path().join("fake-pct"));
        command
    }

    pub fn run(&self, args: &[&str]) -> Output {
        self.command(args).output().expect("spawn pve-shim")
    }

    /// Starts the verb without waiting for it, for concurrency scenarios that need two
    /// invocations in flight at once.
    pub fn spawn(&self, args: &[&str]) -> std::process::Child {
        self.command(args).spawn().expect("spawn pve-shim")
    }
}

pub fn exit_code(output: &Output) -> i32 {
    output.status.code().unwrap_or(-1)
}
