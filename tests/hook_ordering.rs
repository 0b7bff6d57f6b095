//! Testable property 8: hook invocations are observed strictly in stage order across the
//! `create`/`start`/`stop` verbs that trigger them.

mod common;

use common::{exit_code, Sut};
use std::{fs, os::unix::fs::PermissionsExt};

fn install_recorder(bundle: &std::path::Path) -> std::path::PathBuf {
    let script = bundle.join("record.sh");
    fs::write(&script, "#!/bin/sh\necho \"$1\" >> \"$HOOK_LOG\"\n").unwrap();
    let mut perms = fs::metadata(&script).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&script, perms).unwrap();
    script
}

fn hook_entry(script: &std::path::Path, stage: &str, log: &std::path::Path) -> String {
    format!(
        r#"{{"path": "{path}", "args": ["record", "{stage}"], "env": ["HOOK_LOG={log}"]}}"#,
        path = script.display(),
        stage = stage,
        log = log.display(),
    )
}

#[test]
fn hooks_fire_in_spec_and_stage_order_across_create_start_stop() {
    let sut = Sut::new();
    let log = sut.root_path().join("hooks.log");

    let bundle = sut.write_bundle("hooked", "hooked", "");
    let script = install_recorder(&bundle);
    let hooks = format!(
        r#""hooks": {{
            "prestart": [{prestart}],
            "createRuntime": [{create_runtime}],
            "createContainer": [{create_container}],
            "startContainer": [{start_container}],
            "poststart": [{poststart}],
            "poststop": [{poststop}]
        }}"#,
        prestart = hook_entry(&script, "prestart", &log),
        create_runtime = hook_entry(&script, "createRuntime", &log),
        create_container = hook_entry(&script, "createContainer", &log),
        start_container = hook_entry(&script, "startContainer", &log),
        poststart = hook_entry(&script, "poststart", &log),
        poststop = hook_entry(&script, "poststop", &log),
    );

    // `write_bundle` already wrote a plain config.json; overwrite it with one carrying hooks,
    // using the same absolute rootfs path.
    let rootfs = bundle.join("rootfs");
    let config = format!(
        r#"{{
  "ociVersion": "1.0.2",
  "process": {{"user": {{"uid": 0, "gid": 0}}, "args": ["/bin/true"], "cwd": "/"}},
  "root": {{"path": "{root}"}},
  "hostname": "hooked",
  "linux": {{"namespaces": [{{"type": "pid"}}, {{"type": "mount"}}]}},
  {hooks}
}}"#,
        root = rootfs.display(),
        hooks = hooks,
    );
    fs::write(bundle.join("config.json"), config).unwrap();

    let create = sut.run(&[
        "create",
        "hooked",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&create), 0, "{:?}", create);

    let start = sut.run(&["start", "hooked"]);
    assert_eq!(exit_code(&start), 0, "{:?}", start);

    let stop = sut.run(&["stop", "hooked", "--timeout", "0"]);
    assert_eq!(exit_code(&stop), 0, "{:?}", stop);

    let contents = fs::read_to_string(&log).expect("hook log must exist");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(
        lines,
        vec![
            "prestart",
            "createRuntime",
            "createContainer",
            "startContainer",
            "poststart",
            "poststop",
        ]
    );
}
