//! End-to-end lifecycle scenarios over the native (fake `crun`) backend.

mod common;

use common::{exit_code, Sut};
use serde_json::Value;

fn record(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON record")
}

#[test]
fn s1_create_start_stop_delete_happy_path() {
    let sut = Sut::new();
    let bundle = sut.write_bundle("t1", "t1", "");

    // Given a validated bundle, create succeeds and reports `created`.
    let create = sut.run(&[
        "create",
        "t1",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&create), 0, "{:?}", create);
    assert_eq!(record(&create)["state"], "created");

    // When started, state becomes running with a positive pid.
    let start = sut.run(&["start", "t1"]);
    assert_eq!(exit_code(&start), 0, "{:?}", start);
    let started = record(&start);
    assert_eq!(started["state"], "running");
    assert!(started["pid"].as_i64().unwrap() > 0);

    // When stopped, state becomes stopped with an exit code recorded.
    let stop = sut.run(&["stop", "t1", "--timeout", "0"]);
    assert_eq!(exit_code(&stop), 0, "{:?}", stop);
    let stopped = record(&stop);
    assert_eq!(stopped["state"], "stopped");
    assert!(stopped["exitCode"].is_number());

    // Then delete tears the record down entirely.
    let delete = sut.run(&["delete", "t1"]);
    assert_eq!(exit_code(&delete), 0, "{:?}", delete);
    assert!(!sut.record_path("t1").exists());

    let state_after_delete = sut.run(&["state", "t1"]);
    assert_eq!(exit_code(&state_after_delete), 127, "NotFound must map to exit code 127");
}

#[test]
fn s3_stop_before_start_is_rejected_and_state_is_untouched() {
    let sut = Sut::new();
    let bundle = sut.write_bundle("t3", "t3", "");
    let create = sut.run(&[
        "create",
        "t3",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&create), 0, "{:?}", create);
    let before = std::fs::read(sut.record_path("t3")).unwrap();

    let stop = sut.run(&["stop", "t3", "--timeout", "0"]);
    assert_ne!(exit_code(&stop), 0);

    let after = std::fs::read(sut.record_path("t3")).unwrap();
    assert_eq!(before, after, "state file must be byte-identical after a rejected transition");
}

#[test]
fn s4_required_hook_failure_rolls_back_create() {
    let sut = Sut::new();
    let bundle = sut.write_bundle(
        "t4",
        "t4",
        r#""hooks": {"prestart": [{"path": "/bin/false"}]}"#,
    );

    let create = sut.run(&[
        "create",
        "t4",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&create), 1, "HookFailure must map to exit code 1");
    assert!(!sut.record_path("t4").exists(), "no record must survive a rolled-back create");

    // The VMID must be free again: a second id can now allocate it without collision.
    let other_bundle = sut.write_bundle("t4b", "t4b", "");
    let other = sut.run(&[
        "create",
        "t4b",
        "--bundle",
        other_bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&other), 0, "{:?}", other);
}

#[test]
fn s5_id_collision_is_rejected_and_original_record_is_unchanged() {
    let sut = Sut::new();
    let bundle = sut.write_bundle("t5", "t5", "");
    let first = sut.run(&[
        "create",
        "t5",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&first), 0, "{:?}", first);
    let before = std::fs::read(sut.record_path("t5")).unwrap();

    let other_bundle = sut.write_bundle("t5-other", "t5", "");
    let second = sut.run(&[
        "create",
        "t5",
        "--bundle",
        other_bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&second), 1, "IdConflict must map to exit code 1");

    let after = std::fs::read(sut.record_path("t5")).unwrap();
    assert_eq!(before, after, "the original record must survive a rejected collision");
}
