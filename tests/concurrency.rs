//! Concurrency-sensitive testable properties: S6 plus the mapping-bijection and
//! per-id-serializability invariants from the testable-properties list.

mod common;

use common::{exit_code, Sut};
use serde_json::Value;

fn record(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout is a JSON record")
}

#[test]
fn s6_concurrent_creates_on_distinct_ids_both_succeed_with_distinct_vmids() {
    let sut = Sut::new();

    // A preexisting container establishes a VMID neither concurrent create may reuse.
    let existing_bundle = sut.write_bundle("existing", "existing", "");
    let existing = sut.run(&[
        "create",
        "existing",
        "--bundle",
        existing_bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    assert_eq!(exit_code(&existing), 0, "{:?}", existing);
    let existing_vmid = record(&existing)["vmid"].as_u64().unwrap();

    let bundle_a = sut.write_bundle("a", "a", "");
    let bundle_b = sut.write_bundle("b", "b", "");

    let mut child_a = sut.spawn(&[
        "create",
        "a",
        "--bundle",
        bundle_a.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);
    let mut child_b = sut.spawn(&[
        "create",
        "b",
        "--bundle",
        bundle_b.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);

    let output_a = child_a.wait_with_output().expect("wait for create a");
    let output_b = child_b.wait_with_output().expect("wait for create b");
    assert!(output_a.status.success(), "{:?}", output_a);
    assert!(output_b.status.success(), "{:?}", output_b);

    let vmid_a = record(&output_a)["vmid"].as_u64().unwrap();
    let vmid_b = record(&output_b)["vmid"].as_u64().unwrap();
    assert_ne!(vmid_a, vmid_b);
    assert_ne!(vmid_a, existing_vmid);
    assert_ne!(vmid_b, existing_vmid);
}

#[test]
fn concurrent_mutation_of_distinct_ids_does_not_interfere() {
    let sut = Sut::new();
    let bundle_a = sut.write_bundle("ind-a", "inda", "");
    let bundle_b = sut.write_bundle("ind-b", "indb", "");

    for (id, bundle) in [("ind-a", &bundle_a), ("ind-b", &bundle_b)] {
        let create = sut.run(&["create", id, "--bundle", bundle.to_str().unwrap(), "--runtime", "crun"]);
        assert_eq!(exit_code(&create), 0, "{:?}", create);
    }

    // Start both concurrently; each must independently reach `running` with its own pid, and
    // starting one must never perturb the other's on-disk record.
    let mut start_a = sut.spawn(&["start", "ind-a"]);
    let mut start_b = sut.spawn(&["start", "ind-b"]);
    let out_a = start_a.wait_with_output().unwrap();
    let out_b = start_b.wait_with_output().unwrap();
    assert!(out_a.status.success());
    assert!(out_b.status.success());

    let record_a: Value = serde_json::from_slice(&std::fs::read(sut.record_path("ind-a")).unwrap()).unwrap();
    let record_b: Value = serde_json::from_slice(&std::fs::read(sut.record_path("ind-b")).unwrap()).unwrap();
    assert_eq!(record_a["state"], "running");
    assert_eq!(record_b["state"], "running");
    assert_ne!(record_a["id"], record_b["id"]);
}

#[test]
fn same_id_concurrent_create_yields_exactly_one_success() {
    let sut = Sut::new();
    let bundle = sut.write_bundle("race", "race", "");
    let other_bundle = sut.write_bundle("race-other", "race", "");

    let mut first = sut.spawn(&["create", "race", "--bundle", bundle.to_str().unwrap(), "--runtime", "crun"]);
    let mut second = sut.spawn(&[
        "create",
        "race",
        "--bundle",
        other_bundle.to_str().unwrap(),
        "--runtime",
        "crun",
    ]);

    let out_first = first.wait_with_output().unwrap();
    let out_second = second.wait_with_output().unwrap();

    let successes = [&out_first, &out_second]
        .iter()
        .filter(|o| o.status.success())
        .count();
    assert_eq!(successes, 1, "exactly one of two same-id creates must win");

    let conflicts = [&out_first, &out_second]
        .iter()
        .filter(|o| exit_code(o) == 1)
        .count();
    assert_eq!(conflicts, 1, "the loser must observe IdConflict");
}
