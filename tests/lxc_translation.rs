//! S2 (LXC resource translation) plus the translation-purity invariant from the testable
//! properties list: equal inputs produce byte-equal translations.

mod common;

use common::{exit_code, Sut};
use pve_shim::backend::lxc::translate;
use pve_shim::spec::Spec;

#[test]
fn s2_lxc_translates_memory_and_cpu_and_enables_nesting_for_user_namespace() {
    let sut = Sut::new();
    let extra = r#""linux": {
        "namespaces": [{"type": "pid"}, {"type": "mount"}, {"type": "user"}],
        "resources": {
            "memory": {"limit": 268435456},
            "cpu": {"quota": 512, "period": 1024}
        }
    }"#;
    let bundle = sut.write_bundle("t2", "t2", extra);

    let spec = Spec::parse(&bundle).expect("parse fixture bundle");
    let translation = translate(&spec).expect("translate fixture spec");
    assert_eq!(translation.memory_mb, Some(256));
    assert_eq!(translation.cores, Some(1));
    assert!(translation.features.contains(&"nesting=1".to_string()));
    assert!(translation.features.contains(&"keyctl=1".to_string()));

    let create = sut.run(&[
        "create",
        "t2",
        "--bundle",
        bundle.to_str().unwrap(),
        "--runtime",
        "lxc",
    ]);
    assert_eq!(exit_code(&create), 0, "{:?}", create);
}

#[test]
fn translation_is_a_pure_function_of_the_spec() {
    let sut = Sut::new();
    let extra = r#""linux": {
        "namespaces": [{"type": "pid"}],
        "resources": {"memory": {"limit": 134217728}, "cpu": {"shares": 512}}
    }"#;
    let bundle_a = sut.write_bundle("pure-a", "purea", extra);
    let bundle_b = sut.write_bundle("pure-b", "purea", extra);

    let spec_a = Spec::parse(&bundle_a).unwrap();
    let spec_b = Spec::parse(&bundle_b).unwrap();

    // The only difference between the two bundles is their root path, which `translate` never
    // touches, so the translations besides the (irrelevant) rootfs path must match exactly.
    let translation_a = translate(&spec_a).unwrap();
    let translation_b = translate(&spec_b).unwrap();
    assert_eq!(translation_a.memory_mb, translation_b.memory_mb);
    assert_eq!(translation_a.cores, translation_b.cores);
    assert_eq!(translation_a.cpuunits, translation_b.cpuunits);
    assert_eq!(translation_a.features, translation_b.features);
    assert_eq!(translation_a.raw_lines, translation_b.raw_lines);

    // Re-translating the same parsed spec is deterministic.
    let translation_a_again = translate(&spec_a).unwrap();
    assert_eq!(translation_a, translation_a_again);
}
