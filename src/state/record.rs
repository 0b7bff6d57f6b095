//! The per-container state record persisted under `<root>/state/<id>.json`.

use getset::{CopyGetters, Getters, MutGetters, Setters};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::PathBuf};
use strum::{AsRefStr, Display, EnumString};

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// The lifecycle state of a container, per the state machine.
pub enum LifecycleState {
    Created,
    Running,
    Paused,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
/// Which concrete backend realizes a container. Persisted so later verbs never re-derive the
/// selection.
pub enum BackendTag {
    Crun,
    Lxc,
    Vm,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Getters, CopyGetters, Setters, MutGetters)]
#[serde(rename_all = "camelCase")]
/// A single container's persisted lifecycle record.
pub struct ContainerRecord {
    #[getset(get = "pub")]
    id: String,

    #[getset(get_copy = "pub")]
    vmid: u32,

    #[getset(get_copy = "pub", set = "pub")]
    backend: BackendTag,

    #[getset(get = "pub")]
    bundle: PathBuf,

    #[getset(get_copy = "pub", set = "pub")]
    state: LifecycleState,

    #[getset(get_copy = "pub", set = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<i32>,

    #[getset(get_copy = "pub")]
    created_at: i64,

    #[getset(get_copy = "pub", set = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<i64>,

    #[getset(get_copy = "pub", set = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<i64>,

    #[getset(get_copy = "pub", set = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,

    #[getset(get = "pub", set = "pub")]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exit_reason: Option<String>,

    #[getset(get = "pub", get_mut = "pub")]
    #[serde(default)]
    annotations: HashMap<String, String>,
}

impl ContainerRecord {
    /// A freshly created record, in the `created` state with no pid or timestamps set beyond
    /// `created_at`.
    pub fn new(
        id: impl Into<String>,
        vmid: u32,
        backend: BackendTag,
        bundle: PathBuf,
        created_at: i64,
        annotations: HashMap<String, String>,
    ) -> Self {
        Self {
            id: id.into(),
            vmid,
            backend,
            bundle,
            state: LifecycleState::Created,
            pid: None,
            created_at,
            started_at: None,
            finished_at: None,
            exit_code: None,
            exit_reason: None,
            annotations,
        }
    }

    /// §3.4: a `running` record must have a pid; a `stopped` record must have `finished_at`.
    pub fn satisfies_store_invariants(&self) -> bool {
        match self.state {
            LifecycleState::Running => self.pid.is_some(),
            LifecycleState::Stopped => self.finished_at.is_some(),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ContainerRecord {
        ContainerRecord::new(
            "t1",
            100,
            BackendTag::Crun,
            PathBuf::from("/tmp/bundle"),
            1000,
            HashMap::new(),
        )
    }

    #[test]
    fn new_record_is_created_and_valid() {
        let r = record();
        assert_eq!(r.state(), LifecycleState::Created);
        assert!(r.satisfies_store_invariants());
    }

    #[test]
    fn running_without_pid_violates_invariant() {
        let mut r = record();
        r.set_state(LifecycleState::Running);
        assert!(!r.satisfies_store_invariants());
        r.set_pid(Some(42));
        assert!(r.satisfies_store_invariants());
    }

    #[test]
    fn stopped_without_finished_violates_invariant() {
        let mut r = record();
        r.set_state(LifecycleState::Stopped);
        assert!(!r.satisfies_store_invariants());
        r.set_finished_at(Some(2000));
        assert!(r.satisfies_store_invariants());
    }

    #[test]
    fn serializes_camel_case() {
        let r = record();
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(!json.contains("created_at"));
    }
}
