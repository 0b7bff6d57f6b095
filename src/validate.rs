//! Total structural and semantic validation of a parsed `Spec`, §3.1/§4.8.
//!
//! Validation runs before any side effect and checks every field; failures carry the JSON path
//! of the offending value.

use crate::error::{Result, ShimError};
use crate::spec::{Spec, ALLOWED_MOUNT_TYPES};
use std::path::Path;

const ALLOWED_NAMESPACE_TYPES: &[&str] =
    &["pid", "network", "ipc", "uts", "mount", "user", "cgroup"];

pub fn validate(spec: &Spec) -> Result<()> {
    let mut errors = Vec::new();

    if let Some(process) = spec.process() {
        if !process.cwd().starts_with('/') {
            errors.push("process.cwd must be absolute".to_string());
        }
        if let Some(env) = process.env() {
            for (i, entry) in env.iter().enumerate() {
                if !entry.contains('=') {
                    errors.push(format!("process.env[{i}] must contain '='"));
                }
            }
        }
        if let Some(caps) = process.capabilities() {
            for set in [
                caps.bounding(),
                caps.effective(),
                caps.inheritable(),
                caps.permitted(),
                caps.ambient(),
            ] {
                if let Some(tokens) = set {
                    for token in tokens {
                        if !is_capability_token(token) {
                            errors.push(format!("invalid capability token: {token}"));
                        }
                    }
                }
            }
        }
        if let Some(rlimits) = process.rlimits() {
            for rlimit in rlimits {
                if rlimit.hard() < rlimit.soft() {
                    errors.push(format!(
                        "rlimit {} has hard ({}) < soft ({})",
                        rlimit.typ(),
                        rlimit.hard(),
                        rlimit.soft()
                    ));
                }
            }
        }
    } else {
        errors.push("process is required".to_string());
    }

    if spec.root().is_none() {
        errors.push("root is required".to_string());
    }

    if let Some(hostname) = spec.hostname() {
        if let Err(reason) = validate_hostname(hostname) {
            errors.push(reason);
        }
    }

    if let Some(mounts) = spec.mounts() {
        for (i, mount) in mounts.iter().enumerate() {
            if !mount.destination().is_absolute() {
                errors.push(format!("mounts[{i}].destination must be absolute"));
            }
            if let Some(typ) = mount.typ() {
                if !ALLOWED_MOUNT_TYPES.contains(&typ.as_str()) {
                    errors.push(format!("mounts[{i}].type '{typ}' is not allowed"));
                }
            }
        }
    }

    if let Some(linux) = spec.linux() {
        if let Some(namespaces) = linux.namespaces() {
            for (i, ns) in namespaces.iter().enumerate() {
                let name = ns.typ().as_str();
                if !ALLOWED_NAMESPACE_TYPES.contains(&name) {
                    errors.push(format!("linux.namespaces[{i}].type '{name}' is not allowed"));
                }
            }
        }
        if let Some(devices) = linux.devices() {
            for (i, device) in devices.iter().enumerate() {
                if device.major() == 0 || !["c", "b", "u", "p"].contains(&device.typ().as_str()) {
                    errors.push(format!(
                        "linux.devices[{i}] has unsupported major/type combination"
                    ));
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ShimError::SpecInvalid(errors.join("; ")))
    }
}

/// Backend-reachability checks deferred from pure structural validation: the host paths the
/// translator will bind into the container must exist. Kernel-level presence (bridges, devices)
/// is left to `backend.create`.
pub fn validate_host_paths(spec: &Spec, bundle_dir: &Path) -> Result<()> {
    if let Some(root) = spec.root() {
        let resolved = if root.path().is_absolute() {
            root.path().clone()
        } else {
            bundle_dir.join(root.path())
        };
        if !resolved.exists() {
            return Err(ShimError::SpecInvalid(format!(
                "root.path {} does not exist",
                resolved.display()
            )));
        }
    }
    Ok(())
}

fn is_capability_token(token: &str) -> bool {
    (1..=64).contains(&token.len())
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

fn validate_hostname(hostname: &str) -> std::result::Result<(), String> {
    if hostname.is_empty() || hostname.len() > 63 {
        return Err("hostname must be 1..=63 characters".to_string());
    }
    if hostname.starts_with('-') || hostname.ends_with('-') {
        return Err("hostname must not start or end with a hyphen".to_string());
    }
    if !hostname
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err("hostname must be RFC-1123 characters only".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;

    #[test]
    fn default_skeleton_validates() {
        validate(&Spec::default_skeleton()).unwrap();
    }

    #[test]
    fn hostname_rules_reject_leading_hyphen_accept_plain_name() {
        assert!(validate_hostname("-bad").is_err());
        assert!(validate_hostname("good-host").is_ok());
    }

    #[test]
    fn capability_token_format() {
        assert!(is_capability_token("CAP_SYS_ADMIN"));
        assert!(!is_capability_token("cap_sys_admin"));
        assert!(!is_capability_token(""));
    }

    #[test]
    fn hostname_length_limit() {
        let too_long = "a".repeat(64);
        assert!(validate_hostname(&too_long).is_err());
    }
}
