//! The stable, user-visible error taxonomy.
//!
//! Internal plumbing uses `anyhow` for context chaining; anything that crosses a CLI verb
//! boundary is converted into a `ShimError` so the exit code and `--log-format json` diagnostic
//! payload stay stable across refactors.

use serde::Serialize;
use std::{io, path::PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShimError>;

#[derive(Error, Debug)]
pub enum ShimError {
    #[error("usage error: {0}")]
    UsageError(String),

    #[error("cannot read spec file {path}: {source}")]
    SpecMissingFile { path: PathBuf, source: io::Error },

    #[error("malformed spec file {path}: {source}")]
    SpecMalformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("unsupported OCI version {version}")]
    SpecUnsupportedVersion { version: String },

    #[error("spec validation failed: {0}")]
    SpecInvalid(String),

    #[error("invalid state transition: {container_id} {from} -> {to}")]
    StateTransition {
        container_id: String,
        from: String,
        to: String,
    },

    #[error("container id already exists: {0}")]
    IdConflict(String),

    #[error("container not found: {0}")]
    NotFound(String),

    #[error("backend operation failed for {container_id}: {reason}")]
    BackendFailure {
        container_id: String,
        reason: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    #[error("hook {name} failed for {container_id}: {reason}")]
    HookFailure {
        container_id: String,
        name: String,
        reason: String,
    },

    #[error("translation to backend {backend} failed: {reason}")]
    Translation { backend: String, reason: String },

    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),

    #[error("state store corruption at {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShimError {
    /// The stable kind tag, as it appears in `--log-format json` diagnostics and log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            ShimError::UsageError(_) => "usage_error",
            ShimError::SpecMissingFile { .. }
            | ShimError::SpecMalformed { .. }
            | ShimError::SpecUnsupportedVersion { .. }
            | ShimError::SpecInvalid(_) => "spec_error",
            ShimError::StateTransition { .. } => "state_transition",
            ShimError::IdConflict(_) => "id_conflict",
            ShimError::NotFound(_) => "not_found",
            ShimError::BackendFailure { .. } => "backend_failure",
            ShimError::HookFailure { .. } => "hook_failure",
            ShimError::Translation { .. } => "translation",
            ShimError::ResourceExhaustion(_) => "resource_exhaustion",
            ShimError::Corruption { .. } => "corruption",
            ShimError::Io(_) => "io_error",
        }
    }

    /// Process exit code this error maps to, per the CLI surface's documented contract
    /// (`spec.md` §6/§7): 2 usage error, 125 backend failure, 126 spec validation failed,
    /// 127 id not found, 130 interrupted; everything else is the generic-failure code, 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            ShimError::UsageError(_) => 2,
            ShimError::SpecMissingFile { .. }
            | ShimError::SpecMalformed { .. }
            | ShimError::SpecUnsupportedVersion { .. }
            | ShimError::SpecInvalid(_) => 126,
            ShimError::StateTransition { .. } => 1,
            ShimError::IdConflict(_) => 1,
            ShimError::NotFound(_) => 127,
            ShimError::BackendFailure { .. } => 125,
            ShimError::HookFailure { .. } => 1,
            ShimError::Translation { .. } => 1,
            ShimError::ResourceExhaustion(_) => 1,
            ShimError::Corruption { .. } => 1,
            ShimError::Io(_) => 1,
        }
    }

    /// A JSON-serializable view used by `--log-format json`.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            kind: self.kind(),
            message: self.to_string(),
            exit_code: self.exit_code(),
        }
    }
}

#[derive(Serialize)]
pub struct Diagnostic {
    pub kind: &'static str,
    pub message: String,
    pub exit_code: i32,
}

/// Flattens an `anyhow::Error`'s source chain into a single colon-joined line, the way
/// upstream error reporting always has.
pub fn chain(err: &anyhow::Error) -> String {
    err.chain()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_contract() {
        assert_eq!(ShimError::UsageError("x".into()).exit_code(), 2);
        assert_eq!(
            ShimError::NotFound("abc".into()).exit_code(),
            127,
            "not found must map to exit code 127"
        );
        assert_eq!(
            ShimError::SpecInvalid("bad".into()).exit_code(),
            126,
            "spec errors must map to exit code 126"
        );
        assert_eq!(
            ShimError::BackendFailure {
                container_id: "x".into(),
                reason: "boom".into(),
                source: None,
            }
            .exit_code(),
            125,
            "backend failures must map to exit code 125"
        );
    }

    #[test]
    fn chain_flattens_sources() {
        let inner = anyhow::anyhow!("root cause");
        let wrapped = inner.context("outer context");
        assert_eq!(chain(&wrapped), "outer context: root cause");
    }
}
