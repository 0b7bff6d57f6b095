//! The OCI Runtime Specification bundle model (`config.json`).

mod runtime;

pub use runtime::*;
