//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use thiserror::Error;

use crate::domain::command::Phase;

// ── Validation errors ─────────────────────────────────────────────────────────

/// A malformed or incomplete workload or command set. Never retried.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("workload '{workload}' declares no containers")]
    NoContainers { workload: String },

    #[error(
        "workload '{workload}' has no container with the source volume mounted; \
         set 'mountSources: true' on at least one container to sync files"
    )]
    NoSourceVolume { workload: String },

    #[error("workload '{workload}' has no run command")]
    MissingRunCommand { workload: String },

    #[error("{phase} command '{id}' targets unknown container '{container}'")]
    UnknownContainer {
        phase: Phase,
        id: String,
        container: String,
    },

    #[error("command '{id}' not found")]
    UnknownCommand { id: String },

    #[error("command '{id}' is a {actual} command, not a {expected} command")]
    WrongPhase {
        id: String,
        expected: Phase,
        actual: Phase,
    },

    #[error("{phase} commands {ids} are ambiguous; mark one with 'isDefault: true'")]
    AmbiguousCommand { phase: Phase, ids: String },

    #[error("invalid name '{0}': must be a lowercase DNS label")]
    InvalidName(String),

    #[error("'{path}' is not inside the source root {root}")]
    PathOutsideRoot { path: String, root: String },
}

// ── Remote call errors ────────────────────────────────────────────────────────

/// A failed cluster API interaction, labelled with what was being attempted.
#[derive(Debug, Error)]
#[error("{operation} failed for workload '{workload}'")]
pub struct RemoteCallError {
    pub workload: String,
    pub operation: String,
    #[source]
    pub source: anyhow::Error,
}

impl RemoteCallError {
    pub fn new(workload: &str, operation: impl Into<String>, source: anyhow::Error) -> Self {
        Self {
            workload: workload.to_string(),
            operation: operation.into(),
            source,
        }
    }
}

// ── Sync errors ───────────────────────────────────────────────────────────────

/// Archive construction or extraction into a container failed.
#[derive(Debug, Error)]
#[error("syncing source to {unit}/{container} failed")]
pub struct SyncError {
    pub unit: String,
    pub container: String,
    #[source]
    pub source: anyhow::Error,
}

// ── Command execution errors ──────────────────────────────────────────────────

/// A lifecycle command exited non-zero or could not be delivered.
#[derive(Debug, Error)]
#[error("{phase} command '{id}' failed in {unit}/{container}: {reason}")]
pub struct CommandExecutionError {
    pub phase: Phase,
    pub id: String,
    pub unit: String,
    pub container: String,
    pub reason: String,
}

// ── Manifest errors ───────────────────────────────────────────────────────────

/// Errors decoding an ad-hoc resource manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest document {index} is not valid YAML: {message}")]
    Parse { index: usize, message: String },

    #[error("manifest document {index} is missing '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("manifest document {index} has malformed apiVersion '{api_version}'")]
    BadApiVersion { index: usize, api_version: String },

    #[error("manifest contains no resource documents")]
    Empty,
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors related to configuration key/value validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting: {key}\n\nValid settings: {valid}")]
    UnknownKey { key: String, valid: String },

    #[error("Invalid value for {key}: {value}\n\n{hint}")]
    InvalidValue {
        key: String,
        value: String,
        hint: String,
    },
}
