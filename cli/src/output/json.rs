//! JSON output helpers.
//!
//! Every `--json` code path prints exactly one pretty-printed object on
//! stdout. Failures use the error object from [`format_error`].

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::application::services::deploy::Applied;
use crate::application::services::lifecycle::RunAction;
use crate::application::services::push::PushOutcome;
use crate::domain::config::DevpushConfig;
use crate::domain::error::{
    CommandExecutionError, ConfigError, ManifestError, RemoteCallError, SyncError,
    ValidationError,
};
use crate::domain::manifest::ResourceId;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

fn print(value: &serde_json::Value) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("JSON serialization failed")?
    );
    Ok(())
}

fn resource(id: &ResourceId) -> serde_json::Value {
    json!({
        "apiVersion": id.api_version(),
        "kind": id.kind,
        "name": id.name,
    })
}

/// Machine-readable renderer.
pub struct JsonRenderer;

impl JsonRenderer {
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_push(&self, workload: &str, outcome: &PushOutcome) -> Result<()> {
        let run = outcome.run.map(|action| match action {
            RunAction::Restarted => "restarted",
            RunAction::Reloaded => "reloaded",
        });
        print(&json!({
            "workload": workload,
            "unit": outcome.unit,
            "created": outcome.created,
            "unitChanged": outcome.unit_changed,
            "incremental": outcome.incremental,
            "run": run,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_deploy(&self, applied: &[Applied]) -> Result<()> {
        let items: Vec<_> = applied
            .iter()
            .map(|a| {
                let mut item = resource(&a.id);
                item["created"] = json!(a.created);
                item
            })
            .collect();
        print(&json!({ "applied": items }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_deleted(&self, deleted: &[ResourceId]) -> Result<()> {
        let items: Vec<_> = deleted.iter().map(resource).collect();
        print(&json!({ "deleted": items }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_config(&self, config: &DevpushConfig, path: &Path) -> Result<()> {
        print(&json!({
            "path": path.display().to_string(),
            "config": serde_json::to_value(config).context("cannot serialize config")?,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        print(&json!({ "version": version }))
    }
}

/// Stable code for the `code` field of an error object, taken from the
/// first typed error in the chain.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if cause.is::<ValidationError>() {
            return "VALIDATION";
        }
        if cause.is::<RemoteCallError>() {
            return "REMOTE_CALL";
        }
        if cause.is::<SyncError>() {
            return "SYNC";
        }
        if cause.is::<CommandExecutionError>() {
            return "COMMAND_FAILED";
        }
        if cause.is::<ManifestError>() {
            return "MANIFEST";
        }
        if cause.is::<ConfigError>() {
            return "CONFIG";
        }
    }
    "ERROR"
}
