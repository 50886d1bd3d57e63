//! The `devpush.yaml` component file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::command::LifecycleCommand;
use crate::domain::workload::WorkloadSpec;

/// File name looked up in the context directory.
pub const COMPONENT_FILE: &str = "devpush.yaml";

/// A parsed component file: the workload, its lifecycle commands and the
/// optional deploy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFile {
    #[serde(flatten)]
    pub workload: WorkloadSpec,
    #[serde(default)]
    pub commands: Vec<LifecycleCommand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deploy: Option<DeploySettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploySettings {
    /// Local path or `http(s)://` URL of the manifest.
    pub manifest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl ComponentFile {
    /// Parse and validate component file contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is malformed or the workload is invalid.
    pub fn parse(raw: &str) -> Result<Self> {
        let file: Self = serde_yaml::from_str(raw).context("invalid component file")?;
        file.workload.validate()?;
        Ok(file)
    }

    /// Port substituted into deploy manifests: the configured one, else the
    /// first port any container exposes.
    #[must_use]
    pub fn deploy_port(&self) -> Option<u16> {
        self.deploy
            .as_ref()
            .and_then(|d| d.port)
            .or_else(|| self.workload.exposed_ports().first().copied())
    }
}
