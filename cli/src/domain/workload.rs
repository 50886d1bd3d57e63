//! Workload description and the pure derivations the reconciler needs.
//!
//! Zero imports from `tokio`, `std::fs`, `crate::infra`, `crate::commands`,
//! or `crate::application`.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::error::ValidationError;

/// Reserved volume shared by every container that mounts project sources.
pub const SOURCE_VOLUME: &str = "devpush-projects";

/// Label carrying the owning component's name.
pub const COMPONENT_LABEL: &str = "component";

/// Label carrying the logical volume name on a claim.
pub const STORAGE_LABEL: &str = "devpush.dev/storage-name";

/// Longest prefix kept from `<volume>-<workload>` before the hash suffix.
const CLAIM_PREFIX_MAX: usize = 40;

/// DNS-1123 label, the naming rule for every resource devpush creates.
pub static DNS_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Constant pattern.
    #[allow(clippy::expect_used)]
    Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").expect("valid regex")
});

/// The logical component: a name, labels and an ordered container list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSpec {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub containers: Vec<ContainerDef>,
}

/// One container of the workload as declared by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDef {
    pub name: String,
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<EnvVarDef>,
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub volumes: Vec<VolumeDef>,
    /// Mount the shared source volume into this container.
    #[serde(default)]
    pub mount_sources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVarDef {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// A persistent volume mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeDef {
    pub name: String,
    pub path: String,
    /// Requested storage, e.g. `"5Gi"`. Falls back to the configured default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Where commands and archives are delivered: a unit and one of its containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRef {
    pub unit: String,
    pub container: String,
}

impl WorkloadSpec {
    /// Check naming rules and that at least one container is declared.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an invalid name or an empty container list.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        if self.containers.is_empty() {
            return Err(ValidationError::NoContainers {
                workload: self.name.clone(),
            });
        }
        for container in &self.containers {
            validate_name(&container.name)?;
        }
        Ok(())
    }

    /// The first container with the source volume mounted. Files are synced
    /// once into this container; every other mounting container sees them
    /// through the shared volume.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoSourceVolume`] when no container mounts sources.
    pub fn source_container(&self) -> Result<&ContainerDef, ValidationError> {
        self.containers
            .iter()
            .find(|c| c.mount_sources)
            .ok_or_else(|| ValidationError::NoSourceVolume {
                workload: self.name.clone(),
            })
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<&ContainerDef> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// User labels plus the `component` label that selects this workload.
    #[must_use]
    pub fn component_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.labels.clone();
        labels.insert(COMPONENT_LABEL.to_string(), self.name.clone());
        labels
    }

    /// Selector matching the workload's execution units.
    #[must_use]
    pub fn unit_selector(&self) -> String {
        format!("{COMPONENT_LABEL}={}", self.name)
    }

    /// Every declared volume, deduplicated by name. The first declaration wins.
    #[must_use]
    pub fn unique_volumes(&self) -> Vec<&VolumeDef> {
        let mut seen = HashSet::new();
        self.containers
            .iter()
            .flat_map(|c| c.volumes.iter())
            .filter(|v| seen.insert(v.name.as_str()))
            .collect()
    }

    /// Union of every container's ports in declaration order.
    #[must_use]
    pub fn exposed_ports(&self) -> Vec<u16> {
        let mut seen = HashSet::new();
        self.containers
            .iter()
            .flat_map(|c| c.ports.iter().copied())
            .filter(|p| seen.insert(*p))
            .collect()
    }
}

/// Validate a resource name against the DNS label rule.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidName`] if `name` is not a DNS label.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if DNS_LABEL_RE.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidName(name.to_string()))
    }
}

/// Deterministic claim name for a (volume, workload) pair.
///
/// `<volume>-<workload>` squeezed into DNS-label characters and truncated,
/// then suffixed with eight hex digits of a SHA-256 over the raw pair so
/// truncated names for distinct pairs still differ.
#[must_use]
pub fn claim_name(volume: &str, workload: &str) -> String {
    let mut prefix = sanitize(&format!("{volume}-{workload}"));
    prefix.truncate(CLAIM_PREFIX_MAX);
    let prefix = prefix.trim_end_matches('-');

    let mut hasher = Sha256::new();
    hasher.update(volume.as_bytes());
    hasher.update([0]);
    hasher.update(workload.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    if prefix.is_empty() {
        format!("claim-{}", &digest[..8])
    } else {
        format!("{prefix}-{}", &digest[..8])
    }
}

/// Lowercase, map anything outside `[a-z0-9-]` to `-`, collapse runs, trim.
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars().flat_map(char::to_lowercase) {
        let ch = if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            ch
        } else {
            '-'
        };
        if ch == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(ch);
    }
    out.trim_end_matches('-').to_string()
}
