//! Domain types and validators for devpush configuration.
//!
//! Pure functions only, no I/O, no async, no filesystem access.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

// ── Constants ────────────────────────────────────────────────────────────────

pub const VALID_CONFIG_KEYS: &[&str] = &[
    "cluster.kubectl",
    "cluster.namespace",
    "cluster.context",
    "cluster.command_timeout_secs",
    "cluster.exec_timeout_secs",
    "cluster.wait_timeout_secs",
    "cluster.poll_interval_ms",
    "sync.target_dir",
    "sync.ignore",
    "supervisor.bootstrap_image",
    "storage.default_size",
];

const NUMERIC_KEYS: &[&str] = &[
    "cluster.command_timeout_secs",
    "cluster.exec_timeout_secs",
    "cluster.wait_timeout_secs",
    "cluster.poll_interval_ms",
];

/// Numeric keys where `0` means "no limit".
const UNBOUNDED_KEYS: &[&str] = &["cluster.exec_timeout_secs"];

/// Keys that may be set to an empty value to clear them.
const CLEARABLE_KEYS: &[&str] = &["cluster.namespace", "cluster.context", "sync.ignore"];

pub const DEFAULT_BOOTSTRAP_IMAGE: &str = "quay.io/devpush/supervisord-init:1.0";

// ── Config schema ────────────────────────────────────────────────────────────

/// Top-level configuration stored in `~/.devpush/config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DevpushConfig {
    pub cluster: ClusterConfig,
    pub sync: SyncConfig,
    pub supervisor: SupervisorConfig,
    pub storage: StorageConfig,
}

/// How to reach the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// `kubectl` binary name or path.
    pub kubectl: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Timeout for a single get/create/update/delete call.
    pub command_timeout_secs: u64,
    /// Limit for a lifecycle command or archive extraction; `0` lets them
    /// run as long as they need.
    pub exec_timeout_secs: u64,
    /// How long to wait for a rollout or a running unit.
    pub wait_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            namespace: None,
            context: None,
            command_timeout_secs: 30,
            exec_timeout_secs: 0,
            wait_timeout_secs: 300,
            poll_interval_ms: 1000,
        }
    }
}

impl ClusterConfig {
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// `None` when lifecycle commands and extraction are unbounded.
    #[must_use]
    pub fn exec_timeout(&self) -> Option<Duration> {
        (self.exec_timeout_secs > 0).then(|| Duration::from_secs(self.exec_timeout_secs))
    }

    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Where and what to sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Source volume mount point inside containers.
    pub target_dir: String,
    /// Gitignore-style patterns excluded from every archive.
    pub ignore: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            target_dir: "/projects".to_string(),
            ignore: vec![".git".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Image whose `/opt/devpush-init` tree seeds the supervisor volume.
    pub bootstrap_image: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bootstrap_image: DEFAULT_BOOTSTRAP_IMAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Claim size for volumes that declare none.
    pub default_size: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_size: "1Gi".to_string(),
        }
    }
}

impl DevpushConfig {
    /// Set a validated key. Numeric keys parse `value`; `sync.ignore` takes
    /// a comma-separated list; clearable keys accept an empty value.
    ///
    /// # Errors
    ///
    /// Returns an error if the key or value is invalid.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        validate_config_key(key)?;
        validate_config_value(key, value)?;

        let optional = || (!value.is_empty()).then(|| value.to_string());
        let number = || value.parse::<u64>().unwrap_or_default();
        match key {
            "cluster.kubectl" => self.cluster.kubectl = value.to_string(),
            "cluster.namespace" => self.cluster.namespace = optional(),
            "cluster.context" => self.cluster.context = optional(),
            "cluster.command_timeout_secs" => self.cluster.command_timeout_secs = number(),
            "cluster.exec_timeout_secs" => self.cluster.exec_timeout_secs = number(),
            "cluster.wait_timeout_secs" => self.cluster.wait_timeout_secs = number(),
            "cluster.poll_interval_ms" => self.cluster.poll_interval_ms = number(),
            "sync.target_dir" => self.sync.target_dir = value.to_string(),
            "sync.ignore" => {
                self.sync.ignore = value
                    .split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "supervisor.bootstrap_image" => self.supervisor.bootstrap_image = value.to_string(),
            "storage.default_size" => self.storage.default_size = value.to_string(),
            _ => {}
        }
        Ok(())
    }
}

// ── Validators ───────────────────────────────────────────────────────────────

/// Validates a configuration key against the whitelist.
///
/// # Errors
///
/// Returns an error if the key is not in the allowed list.
pub fn validate_config_key(key: &str) -> Result<()> {
    if !VALID_CONFIG_KEYS.contains(&key) {
        return Err(ConfigError::UnknownKey {
            key: key.to_string(),
            valid: VALID_CONFIG_KEYS.join(", "),
        }
        .into());
    }
    Ok(())
}

/// Validates a configuration value for the given key.
///
/// # Errors
///
/// Returns an error if the value is not valid for the key.
pub fn validate_config_value(key: &str, value: &str) -> Result<()> {
    let invalid = |hint: &str| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        hint: hint.to_string(),
    };

    if value.trim().is_empty() && !CLEARABLE_KEYS.contains(&key) {
        return Err(invalid("Value must not be empty").into());
    }
    if UNBOUNDED_KEYS.contains(&key) && value.parse::<u64>().is_err() {
        return Err(invalid("Value must be a whole number (0 for no limit)").into());
    }
    if NUMERIC_KEYS.contains(&key)
        && !UNBOUNDED_KEYS.contains(&key)
        && !matches!(value.parse::<u64>(), Ok(n) if n > 0)
    {
        return Err(invalid("Value must be a positive whole number").into());
    }
    if key == "sync.target_dir" && !value.starts_with('/') {
        return Err(invalid("Value must be an absolute path").into());
    }
    Ok(())
}

// ── Unit tests ───────────────────────────────────────────────────────────────
