use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// `v1` PersistentVolumeClaim: storage requested for a workload volume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaim {
    #[serde(default = "PersistentVolumeClaim::api_version")]
    pub api_version: String,
    #[serde(default = "PersistentVolumeClaim::kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: PersistentVolumeClaimSpec,
}

impl PersistentVolumeClaim {
    pub const API_VERSION: &'static str = "v1";
    pub const KIND: &'static str = "PersistentVolumeClaim";

    fn api_version() -> String {
        Self::API_VERSION.to_string()
    }

    fn kind() -> String {
        Self::KIND.to_string()
    }

    /// A read-write-once claim requesting `size` of storage.
    #[must_use]
    pub fn read_write_once(metadata: ObjectMeta, size: &str) -> Self {
        Self {
            api_version: Self::api_version(),
            kind: Self::kind(),
            metadata,
            spec: PersistentVolumeClaimSpec {
                access_modes: vec!["ReadWriteOnce".to_string()],
                resources: ResourceRequirements {
                    requests: BTreeMap::from([("storage".to_string(), size.to_string())]),
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistentVolumeClaimSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub access_modes: Vec<String>,
    #[serde(default)]
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}
