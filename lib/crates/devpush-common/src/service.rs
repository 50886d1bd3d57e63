use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// `v1` Service: the network-exposure object for a workload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default = "Service::api_version")]
    pub api_version: String,
    #[serde(default = "Service::kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: ServiceSpec,
}

impl Service {
    pub const API_VERSION: &'static str = "v1";
    pub const KIND: &'static str = "Service";

    fn api_version() -> String {
        Self::API_VERSION.to_string()
    }

    fn kind() -> String {
        Self::KIND.to_string()
    }

    #[must_use]
    pub fn new(metadata: ObjectMeta, spec: ServiceSpec) -> Self {
        Self {
            api_version: Self::api_version(),
            kind: Self::kind(),
            metadata,
            spec,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ServicePort>,
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub selector: std::collections::BTreeMap<String, String>,
    /// Assigned by the cluster; preserved across updates.
    #[serde(default, rename = "clusterIP", skip_serializing_if = "Option::is_none")]
    pub cluster_ip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    #[serde(default = "ServicePort::tcp_protocol")]
    pub protocol: String,
}

impl ServicePort {
    fn tcp_protocol() -> String {
        "TCP".to_string()
    }

    /// TCP port forwarded to the same container port.
    #[must_use]
    pub fn tcp(port: u16) -> Self {
        Self {
            name: format!("port-{port}"),
            port,
            target_port: port,
            protocol: Self::tcp_protocol(),
        }
    }
}
