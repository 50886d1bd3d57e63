//! Cluster resource wire types.
//!
//! These mirror the subset of the cluster API that devpush reads and
//! writes. Field names follow the API's camelCase JSON encoding and every
//! optional field is omitted when unset so that documents sent to the
//! cluster only carry what devpush manages.

pub mod meta;
pub mod pod;
pub mod service;
pub mod storage;
pub mod workloads;

pub use meta::{LabelSelector, List, ObjectMeta, OwnerReference};
pub use pod::{Pod, PodSpec, PodStatus};
pub use service::{Service, ServicePort, ServiceSpec};
pub use storage::{PersistentVolumeClaim, PersistentVolumeClaimSpec, ResourceRequirements};
pub use workloads::{
    Container, ContainerPort, Deployment, DeploymentSpec, EmptyDirVolumeSource, EnvVar,
    PersistentVolumeClaimVolumeSource, PodTemplateSpec, Volume, VolumeMount,
};
