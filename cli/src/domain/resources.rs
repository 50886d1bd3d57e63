//! Cluster documents derived from a [`WorkloadSpec`].

use std::collections::BTreeMap;

use devpush_common::{
    Container, ContainerPort, Deployment, EnvVar, ObjectMeta, OwnerReference,
    PersistentVolumeClaim, PodSpec, PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume,
    VolumeMount,
};

use crate::domain::error::ValidationError;
use crate::domain::workload::{COMPONENT_LABEL, SOURCE_VOLUME, STORAGE_LABEL, WorkloadSpec};

/// Map the declared containers onto cluster containers.
///
/// Containers with `mountSources` get the source volume at `target_dir`.
///
/// # Errors
///
/// Returns [`ValidationError::NoContainers`] if the result is empty.
pub fn build_containers(
    workload: &WorkloadSpec,
    target_dir: &str,
) -> Result<Vec<Container>, ValidationError> {
    let containers: Vec<Container> = workload
        .containers
        .iter()
        .map(|def| {
            let mut volume_mounts: Vec<VolumeMount> = def
                .volumes
                .iter()
                .map(|v| VolumeMount {
                    name: v.name.clone(),
                    mount_path: v.path.clone(),
                })
                .collect();
            if def.mount_sources {
                volume_mounts.push(VolumeMount {
                    name: SOURCE_VOLUME.to_string(),
                    mount_path: target_dir.to_string(),
                });
            }
            Container {
                name: def.name.clone(),
                image: def.image.clone(),
                command: def.command.clone(),
                args: def.args.clone(),
                env: def
                    .env
                    .iter()
                    .map(|e| EnvVar {
                        name: e.name.clone(),
                        value: e.value.clone(),
                    })
                    .collect(),
                ports: def.ports.iter().copied().map(ContainerPort::tcp_port).collect(),
                volume_mounts,
                image_pull_policy: Some("Always".to_string()),
            }
        })
        .collect();

    if containers.is_empty() {
        return Err(ValidationError::NoContainers {
            workload: workload.name.clone(),
        });
    }
    Ok(containers)
}

/// Pod template carrying the component labels.
#[must_use]
pub fn pod_template(
    workload: &WorkloadSpec,
    containers: Vec<Container>,
    init_containers: Vec<Container>,
    volumes: Vec<Volume>,
) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: ObjectMeta::named(&workload.name, None, workload.component_labels()),
        spec: PodSpec {
            init_containers,
            containers,
            volumes,
        },
    }
}

#[must_use]
pub fn deployment(
    workload: &WorkloadSpec,
    namespace: Option<String>,
    template: PodTemplateSpec,
) -> Deployment {
    Deployment::from_template(
        ObjectMeta::named(&workload.name, namespace, workload.component_labels()),
        template,
    )
}

/// Service exposing `ports` on every unit of the workload.
#[must_use]
pub fn service(workload: &WorkloadSpec, namespace: Option<String>, ports: &[u16]) -> Service {
    let selector = BTreeMap::from([(COMPONENT_LABEL.to_string(), workload.name.clone())]);
    Service::new(
        ObjectMeta::named(&workload.name, namespace, workload.component_labels()),
        ServiceSpec {
            ports: ports.iter().copied().map(ServicePort::tcp).collect(),
            selector,
            cluster_ip: None,
        },
    )
}

/// Labels identifying the claim for `volume` owned by the workload.
#[must_use]
pub fn claim_labels(workload: &WorkloadSpec, volume: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (COMPONENT_LABEL.to_string(), workload.name.clone()),
        (STORAGE_LABEL.to_string(), volume.to_string()),
    ])
}

#[must_use]
pub fn claim(
    workload: &WorkloadSpec,
    namespace: Option<String>,
    volume: &str,
    claim_name: &str,
    size: &str,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim::read_write_once(
        ObjectMeta::named(claim_name, namespace, claim_labels(workload, volume)),
        size,
    )
}

/// Controller reference back to the workload's deployment.
#[must_use]
pub fn owner_reference(deployment: &Deployment) -> OwnerReference {
    OwnerReference {
        api_version: Deployment::API_VERSION.to_string(),
        kind: Deployment::KIND.to_string(),
        name: deployment.metadata.name().to_string(),
        uid: deployment.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
    }
}
