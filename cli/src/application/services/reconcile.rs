//! Application service: workload resource reconciliation.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use anyhow::Result;
use devpush_common::{Container, Deployment, PersistentVolumeClaim, Pod, Volume};
use tracing::{debug, info};

use crate::application::ports::{ClaimApi, ServiceApi, UnitApi, WorkloadApi};
use crate::domain::command::{LifecycleCommand, Phase};
use crate::domain::error::{RemoteCallError, ValidationError};
use crate::domain::resources;
use crate::domain::supervisor;
use crate::domain::workload::{SOURCE_VOLUME, UnitRef, WorkloadSpec, claim_name};

/// Everything one reconciliation needs, passed explicitly per call.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileParams<'a> {
    pub workload: &'a WorkloadSpec,
    /// Run command wired into the supervisor environment.
    pub run_command: &'a LifecycleCommand,
    pub namespace: Option<&'a str>,
    /// Mount point of the source volume.
    pub target_dir: &'a str,
    pub bootstrap_image: &'a str,
    /// Claim size for volumes that declare none.
    pub default_claim_size: &'a str,
}

/// What happened to the network exposure object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Created,
    Updated,
    Deleted,
    Unchanged,
}

/// Result of [`reconcile`].
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    /// The deployment as stored by the cluster.
    pub deployment: Deployment,
    /// `true` when the deployment was created rather than updated.
    pub created: bool,
    pub service: ServiceAction,
    /// Names of claims created by this call.
    pub new_claims: Vec<String>,
}

/// A running execution unit of the workload.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    pub name: String,
    pub containers: Vec<Container>,
}

impl ExecutionUnit {
    #[must_use]
    pub fn from_pod(pod: Pod) -> Self {
        Self {
            name: pod.metadata.name().to_string(),
            containers: pod.spec.containers,
        }
    }

    #[must_use]
    pub fn container(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Address a container of this unit.
    #[must_use]
    pub fn at(&self, container: &str) -> UnitRef {
        UnitRef {
            unit: self.name.clone(),
            container: container.to_string(),
        }
    }
}

/// Create or update the workload's deployment, service and claims.
///
/// `existing` is the deployment found before the push, if any; its presence
/// selects the update branch. Claims are reused by label; only missing ones
/// are created, after the deployment so they can be owned by it.
///
/// # Errors
///
/// Returns a [`ValidationError`] if the workload yields no containers or
/// the run command targets an undeclared container, and a
/// [`RemoteCallError`] naming the failed sub-resource for any cluster call.
pub async fn reconcile(
    cluster: &(impl WorkloadApi + ServiceApi + ClaimApi),
    params: &ReconcileParams<'_>,
    existing: Option<&Deployment>,
) -> Result<ReconcileOutcome> {
    let workload = params.workload;
    let remote = |operation: String| {
        move |source: anyhow::Error| RemoteCallError::new(&workload.name, operation, source)
    };

    let mut containers = resources::build_containers(workload, params.target_dir)?;
    if !supervisor::augment_run_container(&mut containers, params.run_command) {
        return Err(ValidationError::UnknownContainer {
            phase: Phase::Run,
            id: params.run_command.id.clone(),
            container: params.run_command.component.clone(),
        }
        .into());
    }

    let mut volumes = vec![supervisor::supervisor_volume()];
    if workload.containers.iter().any(|c| c.mount_sources) {
        volumes.push(Volume::empty_dir(SOURCE_VOLUME));
    }

    let mut pending_claims = Vec::new();
    for volume in workload.unique_volumes() {
        let labels = resources::claim_labels(workload, &volume.name);
        let selector = labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        let found = cluster
            .list_claims(&selector)
            .await
            .map_err(remote(format!("list claims for volume '{}'", volume.name)))?;

        let name = if let Some(claim) = found.first() {
            debug!(volume = %volume.name, claim = claim.metadata.name(), "reusing claim");
            claim.metadata.name().to_string()
        } else {
            let name = claim_name(&volume.name, &workload.name);
            let size = volume.size.as_deref().unwrap_or(params.default_claim_size);
            pending_claims.push(resources::claim(
                workload,
                params.namespace.map(str::to_string),
                &volume.name,
                &name,
                size,
            ));
            name
        };
        volumes.push(Volume::claim(&volume.name, name));
    }

    let template = resources::pod_template(
        workload,
        containers,
        vec![supervisor::bootstrap_container(params.bootstrap_image)],
        volumes,
    );
    let mut desired =
        resources::deployment(workload, params.namespace.map(str::to_string), template);

    let (deployment, created) = if let Some(current) = existing {
        info!(workload = %workload.name, "updating deployment");
        desired.metadata.resource_version.clone_from(&current.metadata.resource_version);
        let updated = cluster
            .update_deployment(&desired)
            .await
            .map_err(remote("update deployment".to_string()))?;
        (updated, false)
    } else {
        info!(workload = %workload.name, "creating deployment");
        let created = cluster
            .create_deployment(&desired)
            .await
            .map_err(remote("create deployment".to_string()))?;
        (created, true)
    };

    let owner = resources::owner_reference(&deployment);
    let service = reconcile_service(cluster, params, &owner, created).await?;

    let mut new_claims = Vec::with_capacity(pending_claims.len());
    for mut claim in pending_claims {
        let name = claim.metadata.name().to_string();
        claim.metadata.owner_references = vec![owner.clone()];
        create_claim(cluster, &claim)
            .await
            .map_err(remote(format!("create claim '{name}'")))?;
        new_claims.push(name);
    }

    Ok(ReconcileOutcome {
        deployment,
        created,
        service,
        new_claims,
    })
}

async fn create_claim(
    cluster: &impl ClaimApi,
    claim: &PersistentVolumeClaim,
) -> Result<PersistentVolumeClaim> {
    debug!(claim = claim.metadata.name(), "creating claim");
    cluster.create_claim(claim).await
}

async fn reconcile_service(
    cluster: &impl ServiceApi,
    params: &ReconcileParams<'_>,
    owner: &devpush_common::OwnerReference,
    created: bool,
) -> Result<ServiceAction> {
    let workload = params.workload;
    let remote = |operation: &'static str| {
        move |source: anyhow::Error| RemoteCallError::new(&workload.name, operation, source)
    };
    let ports = workload.exposed_ports();

    let mut desired = resources::service(workload, params.namespace.map(str::to_string), &ports);
    desired.metadata.owner_references = vec![owner.clone()];

    if created {
        if ports.is_empty() {
            return Ok(ServiceAction::Unchanged);
        }
        cluster
            .create_service(&desired)
            .await
            .map_err(remote("create service"))?;
        return Ok(ServiceAction::Created);
    }

    let current = cluster
        .get_service(&workload.name)
        .await
        .map_err(remote("get service"))?;

    match (current, ports.is_empty()) {
        (None, true) => Ok(ServiceAction::Unchanged),
        (None, false) => {
            cluster
                .create_service(&desired)
                .await
                .map_err(remote("create service"))?;
            Ok(ServiceAction::Created)
        }
        (Some(current), false) => {
            desired.spec.cluster_ip = current.spec.cluster_ip;
            desired.metadata.resource_version = current.metadata.resource_version;
            cluster
                .update_service(&desired)
                .await
                .map_err(remote("update service"))?;
            Ok(ServiceAction::Updated)
        }
        (Some(_), true) => {
            cluster
                .delete_service(&workload.name)
                .await
                .map_err(remote("delete service"))?;
            Ok(ServiceAction::Deleted)
        }
    }
}

/// Wait for the rollout to finish and a unit of the workload to run.
///
/// # Errors
///
/// Returns a [`RemoteCallError`] if either wait fails.
pub async fn await_unit(
    cluster: &(impl WorkloadApi + UnitApi),
    workload: &WorkloadSpec,
) -> Result<ExecutionUnit> {
    cluster
        .wait_for_rollout(&workload.name)
        .await
        .map_err(|e| RemoteCallError::new(&workload.name, "wait for rollout", e))?;
    running_unit(cluster, workload).await
}

/// The workload's running unit, waiting for one if necessary.
///
/// # Errors
///
/// Returns a [`RemoteCallError`] if no unit reaches the running state.
pub async fn running_unit(cluster: &impl UnitApi, workload: &WorkloadSpec) -> Result<ExecutionUnit> {
    let pod = cluster
        .wait_for_running_unit(&workload.unit_selector())
        .await
        .map_err(|e| RemoteCallError::new(&workload.name, "wait for running unit", e))?;
    debug!(unit = pod.metadata.name(), "unit running");
    Ok(ExecutionUnit::from_pod(pod))
}
