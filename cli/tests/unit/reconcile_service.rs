//! Tests for workload resource reconciliation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use devpush_cli::application::services::reconcile::{
    ReconcileParams, ServiceAction, await_unit, reconcile,
};
use devpush_cli::domain::command::{LifecycleCommand, Phase};
use devpush_cli::domain::error::{RemoteCallError, ValidationError};
use devpush_cli::domain::supervisor::{SUPERVISOR_VOLUME, SUPERVISORD_BINARY};
use devpush_cli::domain::workload::{SOURCE_VOLUME, WorkloadSpec, claim_name};

use crate::helpers::{command, with_port, with_volume, workload};
use crate::mocks::FakeCluster;

fn params<'a>(workload: &'a WorkloadSpec, run: &'a LifecycleCommand) -> ReconcileParams<'a> {
    ReconcileParams {
        workload,
        run_command: run,
        namespace: Some("dev"),
        target_dir: "/projects",
        bootstrap_image: "registry.local/devpush-init:1",
        default_claim_size: "2Gi",
    }
}

fn run_command() -> LifecycleCommand {
    command("serve", Phase::Run, "npm start")
}

// ── Creation ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_reconcile_creates_deployment_with_supervisor_wiring() {
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let run = run_command();

    let outcome = reconcile(&cluster, &params(&spec, &run), None).await.unwrap();

    assert!(outcome.created);
    assert_eq!(outcome.service, ServiceAction::Unchanged);
    let stored = cluster.deployment("api").expect("deployment stored");
    assert_eq!(stored.metadata.namespace.as_deref(), Some("dev"));

    let pod = &stored.spec.template.spec;
    assert_eq!(pod.init_containers.len(), 1);
    assert_eq!(pod.init_containers[0].image, "registry.local/devpush-init:1");
    assert!(pod.volumes.iter().any(|v| v.name == SUPERVISOR_VOLUME));
    assert!(pod.volumes.iter().any(|v| v.name == SOURCE_VOLUME));

    let runtime = &pod.containers[0];
    assert_eq!(runtime.command, vec![SUPERVISORD_BINARY.to_string()]);
    assert!(runtime
        .volume_mounts
        .iter()
        .any(|m| m.name == SOURCE_VOLUME && m.mount_path == "/projects"));
    assert!(runtime
        .env
        .iter()
        .any(|e| e.name == "DEVPUSH_COMMAND_RUN" && e.value.contains("npm start")));
}

#[tokio::test]
async fn test_first_reconcile_creates_owned_claims() {
    let cluster = FakeCluster::new();
    let spec = with_volume(workload("api"), "cache");
    let run = run_command();

    let outcome = reconcile(&cluster, &params(&spec, &run), None).await.unwrap();

    let expected = claim_name("cache", "api");
    assert_eq!(outcome.new_claims, vec![expected.clone()]);
    let claims = cluster.claims();
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].metadata.name(), expected);
    assert_eq!(
        claims[0].spec.resources.requests.get("storage").map(String::as_str),
        Some("2Gi")
    );
    assert_eq!(claims[0].metadata.owner_references[0].name, "api");
    assert_eq!(claims[0].metadata.owner_references[0].uid, "uid-api");

    let volumes = &cluster.deployment("api").unwrap().spec.template.spec.volumes;
    let cache = volumes.iter().find(|v| v.name == "cache").expect("cache volume");
    assert_eq!(
        cache.persistent_volume_claim.as_ref().unwrap().claim_name,
        expected
    );
}

// ── Idempotence ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_reconcile_updates_and_reuses_claims() {
    let cluster = FakeCluster::new();
    let spec = with_volume(workload("api"), "cache");
    let run = run_command();
    reconcile(&cluster, &params(&spec, &run), None).await.unwrap();

    let existing = cluster.deployment("api");
    let outcome = reconcile(&cluster, &params(&spec, &run), existing.as_ref())
        .await
        .unwrap();

    assert!(!outcome.created);
    assert!(outcome.new_claims.is_empty());
    assert_eq!(cluster.claims().len(), 1);
    assert_eq!(
        cluster.calls().iter().filter(|c| c.starts_with("create deployment")).count(),
        1
    );
    assert!(cluster.calls().contains(&"update deployment api".to_string()));
}

#[tokio::test]
async fn test_unchanged_reconcile_keeps_the_same_unit() {
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let run = run_command();
    reconcile(&cluster, &params(&spec, &run), None).await.unwrap();
    let first = await_unit(&cluster, &spec).await.unwrap();

    let existing = cluster.deployment("api");
    reconcile(&cluster, &params(&spec, &run), existing.as_ref())
        .await
        .unwrap();
    let second = await_unit(&cluster, &spec).await.unwrap();

    assert_eq!(first.name, second.name);
    assert!(second.container("runtime").is_some());
}

// ── Network exposure ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_service_follows_exposed_ports() {
    let cluster = FakeCluster::new();
    let run = run_command();
    let exposed = with_port(workload("api"), 3000);

    let created = reconcile(&cluster, &params(&exposed, &run), None).await.unwrap();
    assert_eq!(created.service, ServiceAction::Created);
    let service = cluster.service("api").expect("service created");
    assert_eq!(service.spec.ports[0].port, 3000);
    assert_eq!(service.metadata.owner_references[0].name, "api");

    let existing = cluster.deployment("api");
    let updated = reconcile(&cluster, &params(&exposed, &run), existing.as_ref())
        .await
        .unwrap();
    assert_eq!(updated.service, ServiceAction::Updated);
    assert_eq!(
        cluster.service("api").unwrap().spec.cluster_ip,
        service.spec.cluster_ip
    );

    let closed = workload("api");
    let existing = cluster.deployment("api");
    let deleted = reconcile(&cluster, &params(&closed, &run), existing.as_ref())
        .await
        .unwrap();
    assert_eq!(deleted.service, ServiceAction::Deleted);
    assert!(cluster.service("api").is_none());

    let existing = cluster.deployment("api");
    let again = reconcile(&cluster, &params(&closed, &run), existing.as_ref())
        .await
        .unwrap();
    assert_eq!(again.service, ServiceAction::Unchanged);
}

#[tokio::test]
async fn test_service_created_when_ports_appear_on_existing_workload() {
    let cluster = FakeCluster::new();
    let run = run_command();
    reconcile(&cluster, &params(&workload("api"), &run), None)
        .await
        .unwrap();

    let exposed = with_port(workload("api"), 8080);
    let existing = cluster.deployment("api");
    let outcome = reconcile(&cluster, &params(&exposed, &run), existing.as_ref())
        .await
        .unwrap();

    assert_eq!(outcome.service, ServiceAction::Created);
    assert!(cluster.service("api").is_some());
}

// ── Failures ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_run_command_on_unknown_container_fails_before_any_call() {
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let mut run = run_command();
    run.component = "sidecar".to_string();

    let err = reconcile(&cluster, &params(&spec, &run), None).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::UnknownContainer { container, .. }) if container == "sidecar"
    ));
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_cluster_failure_names_the_operation() {
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let run = run_command();
    reconcile(&cluster, &params(&spec, &run), None).await.unwrap();

    // Claiming the workload is new while it exists makes the create fail.
    let err = reconcile(&cluster, &params(&spec, &run), None).await.unwrap_err();

    let remote = err.downcast_ref::<RemoteCallError>().expect("remote call error");
    assert_eq!(remote.operation, "create deployment");
    assert_eq!(remote.workload, "api");
    assert!(format!("{err:#}").contains("already exists"));
}
