//! End-to-end tests of the push pipeline against an in-memory cluster.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use devpush_cli::application::services::lifecycle::RunAction;
use devpush_cli::application::services::push::{PushOptions, PushOutcome, push};
use devpush_cli::domain::command::CommandSet;
use devpush_cli::domain::config::DevpushConfig;
use devpush_cli::domain::error::ValidationError;
use devpush_cli::domain::sync::WatchedChanges;
use devpush_cli::domain::workload::WorkloadSpec;
use devpush_cli::infra::archive::TarArchiver;

use crate::helpers::{full_commands, with_port, workload};
use crate::mocks::{FakeCluster, RecordingReporter};

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("server.js"), "listen(3000)").unwrap();
    std::fs::write(dir.path().join("README.md"), "# api").unwrap();
    dir
}

async fn run_push(
    cluster: &FakeCluster,
    spec: &WorkloadSpec,
    commands: &CommandSet,
    root: &Path,
    watched: Option<WatchedChanges>,
) -> anyhow::Result<PushOutcome> {
    let config = DevpushConfig::default();
    push(
        cluster,
        &TarArchiver,
        &RecordingReporter::default(),
        PushOptions {
            workload: spec,
            commands,
            source_root: root,
            config: &config,
            namespace: None,
            watched,
            force: false,
            show_output: false,
        },
    )
    .await
}

fn changed(paths: &[&str]) -> Option<WatchedChanges> {
    Some(WatchedChanges {
        changed: paths.iter().map(PathBuf::from).collect(),
        deleted: Vec::new(),
    })
}

#[tokio::test]
async fn test_first_push_creates_syncs_and_runs_everything() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");

    let outcome = run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        PushOutcome {
            created: true,
            unit: "api-1".to_string(),
            unit_changed: false,
            incremental: false,
            run: Some(RunAction::Restarted),
        }
    );
    let entries = &cluster.extractions()[0].entries;
    assert!(entries.iter().any(|e| e == "server.js"));
    assert!(entries.iter().any(|e| e == "README.md"));
    assert!(cluster.execs().iter().any(|e| e.argv.last().unwrap() == "npm ci"));
}

#[tokio::test]
async fn test_second_push_updates_in_place_and_skips_init() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");
    run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();
    cluster.clear_history();

    let outcome = run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();

    assert!(!outcome.created);
    assert!(!outcome.unit_changed);
    assert!(!outcome.incremental);
    assert_eq!(outcome.unit, "api-1");
    assert!(cluster.calls().contains(&"update deployment api".to_string()));
    assert!(!cluster.execs().iter().any(|e| e.argv.last().unwrap() == "npm ci"));
    assert!(
        cluster
            .execs()
            .iter()
            .any(|e| e.argv.last().unwrap() == "npm run build")
    );
}

#[tokio::test]
async fn test_watched_changes_sync_incrementally() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");
    run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();
    cluster.clear_history();

    let outcome = run_push(&cluster, &spec, &commands, dir.path(), changed(&["server.js"]))
        .await
        .unwrap();

    assert!(outcome.incremental);
    assert_eq!(cluster.extractions()[0].entries, vec!["server.js"]);
}

#[tokio::test]
async fn test_replaced_unit_gets_a_full_sync() {
    let dir = project();
    let cluster = FakeCluster::new();
    let commands = full_commands("api");
    run_push(&cluster, &workload("api"), &commands, dir.path(), None)
        .await
        .unwrap();
    cluster.clear_history();

    // A new port changes the pod template, so the rollout replaces the unit.
    let exposed = with_port(workload("api"), 3000);
    let outcome = run_push(&cluster, &exposed, &commands, dir.path(), changed(&["server.js"]))
        .await
        .unwrap();

    assert!(outcome.unit_changed);
    assert!(!outcome.incremental);
    assert_eq!(outcome.unit, "api-2");
    let entries = &cluster.extractions()[0].entries;
    assert!(entries.iter().any(|e| e == "README.md"));
    assert!(cluster.service("api").is_some());
}

#[tokio::test]
async fn test_no_changes_runs_no_commands() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");
    run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();
    cluster.clear_history();

    let outcome = run_push(&cluster, &spec, &commands, dir.path(), changed(&[]))
        .await
        .unwrap();

    assert_eq!(outcome.run, None);
    assert!(cluster.execs().is_empty());
    assert!(cluster.extractions().is_empty());
}

#[tokio::test]
async fn test_workload_without_source_volume_is_rejected_up_front() {
    let dir = project();
    let cluster = FakeCluster::new();
    let mut spec = workload("api");
    spec.containers[0].mount_sources = false;
    let commands = full_commands("api");

    let err = run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::NoSourceVolume { workload }) if workload == "api"
    ));
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_watched_path_outside_the_root_is_rejected_up_front() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");
    let watched = Some(WatchedChanges {
        changed: Vec::new(),
        deleted: vec![PathBuf::from("../x")],
    });

    let err = run_push(&cluster, &spec, &commands, dir.path(), watched)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<ValidationError>(),
        Some(ValidationError::PathOutsideRoot { path, .. }) if path == "../x"
    ));
    assert!(cluster.calls().is_empty());
    assert!(cluster.execs().is_empty());
}

#[tokio::test]
async fn test_absolute_watched_path_under_the_root_syncs_incrementally() {
    let dir = project();
    let cluster = FakeCluster::new();
    let spec = workload("api");
    let commands = full_commands("api");
    run_push(&cluster, &spec, &commands, dir.path(), None)
        .await
        .unwrap();
    cluster.clear_history();

    let absolute = dir.path().join("server.js");
    let outcome = run_push(
        &cluster,
        &spec,
        &commands,
        dir.path(),
        changed(&[absolute.to_str().unwrap()]),
    )
    .await
    .unwrap();

    assert!(outcome.incremental);
    assert_eq!(cluster.extractions()[0].entries, vec!["server.js"]);
}
