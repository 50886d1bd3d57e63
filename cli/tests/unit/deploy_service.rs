//! Tests for ad-hoc manifest apply and delete.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use serde_json::json;

use devpush_cli::application::services::deploy::{DeployOptions, delete, deploy};
use devpush_cli::domain::error::ManifestError;
use devpush_cli::domain::manifest::AppliedManifest;

use crate::mocks::{FakeDynamic, MemoryManifestStore, RecordingReporter, StaticFetcher};

const MANIFEST: &str = r"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: PROJECT_NAME
spec:
  template:
    spec:
      containers:
        - name: app
          image: CONTAINER_IMAGE
          ports:
            - containerPort: PORT
---
apiVersion: v1
kind: Service
metadata:
  name: PROJECT_NAME
spec:
  ports:
    - port: PORT
---
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: PROJECT_NAME
";

fn options(port: Option<u16>) -> DeployOptions<'static> {
    DeployOptions {
        component: "api",
        source: "kubernetes/deploy.yaml",
        image: "registry.local/api:42",
        port,
    }
}

// ── Apply ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_deploy_creates_every_document_and_records_it() {
    let api = FakeDynamic::new();
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", MANIFEST);
    let store = MemoryManifestStore::default();
    let reporter = RecordingReporter::default();

    let applied = deploy(&api, &fetcher, &store, &reporter, options(Some(8080)))
        .await
        .unwrap();

    assert_eq!(applied.len(), 3);
    assert!(applied.iter().all(|a| a.created));
    let resources: Vec<_> = applied.iter().map(|a| a.id.resource.as_str()).collect();
    assert_eq!(resources, vec!["deployments", "services", "ingresses"]);

    let deployment = api.get("deployments", "api-deploy").expect("deployment created");
    assert_eq!(
        deployment.pointer("/spec/template/spec/containers/0/image"),
        Some(&json!("registry.local/api:42"))
    );
    assert_eq!(
        deployment.pointer("/spec/template/spec/containers/0/ports/0/containerPort"),
        Some(&json!(8080))
    );

    let recorded = store.current().expect("manifest recorded");
    assert_eq!(recorded.source, "kubernetes/deploy.yaml");
    assert!(recorded.content.contains("name: api-deploy"));
    assert!(!recorded.content.contains("CONTAINER_IMAGE"));
    assert!(reporter.has("ok: created Deployment api-deploy"));
}

#[tokio::test]
async fn test_redeploy_updates_with_live_resource_version() {
    let api = FakeDynamic::new();
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", MANIFEST);
    let store = MemoryManifestStore::default();
    let reporter = RecordingReporter::default();
    deploy(&api, &fetcher, &store, &reporter, options(Some(8080)))
        .await
        .unwrap();

    let applied = deploy(&api, &fetcher, &store, &reporter, options(Some(8080)))
        .await
        .unwrap();

    assert!(applied.iter().all(|a| !a.created));
    assert_eq!(api.len(), 3);
    assert!(
        api.calls()
            .contains(&"update deployments/api-deploy".to_string())
    );
    assert!(reporter.has("ok: updated Service api-deploy"));
}

#[tokio::test]
async fn test_objects_with_other_names_are_not_matched() {
    let api = FakeDynamic::new();
    api.insert(
        "services",
        "web-deploy",
        json!({"metadata": {"name": "web-deploy", "resourceVersion": "7"}}),
    );
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", MANIFEST);
    let store = MemoryManifestStore::default();

    let applied = deploy(
        &api,
        &fetcher,
        &store,
        &RecordingReporter::default(),
        options(None),
    )
    .await
    .unwrap();

    assert!(applied.iter().all(|a| a.created));
    assert!(api.get("services", "web-deploy").is_some());
}

#[tokio::test]
async fn test_failed_document_does_not_stop_later_ones() {
    let api = FakeDynamic::new();
    let manifest = format!(
        "{MANIFEST}\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: settings\n"
    )
    .replace(
        "kind: Service\nmetadata:\n  name: PROJECT_NAME",
        "kind: Service\nmetadata:\n  name: broken",
    );
    api.fail_writes_to("broken");
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", &manifest);
    let store = MemoryManifestStore::default();
    let reporter = RecordingReporter::default();

    let err = deploy(&api, &fetcher, &store, &reporter, options(Some(80)))
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("failed to deploy Service"));
    assert!(api.get("deployments", "api-deploy").is_some());
    assert!(api.get("ingresses", "api-deploy").is_some());
    assert!(api.get("configmaps", "settings").is_some());
    assert!(reporter.has("fail: failed to deploy Service broken"));
    assert!(store.current().is_some(), "partial apply is still recorded");
}

#[tokio::test]
async fn test_missing_manifest_records_nothing() {
    let api = FakeDynamic::new();
    let fetcher = StaticFetcher::default();
    let store = MemoryManifestStore::default();

    let err = deploy(
        &api,
        &fetcher,
        &store,
        &RecordingReporter::default(),
        options(None),
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("unable to load manifest kubernetes/deploy.yaml"));
    assert!(api.calls().is_empty());
    assert!(store.current().is_none());
}

#[tokio::test]
async fn test_undecodable_manifest_applies_nothing() {
    let api = FakeDynamic::new();
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", "kind: Service\nmetadata: {}\n");
    let store = MemoryManifestStore::default();

    let err = deploy(
        &api,
        &fetcher,
        &store,
        &RecordingReporter::default(),
        options(None),
    )
    .await
    .unwrap_err();

    assert!(err.downcast_ref::<ManifestError>().is_some());
    assert!(api.calls().is_empty());
    assert!(store.current().is_none());
}

// ── Delete ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_delete_removes_recorded_documents_and_forgets_them() {
    let api = FakeDynamic::new();
    let fetcher = StaticFetcher::one("kubernetes/deploy.yaml", MANIFEST);
    let store = MemoryManifestStore::default();
    let reporter = RecordingReporter::default();
    deploy(&api, &fetcher, &store, &reporter, options(Some(8080)))
        .await
        .unwrap();

    let deleted = delete(&api, &store, &reporter).await.unwrap();

    assert_eq!(deleted.len(), 3);
    assert_eq!(api.len(), 0);
    assert!(store.current().is_none());
    assert!(reporter.has("ok: deleted Ingress api-deploy"));
}

#[tokio::test]
async fn test_delete_warns_about_already_absent_objects() {
    let api = FakeDynamic::new();
    api.insert(
        "services",
        "api-deploy",
        json!({"metadata": {"name": "api-deploy"}}),
    );
    let store = MemoryManifestStore::with(AppliedManifest {
        applied_at: Utc::now(),
        source: "deploy.yaml".to_string(),
        content: MANIFEST.replace("PROJECT_NAME", "api-deploy"),
    });
    let reporter = RecordingReporter::default();

    let deleted = delete(&api, &store, &reporter).await.unwrap();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].kind, "Service");
    assert!(reporter.has("warn: Deployment api-deploy does not exist"));
    assert!(reporter.has("warn: Ingress api-deploy does not exist"));
    assert!(store.current().is_none());
}

#[tokio::test]
async fn test_delete_without_record_fails() {
    let api = FakeDynamic::new();
    let store = MemoryManifestStore::default();

    let err = delete(&api, &store, &RecordingReporter::default())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("no deployed manifest recorded"));
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn test_failed_delete_keeps_the_record() {
    let api = FakeDynamic::new();
    api.fail_writes_to("api-deploy");
    let store = MemoryManifestStore::with(AppliedManifest {
        applied_at: Utc::now(),
        source: "deploy.yaml".to_string(),
        content: MANIFEST.replace("PROJECT_NAME", "api-deploy"),
    });
    let reporter = RecordingReporter::default();

    let err = delete(&api, &store, &reporter).await.unwrap_err();

    assert!(format!("{err:#}").contains("failed to delete Deployment api-deploy"));
    assert_eq!(api.calls().len(), 1, "later documents are not attempted");
    assert!(store.current().is_some());
}
