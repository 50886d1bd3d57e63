//! In-memory implementations of the application ports.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::process::Output;
use std::sync::Mutex;

use anyhow::{Result, anyhow, bail};
use devpush_common::{Deployment, ObjectMeta, PersistentVolumeClaim, Pod, PodStatus, Service};
use serde_json::Value;
use tokio::sync::mpsc;

use devpush_cli::application::ports::{
    ClaimApi, ContainerExec, DynamicApi, ManifestFetcher, ManifestStore, ProgressReporter,
    ServiceApi, UnitApi, WorkloadApi,
};
use devpush_cli::domain::manifest::{AppliedManifest, ResourceId};

use crate::helpers::{err_output, ok_output};

fn matches_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|s| !s.is_empty())
        .all(|pair| match pair.split_once('=') {
            Some((k, v)) => labels.get(k).is_some_and(|l| l == v),
            None => false,
        })
}

// ── FakeCluster ──────────────────────────────────────────────────────────────

/// One `exec` into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecCall {
    pub unit: String,
    pub container: String,
    pub argv: Vec<String>,
}

/// One archive extracted into a container.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub unit: String,
    pub container: String,
    pub target_dir: String,
    /// Entry paths of the received tar stream, in order.
    pub entries: Vec<String>,
}

#[derive(Default)]
struct ClusterState {
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,
    claims: Vec<PersistentVolumeClaim>,
    /// Running unit per deployment.
    pods: BTreeMap<String, Pod>,
    revisions: BTreeMap<String, u32>,
    next_version: u64,
}

impl ClusterState {
    fn version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    /// Replace the deployment's unit with one built from its template.
    fn roll_out(&mut self, deployment: &Deployment) {
        let name = deployment.metadata.name().to_string();
        let revision = self.revisions.entry(name.clone()).or_insert(0);
        *revision += 1;
        let template = &deployment.spec.template;
        let pod = Pod {
            metadata: ObjectMeta::named(
                format!("{name}-{revision}"),
                None,
                template.metadata.labels.clone(),
            ),
            spec: template.spec.clone(),
            status: PodStatus {
                phase: Some("Running".to_string()),
            },
        };
        self.pods.insert(name, pod);
    }
}

/// A cluster kept in memory.
///
/// Creating a deployment starts a running unit; updating it with a
/// different pod template replaces the unit under a new name, as a rollout
/// would. Updates are checked against the stored resource version.
#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<ClusterState>,
    calls: Mutex<Vec<String>>,
    execs: Mutex<Vec<ExecCall>>,
    extractions: Mutex<Vec<Extraction>>,
    failing_exec: Mutex<Option<String>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any exec whose argv contains `needle` exits 1.
    pub fn fail_exec_containing(&self, needle: &str) {
        *self.failing_exec.lock().unwrap() = Some(needle.to_string());
    }

    /// Reschedule the deployment's unit without changing the deployment.
    pub fn reschedule(&self, deployment: &str) {
        let mut state = self.state.lock().unwrap();
        let current = state.deployments.get(deployment).cloned().unwrap();
        state.roll_out(&current);
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state.lock().unwrap().deployments.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state.lock().unwrap().services.get(name).cloned()
    }

    pub fn claims(&self) -> Vec<PersistentVolumeClaim> {
        self.state.lock().unwrap().claims.clone()
    }

    pub fn unit_name(&self, deployment: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .pods
            .get(deployment)
            .map(|p| p.metadata.name().to_string())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn execs(&self) -> Vec<ExecCall> {
        self.execs.lock().unwrap().clone()
    }

    pub fn extractions(&self) -> Vec<Extraction> {
        self.extractions.lock().unwrap().clone()
    }

    pub fn clear_history(&self) {
        self.calls.lock().unwrap().clear();
        self.execs.lock().unwrap().clear();
        self.extractions.lock().unwrap().clear();
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn run_exec(&self, unit: &str, container: &str, argv: &[String]) -> Output {
        self.execs.lock().unwrap().push(ExecCall {
            unit: unit.to_string(),
            container: container.to_string(),
            argv: argv.to_vec(),
        });
        let failing = self.failing_exec.lock().unwrap().clone();
        match failing {
            Some(needle) if argv.iter().any(|a| a.contains(&needle)) => {
                err_output(1, b"command exited with error")
            }
            _ => ok_output(b""),
        }
    }
}

impl WorkloadApi for FakeCluster {
    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>> {
        self.record(format!("get deployment {name}"));
        Ok(self.deployment(name))
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let name = deployment.metadata.name().to_string();
        self.record(format!("create deployment {name}"));
        let mut state = self.state.lock().unwrap();
        if state.deployments.contains_key(&name) {
            bail!("deployments \"{name}\" already exists");
        }
        let mut stored = deployment.clone();
        stored.metadata.uid = Some(format!("uid-{name}"));
        stored.metadata.resource_version = Some(state.version());
        state.roll_out(&stored);
        state.deployments.insert(name, stored.clone());
        Ok(stored)
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        let name = deployment.metadata.name().to_string();
        self.record(format!("update deployment {name}"));
        let mut state = self.state.lock().unwrap();
        let current = state
            .deployments
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow!("deployments \"{name}\" not found"))?;
        if deployment.metadata.resource_version != current.metadata.resource_version {
            bail!("conflict: resource version mismatch for {name}");
        }
        let mut stored = deployment.clone();
        stored.metadata.uid.clone_from(&current.metadata.uid);
        stored.metadata.resource_version = Some(state.version());
        if stored.spec.template != current.spec.template {
            state.roll_out(&stored);
        }
        state.deployments.insert(name, stored.clone());
        Ok(stored)
    }

    async fn wait_for_rollout(&self, name: &str) -> Result<()> {
        self.record(format!("wait rollout {name}"));
        Ok(())
    }
}

impl ServiceApi for FakeCluster {
    async fn get_service(&self, name: &str) -> Result<Option<Service>> {
        self.record(format!("get service {name}"));
        Ok(self.service(name))
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        let name = service.metadata.name().to_string();
        self.record(format!("create service {name}"));
        let mut state = self.state.lock().unwrap();
        if state.services.contains_key(&name) {
            bail!("services \"{name}\" already exists");
        }
        let mut stored = service.clone();
        stored.metadata.resource_version = Some(state.version());
        stored.spec.cluster_ip = Some("10.0.0.10".to_string());
        state.services.insert(name, stored.clone());
        Ok(stored)
    }

    async fn update_service(&self, service: &Service) -> Result<Service> {
        let name = service.metadata.name().to_string();
        self.record(format!("update service {name}"));
        let mut state = self.state.lock().unwrap();
        let current = state
            .services
            .get(&name)
            .cloned()
            .ok_or_else(|| anyhow!("services \"{name}\" not found"))?;
        if service.metadata.resource_version != current.metadata.resource_version {
            bail!("conflict: resource version mismatch for {name}");
        }
        if service.spec.cluster_ip != current.spec.cluster_ip {
            bail!("spec.clusterIP: field is immutable");
        }
        let mut stored = service.clone();
        stored.metadata.resource_version = Some(state.version());
        state.services.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        self.record(format!("delete service {name}"));
        self.state.lock().unwrap().services.remove(name);
        Ok(())
    }
}

impl ClaimApi for FakeCluster {
    async fn list_claims(&self, selector: &str) -> Result<Vec<PersistentVolumeClaim>> {
        self.record(format!("list claims {selector}"));
        let state = self.state.lock().unwrap();
        Ok(state
            .claims
            .iter()
            .filter(|c| matches_selector(&c.metadata.labels, selector))
            .cloned()
            .collect())
    }

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim> {
        let name = claim.metadata.name().to_string();
        self.record(format!("create claim {name}"));
        let mut state = self.state.lock().unwrap();
        if state.claims.iter().any(|c| c.metadata.name() == name) {
            bail!("persistentvolumeclaims \"{name}\" already exists");
        }
        let mut stored = claim.clone();
        stored.metadata.resource_version = Some(state.version());
        state.claims.push(stored.clone());
        Ok(stored)
    }
}

impl UnitApi for FakeCluster {
    async fn wait_for_running_unit(&self, selector: &str) -> Result<Pod> {
        self.record(format!("wait unit {selector}"));
        let state = self.state.lock().unwrap();
        state
            .pods
            .values()
            .find(|p| p.is_running() && matches_selector(&p.metadata.labels, selector))
            .cloned()
            .ok_or_else(|| anyhow!("no running pod matched '{selector}'"))
    }
}

impl ContainerExec for FakeCluster {
    async fn exec(&self, unit: &str, container: &str, argv: &[String]) -> Result<Output> {
        Ok(self.run_exec(unit, container, argv))
    }

    async fn exec_relaying(
        &self,
        unit: &str,
        container: &str,
        argv: &[String],
        on_line: &dyn Fn(&str),
    ) -> Result<Output> {
        on_line(&format!("ran {}", argv.join(" ")));
        Ok(self.run_exec(unit, container, argv))
    }

    async fn extract_archive(
        &self,
        unit: &str,
        container: &str,
        target_dir: &str,
        mut chunks: mpsc::Receiver<Vec<u8>>,
    ) -> Result<()> {
        let mut bytes = Vec::new();
        while let Some(chunk) = chunks.recv().await {
            bytes.extend_from_slice(&chunk);
        }
        let mut archive = tar::Archive::new(bytes.as_slice());
        let entries = archive
            .entries()?
            .map(|e| -> Result<String> { Ok(e?.path()?.to_string_lossy().into_owned()) })
            .collect::<Result<Vec<_>>>()?;
        self.extractions.lock().unwrap().push(Extraction {
            unit: unit.to_string(),
            container: container.to_string(),
            target_dir: target_dir.to_string(),
            entries,
        });
        Ok(())
    }
}

// ── FakeDynamic ──────────────────────────────────────────────────────────────

/// Arbitrary resource collections kept in memory, keyed by collection and name.
#[derive(Default)]
pub struct FakeDynamic {
    objects: Mutex<BTreeMap<(String, String), Value>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<Option<String>>,
    next_version: Mutex<u64>,
}

impl FakeDynamic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes to an object named `name` fail.
    pub fn fail_writes_to(&self, name: &str) {
        *self.failing.lock().unwrap() = Some(name.to_string());
    }

    pub fn insert(&self, resource: &str, name: &str, body: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert((resource.to_string(), name.to_string()), body);
    }

    pub fn get(&self, resource: &str, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&(resource.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, verb: &str, id: &ResourceId) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{verb} {}/{}", id.resource, id.name));
        if verb != "list" && self.failing.lock().unwrap().as_deref() == Some(id.name.as_str()) {
            bail!("admission webhook denied {}", id.name);
        }
        Ok(())
    }

    fn stamp(&self, body: &Value) -> Value {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        let mut stored = body.clone();
        if let Some(meta) = stored.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert(
                "resourceVersion".to_string(),
                Value::String(version.to_string()),
            );
        }
        stored
    }
}

impl DynamicApi for FakeDynamic {
    async fn list(&self, id: &ResourceId) -> Result<Vec<Value>> {
        self.record("list", id)?;
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|((resource, _), _)| *resource == id.resource)
            .map(|(_, body)| body.clone())
            .collect())
    }

    async fn create(&self, id: &ResourceId, body: &Value) -> Result<Value> {
        self.record("create", id)?;
        let key = (id.resource.clone(), id.name.clone());
        if self.objects.lock().unwrap().contains_key(&key) {
            bail!("{} \"{}\" already exists", id.resource, id.name);
        }
        let stored = self.stamp(body);
        self.objects.lock().unwrap().insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(&self, id: &ResourceId, body: &Value) -> Result<Value> {
        self.record("update", id)?;
        let key = (id.resource.clone(), id.name.clone());
        let current = self
            .objects
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| anyhow!("{} \"{}\" not found", id.resource, id.name))?;
        let version = |v: &Value| v.pointer("/metadata/resourceVersion").cloned();
        if version(body) != version(&current) {
            bail!("conflict: resource version mismatch for {}", id.name);
        }
        let stored = self.stamp(body);
        self.objects.lock().unwrap().insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &ResourceId) -> Result<bool> {
        self.record("delete", id)?;
        let key = (id.resource.clone(), id.name.clone());
        Ok(self.objects.lock().unwrap().remove(&key).is_some())
    }
}

// ── Local state and reporting ────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryManifestStore {
    pub record: Mutex<Option<AppliedManifest>>,
}

impl MemoryManifestStore {
    pub fn with(applied: AppliedManifest) -> Self {
        Self {
            record: Mutex::new(Some(applied)),
        }
    }

    pub fn current(&self) -> Option<AppliedManifest> {
        self.record.lock().unwrap().clone()
    }
}

impl ManifestStore for MemoryManifestStore {
    async fn load_async(&self) -> Result<Option<AppliedManifest>> {
        Ok(self.current())
    }

    async fn save_async(&self, applied: &AppliedManifest) -> Result<()> {
        *self.record.lock().unwrap() = Some(applied.clone());
        Ok(())
    }

    async fn clear_async(&self) -> Result<()> {
        *self.record.lock().unwrap() = None;
        Ok(())
    }
}

/// Serves manifests from a fixed map of sources.
#[derive(Default)]
pub struct StaticFetcher(pub HashMap<String, String>);

impl StaticFetcher {
    pub fn one(source: &str, content: &str) -> Self {
        Self(HashMap::from([(source.to_string(), content.to_string())]))
    }
}

impl ManifestFetcher for StaticFetcher {
    async fn fetch(&self, source: &str) -> Result<String> {
        self.0
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow!("no such file: {source}"))
    }
}

/// Records every progress event as `"<kind>: <message>"`.
#[derive(Default)]
pub struct RecordingReporter {
    events: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }

    pub fn has(&self, event: &str) -> bool {
        self.events.borrow().iter().any(|e| e == event)
    }

    fn push(&self, kind: &str, message: &str) {
        self.events.borrow_mut().push(format!("{kind}: {message}"));
    }
}

impl ProgressReporter for RecordingReporter {
    fn step(&self, message: &str) {
        self.push("step", message);
    }

    fn success(&self, message: &str) {
        self.push("ok", message);
    }

    fn warn(&self, message: &str) {
        self.push("warn", message);
    }

    fn fail(&self, message: &str) {
        self.push("fail", message);
    }

    fn output_line(&self, line: &str) {
        self.push("out", line);
    }
}
