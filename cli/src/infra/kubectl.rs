//! Infrastructure implementation of the cluster port traits.
//!
//! `KubectlClient<R>` drives the `kubectl` binary through a
//! `CommandRunner`. Objects travel as JSON: reads use `-o json`, writes pipe
//! the document into `create -f -` / `replace -f -`.

use std::process::Output;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use devpush_common::{Deployment, List, PersistentVolumeClaim, Pod, Service};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::ports::{
    ClaimApi, CommandRunner, ContainerExec, DynamicApi, ServiceApi, UnitApi, WorkloadApi,
};
use crate::domain::config::ClusterConfig;
use crate::domain::manifest::ResourceId;

/// Connection and timing settings for [`KubectlClient`].
#[derive(Debug, Clone)]
pub struct KubectlSettings {
    pub binary: String,
    pub namespace: Option<String>,
    pub context: Option<String>,
    /// Limit for lifecycle execs and archive extraction; `None` is unbounded.
    pub exec_timeout: Option<Duration>,
    pub wait_timeout: Duration,
    pub poll_interval: Duration,
}

impl From<&ClusterConfig> for KubectlSettings {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            binary: config.kubectl.clone(),
            namespace: config.namespace.clone(),
            context: config.context.clone(),
            exec_timeout: config.exec_timeout(),
            wait_timeout: config.wait_timeout(),
            poll_interval: config.poll_interval(),
        }
    }
}

/// Infrastructure adapter that routes all cluster calls through a `CommandRunner`.
///
/// Generic over `R: CommandRunner` so that tests can inject a mock runner
/// without spawning real processes.
pub struct KubectlClient<R: CommandRunner> {
    runner: R,
    settings: KubectlSettings,
}

impl<R: CommandRunner> KubectlClient<R> {
    pub fn new(runner: R, settings: KubectlSettings) -> Self {
        Self { runner, settings }
    }

    /// Global flags followed by `args`.
    fn command_line(&self, args: &[&str]) -> Vec<String> {
        let mut full = Vec::with_capacity(args.len() + 4);
        if let Some(context) = &self.settings.context {
            full.extend(["--context".to_string(), context.clone()]);
        }
        if let Some(namespace) = &self.settings.namespace {
            full.extend(["--namespace".to_string(), namespace.clone()]);
        }
        full.extend(args.iter().map(|a| (*a).to_string()));
        full
    }

    async fn call(&self, args: &[&str]) -> Result<Output> {
        let full = self.command_line(args);
        debug!(args = ?full, "kubectl");
        self.runner.run(&self.settings.binary, &as_refs(&full)).await
    }

    /// `get <kind> <name> -o json`; `None` if the object does not exist.
    async fn get_object<T: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<Option<T>> {
        let output = self
            .call(&["get", kind, name, "-o", "json"])
            .await
            .with_context(|| format!("kubectl get {kind} {name}"))?;
        if !output.status.success() {
            if is_not_found(&output) {
                return Ok(None);
            }
            bail!("kubectl get {kind} {name} failed: {}", stderr(&output));
        }
        decode(&output.stdout).map(Some)
    }

    async fn list_objects<T: DeserializeOwned>(
        &self,
        resource: &str,
        selector: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut args = vec!["get", resource, "-o", "json"];
        if let Some(selector) = selector {
            args.extend(["-l", selector]);
        }
        let output = self
            .call(&args)
            .await
            .with_context(|| format!("kubectl get {resource}"))?;
        ensure_success(&output, &format!("kubectl get {resource}"))?;
        Ok(decode::<List<T>>(&output.stdout)?.items)
    }

    /// Pipe `body` into `kubectl <verb> -f - -o json` and decode the result.
    async fn write_object<T: DeserializeOwned>(
        &self,
        verb: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let input = serde_json::to_vec(body).context("cannot serialize object")?;
        let full = self.command_line(&[verb, "-f", "-", "-o", "json"]);
        debug!(args = ?full, "kubectl");
        let output = self
            .runner
            .run_with_stdin(&self.settings.binary, &as_refs(&full), &input)
            .await
            .with_context(|| format!("kubectl {verb}"))?;
        ensure_success(&output, &format!("kubectl {verb}"))?;
        decode(&output.stdout)
    }

    async fn delete_object(&self, resource: &str, name: &str) -> Result<bool> {
        let output = self
            .call(&["delete", resource, name])
            .await
            .with_context(|| format!("kubectl delete {resource} {name}"))?;
        if output.status.success() {
            return Ok(true);
        }
        if is_not_found(&output) {
            return Ok(false);
        }
        bail!("kubectl delete {resource} {name} failed: {}", stderr(&output))
    }

    fn exec_args(&self, unit: &str, container: &str, argv: &[String]) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            unit.to_string(),
            "-c".to_string(),
            container.to_string(),
            "--".to_string(),
        ];
        args.extend(argv.iter().cloned());
        self.command_line(&as_refs(&args))
    }
}

fn as_refs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

fn is_not_found(output: &Output) -> bool {
    let err = String::from_utf8_lossy(&output.stderr);
    err.contains("NotFound") || err.contains("not found")
}

fn ensure_success(output: &Output, what: &str) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        bail!("{what} failed: {}", stderr(output))
    }
}

fn decode<T: DeserializeOwned>(stdout: &[u8]) -> Result<T> {
    serde_json::from_slice(stdout).context("cannot parse kubectl output")
}

/// `kubectl` resource argument: `resource.version.group`, or just the
/// resource for the core group.
#[must_use]
pub fn resource_arg(id: &ResourceId) -> String {
    if id.group.is_empty() {
        id.resource.clone()
    } else {
        format!("{}.{}.{}", id.resource, id.version, id.group)
    }
}

impl<R: CommandRunner> WorkloadApi for KubectlClient<R> {
    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>> {
        self.get_object("deployment", name).await
    }

    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        self.write_object("create", deployment).await
    }

    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment> {
        self.write_object("replace", deployment).await
    }

    async fn wait_for_rollout(&self, name: &str) -> Result<()> {
        let timeout = self.settings.wait_timeout;
        let target = format!("deployment/{name}");
        let limit = format!("--timeout={}s", timeout.as_secs());
        let full = self.command_line(&["rollout", "status", &target, &limit]);
        let output = self
            .runner
            .run_with_timeout(
                &self.settings.binary,
                &as_refs(&full),
                Some(timeout + Duration::from_secs(5)),
            )
            .await
            .context("kubectl rollout status")?;
        ensure_success(&output, "kubectl rollout status")
    }
}

impl<R: CommandRunner> ServiceApi for KubectlClient<R> {
    async fn get_service(&self, name: &str) -> Result<Option<Service>> {
        self.get_object("service", name).await
    }

    async fn create_service(&self, service: &Service) -> Result<Service> {
        self.write_object("create", service).await
    }

    async fn update_service(&self, service: &Service) -> Result<Service> {
        self.write_object("replace", service).await
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        self.delete_object("service", name).await.map(|_| ())
    }
}

impl<R: CommandRunner> ClaimApi for KubectlClient<R> {
    async fn list_claims(&self, selector: &str) -> Result<Vec<PersistentVolumeClaim>> {
        self.list_objects("persistentvolumeclaims", Some(selector)).await
    }

    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim> {
        self.write_object("create", claim).await
    }
}

impl<R: CommandRunner> UnitApi for KubectlClient<R> {
    async fn wait_for_running_unit(&self, selector: &str) -> Result<Pod> {
        let deadline = Instant::now() + self.settings.wait_timeout;
        loop {
            let pods: Vec<Pod> = self.list_objects("pods", Some(selector)).await?;
            if let Some(pod) = pods.into_iter().find(Pod::is_running) {
                return Ok(pod);
            }
            if Instant::now() >= deadline {
                bail!(
                    "no running pod matched '{selector}' within {}s",
                    self.settings.wait_timeout.as_secs()
                );
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

impl<R: CommandRunner> ContainerExec for KubectlClient<R> {
    async fn exec(&self, unit: &str, container: &str, argv: &[String]) -> Result<Output> {
        let full = self.exec_args(unit, container, argv);
        debug!(args = ?full, "kubectl");
        self.runner
            .run_with_timeout(&self.settings.binary, &as_refs(&full), self.settings.exec_timeout)
            .await
            .context("kubectl exec")
    }

    async fn exec_relaying(
        &self,
        unit: &str,
        container: &str,
        argv: &[String],
        on_line: &dyn Fn(&str),
    ) -> Result<Output> {
        let full = self.exec_args(unit, container, argv);
        debug!(args = ?full, "kubectl");
        self.runner
            .run_relaying(
                &self.settings.binary,
                &as_refs(&full),
                self.settings.exec_timeout,
                on_line,
            )
            .await
            .context("kubectl exec")
    }

    async fn extract_archive(
        &self,
        unit: &str,
        container: &str,
        target_dir: &str,
        chunks: mpsc::Receiver<Vec<u8>>,
    ) -> Result<()> {
        let mut args = vec![
            "exec".to_string(),
            "-i".to_string(),
            unit.to_string(),
            "-c".to_string(),
            container.to_string(),
            "--".to_string(),
        ];
        args.extend(["tar", "xf", "-", "-C", target_dir].map(str::to_string));
        let full = self.command_line(&as_refs(&args));
        debug!(args = ?full, "kubectl");

        let output = self
            .runner
            .run_with_stdin_stream(
                &self.settings.binary,
                &as_refs(&full),
                chunks,
                self.settings.exec_timeout,
            )
            .await
            .context("kubectl exec tar")?;
        ensure_success(&output, "extracting archive")
    }
}

impl<R: CommandRunner> DynamicApi for KubectlClient<R> {
    async fn list(&self, id: &ResourceId) -> Result<Vec<Value>> {
        self.list_objects(&resource_arg(id), None).await
    }

    async fn create(&self, _id: &ResourceId, body: &Value) -> Result<Value> {
        self.write_object("create", body).await
    }

    async fn update(&self, _id: &ResourceId, body: &Value) -> Result<Value> {
        self.write_object("replace", body).await
    }

    async fn delete(&self, id: &ResourceId) -> Result<bool> {
        self.delete_object(&resource_arg(id), &id.name).await
    }
}
