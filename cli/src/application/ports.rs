//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill.
//! This file imports only from `crate::domain`, never from `crate::infra`,
//! `crate::commands`, or `crate::output`.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use anyhow::{Context, Result};
use devpush_common::{Deployment, PersistentVolumeClaim, Pod, Service};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::config::DevpushConfig;
use crate::domain::manifest::{AppliedManifest, ResourceId};

// ── Value Types ───────────────────────────────────────────────────────────────

/// What to put into a source archive.
#[derive(Debug, Clone, Default)]
pub struct ArchiveRequest {
    /// Local directory whose contents land at the archive root.
    pub root: PathBuf,
    /// Restrict the archive to these paths (absolute or relative to `root`).
    /// `None` archives the whole tree.
    pub files: Option<Vec<PathBuf>>,
    /// Gitignore-style exclusion patterns, matched relative to `root`.
    pub exclude: Vec<String>,
    /// In-memory entries appended after the filesystem walk.
    pub payloads: Vec<(String, Vec<u8>)>,
}

/// An archive being produced in the background.
///
/// `chunks` yields the archive bytes as they are written. Dropping the
/// receiver stops the writer. [`ArchiveWriter::finish`] reports whether the
/// archive was written completely.
pub struct ArchiveStream {
    pub chunks: mpsc::Receiver<Vec<u8>>,
    pub writer: ArchiveWriter,
}

/// Handle on the background archive writer.
pub struct ArchiveWriter(JoinHandle<Result<()>>);

impl ArchiveWriter {
    #[must_use]
    pub fn new(handle: JoinHandle<Result<()>>) -> Self {
        Self(handle)
    }

    /// Wait for the writer and surface its error, if any.
    ///
    /// # Errors
    ///
    /// Returns the writer's error, or an error if the writer task panicked.
    pub async fn finish(self) -> Result<()> {
        self.0.await.context("archive writer task failed")?
    }
}

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom time limit; `None` waits as long as the
    /// program runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `limit`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        limit: Option<Duration>,
    ) -> Result<Output>;
    /// Run a program with stdin piped from `stdin`.
    async fn run_with_stdin(&self, program: &str, args: &[&str], stdin: &[u8]) -> Result<Output>;
    /// Run a program, feeding stdin from `chunks` until the sender closes.
    async fn run_with_stdin_stream(
        &self,
        program: &str,
        args: &[&str],
        chunks: mpsc::Receiver<Vec<u8>>,
        limit: Option<Duration>,
    ) -> Result<Output>;
    /// Run a program and hand every stdout/stderr line to `on_line` as it
    /// arrives. The returned output carries the status and the last lines
    /// of each stream.
    async fn run_relaying(
        &self,
        program: &str,
        args: &[&str],
        limit: Option<Duration>,
        on_line: &dyn Fn(&str),
    ) -> Result<Output>;
}

// ── Cluster Ports ─────────────────────────────────────────────────────────────

/// The managed workload resource.
#[allow(async_fn_in_trait)]
pub trait WorkloadApi {
    /// Fetch a deployment, returning `None` if it does not exist.
    async fn get_deployment(&self, name: &str) -> Result<Option<Deployment>>;
    async fn create_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
    /// Replace a deployment. The resource version must be set.
    async fn update_deployment(&self, deployment: &Deployment) -> Result<Deployment>;
    /// Block until the deployment's latest revision is rolled out.
    async fn wait_for_rollout(&self, name: &str) -> Result<()>;
}

/// The workload's network exposure.
#[allow(async_fn_in_trait)]
pub trait ServiceApi {
    async fn get_service(&self, name: &str) -> Result<Option<Service>>;
    async fn create_service(&self, service: &Service) -> Result<Service>;
    async fn update_service(&self, service: &Service) -> Result<Service>;
    async fn delete_service(&self, name: &str) -> Result<()>;
}

/// Persistent volume claims.
#[allow(async_fn_in_trait)]
pub trait ClaimApi {
    /// Claims matching a `k=v,k2=v2` label selector.
    async fn list_claims(&self, selector: &str) -> Result<Vec<PersistentVolumeClaim>>;
    async fn create_claim(&self, claim: &PersistentVolumeClaim) -> Result<PersistentVolumeClaim>;
}

/// Execution units (pods).
#[allow(async_fn_in_trait)]
pub trait UnitApi {
    /// Wait until a unit matching `selector` is running and return it.
    async fn wait_for_running_unit(&self, selector: &str) -> Result<Pod>;
}

/// Commands and archive delivery inside a running container.
#[allow(async_fn_in_trait)]
pub trait ContainerExec {
    /// Run `argv` in the container and capture its output. A non-zero
    /// remote exit is reported in the returned status, not as an error.
    async fn exec(&self, unit: &str, container: &str, argv: &[String]) -> Result<Output>;
    /// Like [`Self::exec`], relaying each output line to `on_line`.
    async fn exec_relaying(
        &self,
        unit: &str,
        container: &str,
        argv: &[String],
        on_line: &dyn Fn(&str),
    ) -> Result<Output>;
    /// Extract a tar stream into `target_dir` inside the container.
    async fn extract_archive(
        &self,
        unit: &str,
        container: &str,
        target_dir: &str,
        chunks: mpsc::Receiver<Vec<u8>>,
    ) -> Result<()>;
}

/// Composite trait: any type implementing all cluster sub-traits is a `ClusterClient`.
pub trait ClusterClient: WorkloadApi + ServiceApi + ClaimApi + UnitApi + ContainerExec {}

/// Blanket implementation: any type implementing all sub-traits is a `ClusterClient`.
impl<T> ClusterClient for T where T: WorkloadApi + ServiceApi + ClaimApi + UnitApi + ContainerExec {}

/// Schema-less access to arbitrary resource collections.
#[allow(async_fn_in_trait)]
pub trait DynamicApi {
    /// Every object in the resource's collection.
    async fn list(&self, id: &ResourceId) -> Result<Vec<Value>>;
    async fn create(&self, id: &ResourceId, body: &Value) -> Result<Value>;
    async fn update(&self, id: &ResourceId, body: &Value) -> Result<Value>;
    /// Delete the named object. Returns `false` if it did not exist.
    async fn delete(&self, id: &ResourceId) -> Result<bool>;
}

// ── Archive Port ──────────────────────────────────────────────────────────────

/// Produces tar archives of local source trees.
pub trait SourceArchiver {
    /// Start writing an archive in the background.
    ///
    /// # Errors
    ///
    /// Returns an error if the writer cannot be started. Failures while
    /// writing surface from [`ArchiveWriter::finish`].
    fn archive(&self, request: ArchiveRequest) -> Result<ArchiveStream>;
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the Presentation layer. Sync trait, no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
    /// Mark the current step as failed. The error itself is still returned
    /// to the caller.
    fn fail(&self, message: &str);
    /// Relay one line of command output.
    fn output_line(&self, line: &str);
}

// ── Local State Ports ─────────────────────────────────────────────────────────

/// Persists the last applied manifest for a context directory.
#[allow(async_fn_in_trait)]
pub trait ManifestStore {
    /// Load the last applied manifest, returning `None` if none is recorded.
    async fn load_async(&self) -> Result<Option<AppliedManifest>>;
    async fn save_async(&self, applied: &AppliedManifest) -> Result<()>;
    /// Forget the recorded manifest. Succeeds if nothing is recorded.
    async fn clear_async(&self) -> Result<()>;
}

/// Loads manifest text from a path or URL.
#[allow(async_fn_in_trait)]
pub trait ManifestFetcher {
    async fn fetch(&self, source: &str) -> Result<String>;
}

/// Loads and saves user configuration.
pub trait ConfigStore {
    /// Load configuration, returning defaults if none is saved.
    fn load(&self) -> Result<DevpushConfig>;
    fn save(&self, config: &DevpushConfig) -> Result<()>;
    /// Location of the configuration file.
    fn path(&self) -> Result<PathBuf>;
}
