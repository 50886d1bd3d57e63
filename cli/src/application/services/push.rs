//! Application service: the push pipeline.
//!
//! Reconcile cluster resources, sync sources into the running unit, then
//! run lifecycle commands. Imports only from `crate::domain` and
//! `crate::application::ports`.

use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::application::ports::{ClusterClient, ProgressReporter, SourceArchiver};
use crate::application::services::lifecycle::{self, LifecycleParams, RunAction};
use crate::application::services::reconcile::{self, ExecutionUnit, ReconcileParams};
use crate::application::services::sync::{self, SyncParams};
use crate::domain::command::CommandSet;
use crate::domain::config::DevpushConfig;
use crate::domain::error::{RemoteCallError, ValidationError};
use crate::domain::sync::{SyncPlan, WatchedChanges};
use crate::domain::workload::{SOURCE_VOLUME, WorkloadSpec};

/// Inputs for [`push`].
pub struct PushOptions<'a> {
    pub workload: &'a WorkloadSpec,
    pub commands: &'a CommandSet,
    pub source_root: &'a Path,
    pub config: &'a DevpushConfig,
    /// Namespace written into created resources; `None` uses the client's.
    pub namespace: Option<&'a str>,
    /// Paths reported by a file watcher since the last push.
    pub watched: Option<WatchedChanges>,
    /// Always transfer the whole tree.
    pub force: bool,
    /// Relay lifecycle command output.
    pub show_output: bool,
}

/// Outcome of the `push` use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOutcome {
    /// The workload did not exist before this push.
    pub created: bool,
    /// Name of the unit sources were synced into.
    pub unit: String,
    /// An existing workload came back with a different unit.
    pub unit_changed: bool,
    /// Whether the sync was incremental.
    pub incremental: bool,
    /// `None` when nothing changed and no command ran.
    pub run: Option<RunAction>,
}

/// Push the workload: reconcile, sync, then execute lifecycle commands.
///
/// # Errors
///
/// Returns the first failure of any stage. Validation failures, including
/// a workload with no source-mounting container or a watched path outside
/// `source_root`, are reported before any cluster call is made.
pub async fn push(
    cluster: &impl ClusterClient,
    archiver: &impl SourceArchiver,
    reporter: &impl ProgressReporter,
    opts: PushOptions<'_>,
) -> Result<PushOutcome> {
    let workload = opts.workload;
    workload.validate()?;
    workload.source_container()?;
    let watched = opts
        .watched
        .map(|w| w.confined_to(opts.source_root))
        .transpose()?;

    let existing = cluster
        .get_deployment(&workload.name)
        .await
        .map_err(|e| RemoteCallError::new(&workload.name, "get deployment", e))?;
    let existed = existing.is_some();

    let previous_unit = if existed {
        Some(reconcile::running_unit(cluster, workload).await?.name)
    } else {
        None
    };

    reporter.step(&format!("creating resources for '{}'...", workload.name));
    let params = ReconcileParams {
        workload,
        run_command: opts.commands.run(),
        namespace: opts.namespace,
        target_dir: &opts.config.sync.target_dir,
        bootstrap_image: &opts.config.supervisor.bootstrap_image,
        default_claim_size: &opts.config.storage.default_size,
    };
    let outcome = reconcile::reconcile(cluster, &params, existing.as_ref())
        .await
        .inspect_err(|_| reporter.fail("creating resources failed"))?;
    reporter.success(if outcome.created {
        "resources created"
    } else {
        "resources updated"
    });

    reporter.step("waiting for the workload to run...");
    let unit = reconcile::await_unit(cluster, workload)
        .await
        .inspect_err(|_| reporter.fail("workload did not start"))?;
    reporter.success(&format!("unit {} running", unit.name));

    let unit_changed = previous_unit.is_some_and(|prev| prev != unit.name);
    let container = source_container(&unit, workload)?;

    let plan = SyncPlan::decide(existed, unit_changed, opts.force, watched);
    let incremental = matches!(plan, SyncPlan::Incremental { .. });
    info!(unit = %unit.name, container, incremental, unit_changed, "syncing");

    reporter.step(&format!("syncing files to {}...", unit.name));
    let changed = sync::push_source(
        cluster,
        archiver,
        &unit.at(container),
        SyncParams {
            source_root: opts.source_root,
            target_dir: &opts.config.sync.target_dir,
            exclude: &opts.config.sync.ignore,
            plan,
        },
    )
    .await
    .inspect_err(|_| reporter.fail("syncing files failed"))?;

    if !changed {
        reporter.success("no file changes");
        return Ok(PushOutcome {
            created: !existed,
            unit: unit.name,
            unit_changed,
            incremental,
            run: None,
        });
    }
    reporter.success("files synced");

    let action = lifecycle::run_lifecycle(
        cluster,
        reporter,
        LifecycleParams {
            commands: opts.commands,
            workload_existed: existed,
            unit: &unit,
            show_output: opts.show_output,
        },
    )
    .await?;

    Ok(PushOutcome {
        created: !existed,
        unit: unit.name,
        unit_changed,
        incremental,
        run: Some(action),
    })
}

/// First container of the running unit with the source volume mounted.
fn source_container<'u>(unit: &'u ExecutionUnit, workload: &WorkloadSpec) -> Result<&'u str> {
    unit.containers
        .iter()
        .find(|c| c.volume_mounts.iter().any(|m| m.name == SOURCE_VOLUME))
        .map(|c| c.name.as_str())
        .ok_or_else(|| {
            ValidationError::NoSourceVolume {
                workload: workload.name.clone(),
            }
            .into()
        })
}
