//! Application service: source transfer into a running container.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, info};

use crate::application::ports::{ArchiveRequest, ContainerExec, SourceArchiver};
use crate::domain::error::SyncError;
use crate::domain::sync::{SyncPlan, remote_path};
use crate::domain::workload::UnitRef;

/// Inputs for one transfer.
#[derive(Debug, Clone)]
pub struct SyncParams<'a> {
    pub source_root: &'a Path,
    /// Source volume mount point inside the container.
    pub target_dir: &'a str,
    pub exclude: &'a [String],
    pub plan: SyncPlan,
}

/// Push local sources into `target` according to `params.plan`.
///
/// Deleted paths are removed in the container first, then the archive is
/// streamed into the target directory while it is being written.
///
/// Returns whether the container's content changed, i.e. whether
/// lifecycle commands need to run.
///
/// # Errors
///
/// Returns a [`SyncError`] carrying the unit and container if removal,
/// archiving or extraction fails. A writer failure takes precedence over
/// the extraction error it usually causes.
pub async fn push_source(
    exec: &impl ContainerExec,
    archiver: &impl SourceArchiver,
    target: &UnitRef,
    params: SyncParams<'_>,
) -> Result<bool> {
    let sync_error = |source: anyhow::Error| SyncError {
        unit: target.unit.clone(),
        container: target.container.clone(),
        source,
    };
    let content_changed = params.plan.has_changes();

    let files = match params.plan {
        SyncPlan::FullTree => {
            info!(unit = %target.unit, "syncing full source tree");
            None
        }
        SyncPlan::Incremental { changed, deleted } => {
            debug!(changed = changed.len(), deleted = deleted.len(), "incremental sync");
            if !deleted.is_empty() {
                remove_remote(exec, target, params.target_dir, params.source_root, &deleted)
                    .await
                    .map_err(sync_error)?;
            }
            if changed.is_empty() {
                return Ok(!deleted.is_empty());
            }
            Some(changed)
        }
    };

    let stream = archiver
        .archive(ArchiveRequest {
            root: params.source_root.to_path_buf(),
            files,
            exclude: params.exclude.to_vec(),
            payloads: Vec::new(),
        })
        .map_err(sync_error)?;

    let extracted = exec
        .extract_archive(&target.unit, &target.container, params.target_dir, stream.chunks)
        .await;
    let written = stream.writer.finish().await;

    match (written, extracted) {
        (Err(e), _) | (Ok(()), Err(e)) => Err(sync_error(e).into()),
        (Ok(()), Ok(())) => Ok(content_changed),
    }
}

async fn remove_remote(
    exec: &impl ContainerExec,
    target: &UnitRef,
    target_dir: &str,
    source_root: &Path,
    deleted: &[std::path::PathBuf],
) -> Result<()> {
    let mut argv = vec!["rm".to_string(), "-rf".to_string()];
    for path in deleted {
        argv.push(remote_path(target_dir, source_root, path)?);
    }
    debug!(?argv, "removing deleted files");

    let output = exec.exec(&target.unit, &target.container, &argv).await?;
    if !output.status.success() {
        return Err(anyhow!(
            "removing deleted files failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(())
}
