//! Application service: ad-hoc manifest apply and delete.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::application::ports::{DynamicApi, ManifestFetcher, ManifestStore, ProgressReporter};
use crate::domain::manifest::{self, AppliedManifest, Manifest, ResourceId, Substitutions};

/// Inputs for [`deploy`].
pub struct DeployOptions<'a> {
    /// Component name; the deployed application is `<component>-deploy`.
    pub component: &'a str,
    /// Manifest path or URL.
    pub source: &'a str,
    /// Image reference substituted for `CONTAINER_IMAGE`.
    pub image: &'a str,
    pub port: Option<u16>,
}

/// One document that was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub id: ResourceId,
    /// `true` if created, `false` if an existing object was updated.
    pub created: bool,
}

/// Fetch, substitute and apply a manifest, then record it for `delete`.
///
/// The manifest is recorded whenever at least one document was applied,
/// so a partially applied manifest can still be deleted.
///
/// # Errors
///
/// Returns an error if the manifest cannot be fetched or decoded, or the
/// first error raised while applying its documents.
pub async fn deploy(
    api: &impl DynamicApi,
    fetcher: &impl ManifestFetcher,
    store: &impl ManifestStore,
    reporter: &impl ProgressReporter,
    opts: DeployOptions<'_>,
) -> Result<Vec<Applied>> {
    let raw = fetcher
        .fetch(opts.source)
        .await
        .with_context(|| format!("unable to load manifest {}", opts.source))?;
    let content = Substitutions::for_deploy(opts.image, opts.component, opts.port).apply(&raw);
    debug!(manifest = %content, "substituted manifest");

    let (applied, first_error) = apply(api, reporter, &content).await?;

    if !applied.is_empty() {
        store
            .save_async(&AppliedManifest {
                applied_at: Utc::now(),
                source: opts.source.to_string(),
                content,
            })
            .await?;
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(applied),
    }
}

/// Apply every document of `content` in order.
///
/// Each document is looked up by listing its collection and scanning for
/// its name; a match has its resource version copied over and is
/// updated, otherwise the document is created. A failing document does not
/// stop later ones. Returns the applied documents and the first error.
///
/// # Errors
///
/// Returns an error only if `content` does not decode.
pub async fn apply(
    api: &impl DynamicApi,
    reporter: &impl ProgressReporter,
    content: &str,
) -> Result<(Vec<Applied>, Option<anyhow::Error>)> {
    let documents = manifest::parse_documents(content)?;
    let mut applied = Vec::with_capacity(documents.len());
    let mut first_error = None;

    for mut doc in documents {
        let id = doc.id().clone();
        reporter.step(&format!("deploying {id}..."));
        match apply_one(api, &mut doc).await {
            Ok(created) => {
                reporter.success(&format!(
                    "{} {id}",
                    if created { "created" } else { "updated" }
                ));
                applied.push(Applied { id, created });
            }
            Err(e) => {
                reporter.fail(&format!("failed to deploy {id}"));
                first_error.get_or_insert(e);
            }
        }
    }
    Ok((applied, first_error))
}

async fn apply_one(api: &impl DynamicApi, doc: &mut Manifest) -> Result<bool> {
    let id = doc.id().clone();
    let existing = api
        .list(&id)
        .await
        .with_context(|| format!("failed to list {}", id.resource))?;

    let found = existing.iter().find_map(|item| {
        let meta = item.get("metadata")?;
        (meta.get("name")?.as_str()? == id.name)
            .then(|| meta.get("resourceVersion").and_then(Value::as_str).unwrap_or_default())
    });

    if let Some(version) = found {
        info!(%id, version, "updating");
        doc.set_resource_version(version);
        api.update(&id, doc.body())
            .await
            .with_context(|| format!("failed to deploy {}", id.kind))?;
        Ok(false)
    } else {
        info!(%id, "creating");
        api.create(&id, doc.body())
            .await
            .with_context(|| format!("failed to deploy {}", id.kind))?;
        Ok(true)
    }
}

/// Delete every document of the recorded manifest, then forget it.
///
/// Documents already absent from the cluster are reported as warnings.
///
/// # Errors
///
/// Returns an error if no manifest is recorded, it does not decode, or a
/// delete fails. Remaining documents are not attempted after a failure and
/// the record is kept.
pub async fn delete(
    api: &impl DynamicApi,
    store: &impl ManifestStore,
    reporter: &impl ProgressReporter,
) -> Result<Vec<ResourceId>> {
    let Some(recorded) = store.load_async().await? else {
        bail!("no deployed manifest recorded; run 'devpush deploy' first");
    };

    let documents = manifest::parse_documents(&recorded.content)?;
    let mut deleted = Vec::with_capacity(documents.len());
    for doc in &documents {
        let id = doc.id();
        reporter.step(&format!("deleting {id}..."));
        let existed = api
            .delete(id)
            .await
            .with_context(|| format!("failed to delete {id}"))
            .inspect_err(|_| reporter.fail(&format!("failed to delete {id}")))?;
        if existed {
            reporter.success(&format!("deleted {id}"));
            deleted.push(id.clone());
        } else {
            reporter.warn(&format!("{id} does not exist"));
        }
    }

    store.clear_async().await?;
    Ok(deleted)
}
