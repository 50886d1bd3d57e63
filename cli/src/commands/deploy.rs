//! `devpush deploy`: apply an ad-hoc manifest, or delete what was applied.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::application::services::deploy::{self, DeployOptions};
use crate::commands::load_component;
use crate::infra::manifest_fetch::SourceFetcher;
use crate::infra::manifest_store::ManifestFile;

/// Arguments for the deploy command.
#[derive(Args)]
pub struct DeployArgs {
    #[command(subcommand)]
    pub action: Option<DeployAction>,

    /// Directory holding devpush.yaml
    #[arg(long, default_value = ".", global = true)]
    pub context_dir: PathBuf,

    /// Image substituted for CONTAINER_IMAGE
    #[arg(long, value_name = "IMAGE")]
    pub tag: Option<String>,

    /// Manifest path or URL (overrides deploy.manifest)
    #[arg(long, value_name = "SOURCE")]
    pub manifest: Option<String>,

    /// Port substituted for PORT (overrides deploy.port)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Subcommand)]
pub enum DeployAction {
    /// Delete the resources applied by the last deploy
    Delete,
}

/// Entry point for `devpush deploy`.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or a resource fails
/// to apply or delete.
pub async fn run(app: &AppContext, args: DeployArgs) -> Result<()> {
    match args.action {
        Some(DeployAction::Delete) => delete(app, &args.context_dir).await,
        None => apply(app, &args).await,
    }
}

async fn apply(app: &AppContext, args: &DeployArgs) -> Result<()> {
    let component = load_component(&args.context_dir)?;
    let source = args
        .manifest
        .clone()
        .or_else(|| component.deploy.as_ref().map(|d| d.manifest.clone()))
        .context("no manifest to deploy; set 'deploy.manifest' in devpush.yaml or pass --manifest")?;

    let cluster = app.cluster();
    let applied = deploy::deploy(
        &cluster,
        &SourceFetcher::new(args.context_dir.clone()),
        &ManifestFile::for_context(&args.context_dir),
        &app.reporter(),
        DeployOptions {
            component: &component.workload.name,
            source: &source,
            image: args.tag.as_deref().unwrap_or_default(),
            port: args.port.or_else(|| component.deploy_port()),
        },
    )
    .await?;

    app.renderer().render_deploy(&applied)
}

async fn delete(app: &AppContext, context_dir: &Path) -> Result<()> {
    let cluster = app.cluster();
    let deleted = deploy::delete(
        &cluster,
        &ManifestFile::for_context(context_dir),
        &app.reporter(),
    )
    .await?;
    app.renderer().render_deleted(&deleted)
}
