//! `devpush push`: reconcile the component and sync its sources.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::app::AppContext;
use crate::application::services::push::{self, PushOptions};
use crate::commands::load_component;
use crate::domain::command::{CommandSelection, CommandSet};
use crate::domain::sync::WatchedChanges;
use crate::infra::archive::TarArchiver;

/// Arguments for the push command.
#[derive(Args)]
pub struct PushArgs {
    /// Directory holding devpush.yaml and the sources to sync
    #[arg(long, default_value = ".")]
    pub context_dir: PathBuf,

    /// Init command to run instead of the default one
    #[arg(long, value_name = "ID")]
    pub init_command: Option<String>,

    /// Build command to run instead of the default one
    #[arg(long, value_name = "ID")]
    pub build_command: Option<String>,

    /// Run command to run instead of the default one
    #[arg(long, value_name = "ID")]
    pub run_command: Option<String>,

    /// Sync the whole source tree even if only some files changed
    #[arg(short, long)]
    pub force: bool,

    /// Show lifecycle command output as it runs
    #[arg(long)]
    pub show: bool,

    /// File changed since the last push, relative to the context directory;
    /// repeat for several files
    #[arg(long = "changed", value_name = "PATH")]
    pub changed: Vec<PathBuf>,

    /// File deleted since the last push, relative to the context directory;
    /// repeat for several files
    #[arg(long = "deleted", value_name = "PATH")]
    pub deleted: Vec<PathBuf>,
}

impl PushArgs {
    fn watched(&self) -> Option<WatchedChanges> {
        if self.changed.is_empty() && self.deleted.is_empty() {
            return None;
        }
        Some(WatchedChanges {
            changed: self.changed.clone(),
            deleted: self.deleted.clone(),
        })
    }
}

/// Entry point for `devpush push`.
///
/// # Errors
///
/// Returns an error if the component file is invalid or any push stage fails.
pub async fn run(app: &AppContext, args: PushArgs) -> Result<()> {
    let component = load_component(&args.context_dir)?;
    let source_root = args
        .context_dir
        .canonicalize()
        .with_context(|| format!("cannot resolve {}", args.context_dir.display()))?;
    let commands = CommandSet::select(
        &component.workload,
        &component.commands,
        CommandSelection {
            init: args.init_command.as_deref(),
            build: args.build_command.as_deref(),
            run: args.run_command.as_deref(),
        },
    )?;

    let cluster = app.cluster();
    let reporter = app.reporter();
    let outcome = push::push(
        &cluster,
        &TarArchiver,
        &reporter,
        PushOptions {
            workload: &component.workload,
            commands: &commands,
            source_root: &source_root,
            config: &app.config,
            namespace: app.config.cluster.namespace.as_deref(),
            watched: args.watched(),
            force: args.force,
            show_output: args.show,
        },
    )
    .await?;

    app.renderer().render_push(&component.workload.name, &outcome)
}
