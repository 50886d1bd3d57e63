//! Human-readable terminal renderer.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize as _;

use crate::application::services::deploy::Applied;
use crate::application::services::lifecycle::RunAction;
use crate::application::services::push::PushOutcome;
use crate::domain::config::DevpushConfig;
use crate::domain::manifest::ResourceId;
use crate::output::OutputContext;

/// Renders results as human-readable terminal output using `OutputContext`.
pub struct HumanRenderer<'a> {
    ctx: &'a OutputContext,
}

impl<'a> HumanRenderer<'a> {
    /// Create a new `HumanRenderer` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self { ctx }
    }

    /// Summarise a push.
    pub fn render_push(&self, workload: &str, outcome: &PushOutcome) {
        if self.ctx.quiet {
            return;
        }
        println!();
        self.ctx.header(&format!("Pushed {workload}"));
        self.ctx.kv("Unit:", &outcome.unit);
        self.ctx.kv(
            "Workload:",
            if outcome.created { "created" } else { "updated" },
        );
        self.ctx.kv(
            "Sync:",
            if outcome.incremental {
                "incremental"
            } else {
                "full"
            },
        );
        let run = match outcome.run {
            Some(RunAction::Restarted) => "restarted",
            Some(RunAction::Reloaded) => "reloaded",
            None => "unchanged",
        };
        self.ctx.kv("Run:", run);
        if outcome.unit_changed {
            self.ctx
                .info("The unit was replaced since the last push; all files were re-synced.");
        }
    }

    /// List applied documents.
    pub fn render_deploy(&self, applied: &[Applied]) {
        if self.ctx.quiet {
            return;
        }
        if applied.is_empty() {
            self.ctx.warn("Nothing was deployed");
            return;
        }
        println!();
        self.ctx.header("Deployed resources:");
        for item in applied {
            let verb = if item.created { "created" } else { "updated" };
            println!("    {:<40} {}", item.id.to_string(), verb.style(self.ctx.styles.dim));
        }
    }

    /// List deleted documents.
    pub fn render_deleted(&self, deleted: &[ResourceId]) {
        if self.ctx.quiet {
            return;
        }
        if deleted.is_empty() {
            self.ctx.info("No resources were deleted");
            return;
        }
        println!();
        self.ctx.header("Deleted resources:");
        for id in deleted {
            println!("    {id}");
        }
    }

    /// Print the effective configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized.
    pub fn render_config(&self, config: &DevpushConfig, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(config).context("cannot serialize config")?;
        println!(
            "# {}",
            format!("Configuration ({})", path.display()).style(self.ctx.styles.dim)
        );
        print!("{yaml}");
        Ok(())
    }

    /// Render the CLI version information.
    pub fn render_version(&self, version: &str) {
        println!("devpush {version}");
    }
}
