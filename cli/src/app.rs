//! Application context: unified state passed to every command handler.
//!
//! Built once from the global flags: output mode, loaded configuration, and
//! the cluster overrides given on the command line.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::DevpushConfig;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::config::YamlConfigStore;
use crate::infra::kubectl::{KubectlClient, KubectlSettings};
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Output rendering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable terminal output (default).
    Human,
    /// Machine-readable JSON output.
    Json,
}

/// Output rendering flags.
pub struct OutputFlags {
    /// Disable ANSI color output.
    pub no_color: bool,
    /// Suppress non-error output.
    pub quiet: bool,
    /// Enable JSON output mode.
    pub json: bool,
}

/// Cluster flags that override the configuration file.
#[derive(Default)]
pub struct ClusterFlags {
    pub namespace: Option<String>,
    pub context: Option<String>,
}

/// Flags passed from the top-level CLI to `AppContext::new`.
pub struct AppFlags {
    pub output: OutputFlags,
    pub cluster: ClusterFlags,
}

/// Unified application context passed to every command handler.
pub struct AppContext {
    /// Terminal output context (colors, quiet mode).
    pub output: OutputContext,
    /// Output rendering mode (human vs JSON).
    pub mode: OutputMode,
    pub config_store: YamlConfigStore,
    /// Configuration with command-line overrides applied.
    pub config: DevpushConfig,
}

impl AppContext {
    /// Construct an `AppContext` from top-level CLI flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file exists but cannot be read.
    pub fn new(flags: AppFlags) -> Result<Self> {
        let mode = if flags.output.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        };
        // Progress output would corrupt the JSON document on stdout.
        let quiet = flags.output.quiet || flags.output.json;

        let config_store = YamlConfigStore;
        let mut config = config_store.load()?;
        if let Some(namespace) = flags.cluster.namespace {
            config.cluster.namespace = Some(namespace);
        }
        if let Some(context) = flags.cluster.context {
            config.cluster.context = Some(context);
        }

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, quiet),
            mode,
            config_store,
            config,
        })
    }

    /// Returns `true` when JSON output mode is active.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    /// Returns the appropriate `Renderer` variant for the current output mode.
    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress reporter writing to the terminal.
    #[must_use]
    pub fn reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// Cluster client configured from the effective settings.
    #[must_use]
    pub fn cluster(&self) -> KubectlClient<TokioCommandRunner> {
        let cluster = &self.config.cluster;
        KubectlClient::new(
            TokioCommandRunner::new(cluster.command_timeout()),
            KubectlSettings::from(cluster),
        )
    }
}
