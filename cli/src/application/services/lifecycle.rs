//! Application service: ordered lifecycle command execution.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::process::Output;

use anyhow::Result;
use tracing::{debug, info};

use crate::application::ports::{ContainerExec, ProgressReporter};
use crate::application::services::reconcile::ExecutionUnit;
use crate::domain::command::{CommandSet, Phase};
use crate::domain::error::CommandExecutionError;
use crate::domain::supervisor;

/// Inputs for one lifecycle run.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleParams<'a> {
    pub commands: &'a CommandSet,
    /// Whether the workload existed before this push.
    pub workload_existed: bool,
    pub unit: &'a ExecutionUnit,
    /// Relay command output to the reporter while commands run.
    pub show_output: bool,
}

/// How the run phase was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunAction {
    /// Stopped every supervised program, then started the run program.
    Restarted,
    /// Started the run program without stopping it.
    Reloaded,
}

/// Run init (first push only), build (when declared) and run, in that order.
///
/// On a first push the supervisor is started explicitly when the run
/// container's entrypoint is not the supervisor. On later pushes a run
/// command with `restart: false` is reloaded in place; otherwise it is
/// stopped and started again.
///
/// # Errors
///
/// Returns a [`CommandExecutionError`] for the first command that fails or
/// exits non-zero. Later phases are not attempted.
pub async fn run_lifecycle(
    exec: &impl ContainerExec,
    reporter: &impl ProgressReporter,
    params: LifecycleParams<'_>,
) -> Result<RunAction> {
    let LifecycleParams {
        commands,
        workload_existed,
        unit,
        show_output,
    } = params;

    for (phase, command) in commands.iter() {
        match phase {
            Phase::Init if workload_existed => {
                debug!(id = %command.id, "skipping init command for existing workload");
            }
            Phase::Init | Phase::Build => {
                reporter.step(&format!("executing {phase} command '{}'...", command.id));
                let argv = command.shell_invocation();
                run_step(
                    exec,
                    reporter,
                    unit,
                    *phase,
                    &command.id,
                    &command.component,
                    &argv,
                    show_output,
                )
                .await
                .inspect_err(|_| {
                    reporter.fail(&format!("{phase} command '{}' failed", command.id));
                })?;
                reporter.success(&format!("{phase} command '{}' finished", command.id));
            }
            Phase::Run => {}
        }
    }

    let run = commands.run();
    let container = run.component.as_str();

    if !workload_existed {
        let declared = unit
            .container(container)
            .map(|c| c.command.as_slice())
            .unwrap_or_default();
        if supervisor::needs_explicit_start(declared) {
            info!(container, "starting supervisor");
            run_step(
                exec,
                reporter,
                unit,
                Phase::Run,
                &run.id,
                container,
                &supervisor::start_argv(),
                false,
            )
            .await?;
        }
    }

    let (action, sequence) = if workload_existed && !run.restart {
        (RunAction::Reloaded, supervisor::reload_sequence())
    } else {
        (RunAction::Restarted, supervisor::restart_sequence())
    };

    reporter.step(&format!("executing run command '{}'...", run.id));
    for argv in &sequence {
        run_step(exec, reporter, unit, Phase::Run, &run.id, container, argv, show_output)
            .await
            .inspect_err(|_| reporter.fail(&format!("run command '{}' failed", run.id)))?;
    }
    reporter.success(match action {
        RunAction::Restarted => "run command started",
        RunAction::Reloaded => "run command reloaded",
    });
    Ok(action)
}

#[allow(clippy::too_many_arguments)]
async fn run_step(
    exec: &impl ContainerExec,
    reporter: &impl ProgressReporter,
    unit: &ExecutionUnit,
    phase: Phase,
    id: &str,
    container: &str,
    argv: &[String],
    show_output: bool,
) -> Result<Output> {
    let failure = |reason: String| CommandExecutionError {
        phase,
        id: id.to_string(),
        unit: unit.name.clone(),
        container: container.to_string(),
        reason,
    };

    debug!(%phase, id, container, ?argv, "exec");
    let result = if show_output {
        let relay = |line: &str| reporter.output_line(line);
        exec.exec_relaying(&unit.name, container, argv, &relay).await
    } else {
        exec.exec(&unit.name, container, argv).await
    };

    let output = result.map_err(|e| failure(format!("{e:#}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output
            .status
            .code()
            .map_or_else(|| "signal".to_string(), |c| c.to_string());
        let detail = stderr.trim();
        let reason = if detail.is_empty() {
            format!("exit status {code}")
        } else {
            format!("exit status {code}: {detail}")
        };
        return Err(failure(reason).into());
    }
    Ok(output)
}
