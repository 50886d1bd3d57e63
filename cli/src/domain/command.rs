//! Lifecycle commands and their per-phase selection.
//!
//! Pure functions only, no I/O, no async.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::ValidationError;
use crate::domain::workload::{EnvVarDef, WorkloadSpec};

/// Lifecycle phase. Declaration order is execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Init,
    Build,
    Run,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Init, Phase::Build, Phase::Run];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Init => "init",
            Phase::Build => "build",
            Phase::Run => "run",
        })
    }
}

/// A declared command bound to one container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleCommand {
    pub id: String,
    pub kind: Phase,
    /// Container the command executes in.
    pub component: String,
    pub command_line: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<String>,
    #[serde(default)]
    pub env: Vec<EnvVarDef>,
    /// When `false`, a changed source tree reloads the run process in place
    /// instead of stopping and starting it.
    #[serde(default = "default_restart")]
    pub restart: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_restart() -> bool {
    true
}

impl LifecycleCommand {
    /// Argument vector that runs the command through a POSIX shell,
    /// exporting its environment and changing into its working directory.
    #[must_use]
    pub fn shell_invocation(&self) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), self.script()]
    }

    /// The shell script run by [`Self::shell_invocation`].
    #[must_use]
    pub fn script(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|e| format!("export {}={}", e.name, shell_quote(&e.value)))
            .collect();
        if let Some(dir) = &self.workdir {
            parts.push(format!("cd {}", shell_quote(dir)));
        }
        parts.push(self.command_line.clone());
        parts.join(" && ")
    }
}

/// Single-quote `value` for a POSIX shell.
#[must_use]
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Explicit command ids requested on the command line, one per phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandSelection<'a> {
    pub init: Option<&'a str>,
    pub build: Option<&'a str>,
    pub run: Option<&'a str>,
}

impl<'a> CommandSelection<'a> {
    fn for_phase(&self, phase: Phase) -> Option<&'a str> {
        match phase {
            Phase::Init => self.init,
            Phase::Build => self.build,
            Phase::Run => self.run,
        }
    }
}

/// The validated commands for one push, as an ordered `(phase, command)` list.
///
/// Holds at most one command per phase, in [`Phase::ALL`] order, and always
/// exactly one run command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSet {
    entries: Vec<(Phase, LifecycleCommand)>,
    run_index: usize,
}

impl CommandSet {
    /// Pick one command per phase from `declared`.
    ///
    /// Per phase: an explicitly selected id wins, then a command marked
    /// `isDefault`, then the only command of that kind.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a selected id is unknown or of the
    /// wrong kind, a phase is ambiguous, the run command is missing, or a
    /// command targets a container the workload does not declare.
    pub fn select(
        workload: &WorkloadSpec,
        declared: &[LifecycleCommand],
        selection: CommandSelection<'_>,
    ) -> Result<Self, ValidationError> {
        let mut entries = Vec::new();
        for phase in Phase::ALL {
            let Some(command) = pick(declared, phase, selection.for_phase(phase))? else {
                continue;
            };
            if workload.container(&command.component).is_none() {
                return Err(ValidationError::UnknownContainer {
                    phase,
                    id: command.id.clone(),
                    container: command.component.clone(),
                });
            }
            entries.push((phase, command.clone()));
        }
        Self::from_entries(&workload.name, entries)
    }

    /// Build a set from already-chosen entries.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingRunCommand`] when no entry is a run command.
    pub fn from_entries(
        workload: &str,
        mut entries: Vec<(Phase, LifecycleCommand)>,
    ) -> Result<Self, ValidationError> {
        entries.sort_by_key(|(phase, _)| *phase);
        entries.dedup_by_key(|(phase, _)| *phase);
        let run_index = entries
            .iter()
            .position(|(phase, _)| *phase == Phase::Run)
            .ok_or_else(|| ValidationError::MissingRunCommand {
                workload: workload.to_string(),
            })?;
        Ok(Self { entries, run_index })
    }

    #[must_use]
    pub fn get(&self, phase: Phase) -> Option<&LifecycleCommand> {
        self.entries
            .iter()
            .find(|(p, _)| *p == phase)
            .map(|(_, c)| c)
    }

    #[must_use]
    pub fn run(&self) -> &LifecycleCommand {
        &self.entries[self.run_index].1
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Phase, LifecycleCommand)> {
        self.entries.iter()
    }
}

fn pick<'c>(
    declared: &'c [LifecycleCommand],
    phase: Phase,
    requested: Option<&str>,
) -> Result<Option<&'c LifecycleCommand>, ValidationError> {
    if let Some(id) = requested {
        let command = declared
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ValidationError::UnknownCommand { id: id.to_string() })?;
        if command.kind != phase {
            return Err(ValidationError::WrongPhase {
                id: id.to_string(),
                expected: phase,
                actual: command.kind,
            });
        }
        return Ok(Some(command));
    }

    let candidates: Vec<&LifecycleCommand> =
        declared.iter().filter(|c| c.kind == phase).collect();
    if let Some(default) = candidates.iter().find(|c| c.is_default) {
        return Ok(Some(default));
    }
    match candidates.as_slice() {
        [] => Ok(None),
        [only] => Ok(Some(only)),
        many => Err(ValidationError::AmbiguousCommand {
            phase,
            ids: many
                .iter()
                .map(|c| format!("'{}'", c.id))
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}
