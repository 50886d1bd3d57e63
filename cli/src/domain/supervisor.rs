//! Process-manager wiring for the run container.
//!
//! The run container's entrypoint is replaced by `supervisord`, whose
//! binary and config are copied into a shared empty volume by a bootstrap
//! init container. Restarting the run command then only needs an exec into
//! the container instead of a new execution unit.

use devpush_common::{Container, EnvVar, Volume, VolumeMount};

use crate::domain::command::LifecycleCommand;

/// Shared volume holding the supervisor binary and config.
pub const SUPERVISOR_VOLUME: &str = "devpush-supervisor-data";
pub const SUPERVISOR_MOUNT_PATH: &str = "/opt/devpush/";
/// Directory in the bootstrap image copied into the shared volume.
pub const BOOTSTRAP_SOURCE: &str = "/opt/devpush-init/.";
pub const BOOTSTRAP_CONTAINER: &str = "copy-supervisord";

pub const SUPERVISORD_BINARY: &str = "/opt/devpush/bin/supervisord";
pub const SUPERVISORD_CONF: &str = "/opt/devpush/conf/devfile-supervisor.conf";

/// Supervised program that runs `$DEVPUSH_COMMAND_RUN`.
pub const RUN_PROGRAM: &str = "devrun";
pub const ENV_COMMAND_RUN: &str = "DEVPUSH_COMMAND_RUN";
pub const ENV_COMMAND_RUN_WORKING_DIR: &str = "DEVPUSH_COMMAND_RUN_WORKING_DIR";

/// Mount the supervisor volume into the run container and hand it the run
/// command through the environment.
///
/// The entrypoint is only replaced when the container declares no command
/// or args of its own. Returns `false` if no container matches.
pub fn augment_run_container(containers: &mut [Container], run: &LifecycleCommand) -> bool {
    let Some(container) = containers.iter_mut().find(|c| c.name == run.component) else {
        return false;
    };

    container.volume_mounts.push(VolumeMount {
        name: SUPERVISOR_VOLUME.to_string(),
        mount_path: SUPERVISOR_MOUNT_PATH.to_string(),
    });

    if container.command.is_empty() && container.args.is_empty() {
        container.command = vec![SUPERVISORD_BINARY.to_string()];
        container.args = vec!["-c".to_string(), SUPERVISORD_CONF.to_string()];
    }

    set_env_if_absent(container, ENV_COMMAND_RUN, &run.script());
    if let Some(dir) = &run.workdir {
        set_env_if_absent(container, ENV_COMMAND_RUN_WORKING_DIR, dir);
    }
    true
}

fn set_env_if_absent(container: &mut Container, name: &str, value: &str) {
    if container.env.iter().any(|e| e.name == name) {
        return;
    }
    container.env.push(EnvVar {
        name: name.to_string(),
        value: value.to_string(),
    });
}

/// Init container that seeds the shared volume from `image`.
#[must_use]
pub fn bootstrap_container(image: &str) -> Container {
    Container {
        name: BOOTSTRAP_CONTAINER.to_string(),
        image: image.to_string(),
        command: vec!["/usr/bin/cp".to_string()],
        args: vec![
            "-r".to_string(),
            BOOTSTRAP_SOURCE.to_string(),
            SUPERVISOR_MOUNT_PATH.to_string(),
        ],
        volume_mounts: vec![VolumeMount {
            name: SUPERVISOR_VOLUME.to_string(),
            mount_path: SUPERVISOR_MOUNT_PATH.to_string(),
        }],
        ..Container::default()
    }
}

#[must_use]
pub fn supervisor_volume() -> Volume {
    Volume::empty_dir(SUPERVISOR_VOLUME)
}

/// Whether the supervisor must be started by hand: true unless the
/// container's recorded entrypoint is exactly the supervisor binary.
#[must_use]
pub fn needs_explicit_start(container_command: &[String]) -> bool {
    container_command != [SUPERVISORD_BINARY]
}

/// Start the supervisor as a daemon.
#[must_use]
pub fn start_argv() -> Vec<String> {
    vec![
        SUPERVISORD_BINARY.to_string(),
        "-c".to_string(),
        SUPERVISORD_CONF.to_string(),
        "-d".to_string(),
    ]
}

fn ctl(action: &str, target: &str) -> Vec<String> {
    vec![
        SUPERVISORD_BINARY.to_string(),
        "ctl".to_string(),
        action.to_string(),
        target.to_string(),
    ]
}

/// Stop every supervised program, then start the run program.
#[must_use]
pub fn restart_sequence() -> Vec<Vec<String>> {
    vec![ctl("stop", "all"), ctl("start", RUN_PROGRAM)]
}

/// Start the run program without stopping it first. A running program is
/// left alone, so hot-reloading runtimes pick up synced files in place.
#[must_use]
pub fn reload_sequence() -> Vec<Vec<String>> {
    vec![ctl("start", RUN_PROGRAM)]
}
