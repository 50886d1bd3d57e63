//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod command;
pub mod component;
pub mod config;
pub mod error;
pub mod manifest;
pub mod resources;
pub mod supervisor;
pub mod sync;
pub mod workload;

pub use command::{CommandSelection, CommandSet, LifecycleCommand, Phase};
pub use component::ComponentFile;
pub use config::{DevpushConfig, validate_config_key, validate_config_value};
pub use error::{
    CommandExecutionError, ConfigError, ManifestError, RemoteCallError, SyncError,
    ValidationError,
};
pub use manifest::{AppliedManifest, Manifest, ResourceId, Substitutions};
pub use sync::{SyncPlan, WatchedChanges};
pub use workload::{UnitRef, WorkloadSpec};
