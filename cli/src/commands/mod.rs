//! Command implementations

pub mod config;
pub mod deploy;
pub mod push;
pub mod version;

use std::path::Path;

use anyhow::{Context, Result};

use crate::domain::component::{COMPONENT_FILE, ComponentFile};

/// Read and validate `devpush.yaml` from `context_dir`.
///
/// # Errors
///
/// Returns an error if the file is missing, malformed or describes an
/// invalid workload.
pub fn load_component(context_dir: &Path) -> Result<ComponentFile> {
    let path = context_dir.join(COMPONENT_FILE);
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    ComponentFile::parse(&raw).with_context(|| format!("in {}", path.display()))
}
