//! Infrastructure implementation of the `ManifestStore` port.
//!
//! `ManifestFile` keeps the last applied manifest under the context
//! directory, written atomically (temp file + rename) from a blocking task.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::ports::ManifestStore;
use crate::domain::manifest::AppliedManifest;

/// State directory created inside the context directory.
pub const STATE_DIR: &str = ".devpush";
const MANIFEST_FILE: &str = "manifest.yaml";

/// Last-applied manifest record for one context directory.
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    /// Record kept at `<context_dir>/.devpush/manifest.yaml`.
    #[must_use]
    pub fn for_context(context_dir: &Path) -> Self {
        Self::with_path(context_dir.join(STATE_DIR).join(MANIFEST_FILE))
    }

    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_sync(path: &Path) -> Result<Option<AppliedManifest>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let applied = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(applied))
    }

    fn save_sync(path: &Path, applied: &AppliedManifest) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory {}", parent.display()))?;
        }
        let content = serde_yaml::to_string(applied).context("serializing applied manifest")?;

        let temp_path = path.with_extension("yaml.tmp");
        std::fs::write(&temp_path, &content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("setting permissions on {}", temp_path.display()))?;
        }

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("finalizing {}", path.display()))
    }

    fn clear_sync(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path).with_context(|| format!("removing {}", path.display()))?;
        }
        Ok(())
    }
}

impl ManifestStore for ManifestFile {
    async fn load_async(&self) -> Result<Option<AppliedManifest>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::load_sync(&path))
            .await
            .context("manifest load task panicked")?
    }

    async fn save_async(&self, applied: &AppliedManifest) -> Result<()> {
        let path = self.path.clone();
        let applied = applied.clone();
        tokio::task::spawn_blocking(move || Self::save_sync(&path, &applied))
            .await
            .context("manifest save task panicked")?
    }

    async fn clear_async(&self) -> Result<()> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::clear_sync(&path))
            .await
            .context("manifest clear task panicked")?
    }
}
