//! Full-versus-incremental transfer decision.

use std::path::{Component, Path, PathBuf};

use crate::domain::error::ValidationError;

/// What to transfer into the execution unit on this push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPlan {
    /// Archive the whole source root.
    FullTree,
    /// Archive only `changed`, after removing `deleted` in the container.
    Incremental {
        changed: Vec<PathBuf>,
        deleted: Vec<PathBuf>,
    },
}

impl SyncPlan {
    /// Choose the plan for a push.
    ///
    /// Incremental only when the workload already existed, the unit is the
    /// same one as last push, a watcher reported specific paths and no full
    /// sync was forced.
    #[must_use]
    pub fn decide(
        workload_existed: bool,
        unit_changed: bool,
        force: bool,
        watched: Option<WatchedChanges>,
    ) -> Self {
        match watched {
            Some(w) if workload_existed && !unit_changed && !force => Self::Incremental {
                changed: w.changed,
                deleted: w.deleted,
            },
            _ => Self::FullTree,
        }
    }

    /// Whether executing this plan leaves the unit with new content, so
    /// lifecycle commands must run again.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        match self {
            Self::FullTree => true,
            Self::Incremental { changed, deleted } => !changed.is_empty() || !deleted.is_empty(),
        }
    }
}

/// Paths a file watcher reported since the previous push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchedChanges {
    pub changed: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl WatchedChanges {
    /// Rewrite every reported path relative to `source_root`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PathOutsideRoot`] for the first path that
    /// does not stay under the root.
    pub fn confined_to(self, source_root: &Path) -> Result<Self, ValidationError> {
        let confine = |paths: Vec<PathBuf>| {
            paths
                .iter()
                .map(|p| relative_to_root(source_root, p))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            changed: confine(self.changed)?,
            deleted: confine(self.deleted)?,
        })
    }
}

/// `path` as a clean relative path under `source_root`.
///
/// Absolute paths must start with `source_root`. `.` segments are dropped;
/// any `..` segment is rejected rather than resolved, so the result can
/// never name something outside the root. The root itself maps to an empty
/// path.
///
/// # Errors
///
/// Returns [`ValidationError::PathOutsideRoot`] if the path escapes.
pub fn relative_to_root(source_root: &Path, path: &Path) -> Result<PathBuf, ValidationError> {
    let outside = || ValidationError::PathOutsideRoot {
        path: path.display().to_string(),
        root: source_root.display().to_string(),
    };
    let relative = if path.is_absolute() {
        path.strip_prefix(source_root).map_err(|_| outside())?
    } else {
        path
    };
    let mut clean = PathBuf::new();
    for part in relative.components() {
        match part {
            Component::Normal(segment) => clean.push(segment),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
    }
    Ok(clean)
}

/// Location of a local path inside the container, always `/`-separated.
///
/// `path` may be absolute under `source_root` or relative to it.
///
/// # Errors
///
/// Returns [`ValidationError::PathOutsideRoot`] if the path escapes the
/// root or names the root itself.
pub fn remote_path(
    target_dir: &str,
    source_root: &Path,
    path: &Path,
) -> Result<String, ValidationError> {
    let relative = relative_to_root(source_root, path)?;
    if relative.as_os_str().is_empty() {
        return Err(ValidationError::PathOutsideRoot {
            path: path.display().to_string(),
            root: source_root.display().to_string(),
        });
    }
    let mut out = target_dir.trim_end_matches('/').to_string();
    for segment in &relative {
        out.push('/');
        out.push_str(&segment.to_string_lossy());
    }
    Ok(out)
}
