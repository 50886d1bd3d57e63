//! Infrastructure implementation of the `ManifestFetcher` port.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::ManifestFetcher;

/// Loads manifests from local files or HTTP(S) URLs.
///
/// Relative paths resolve against `base_dir`.
pub struct SourceFetcher {
    base_dir: PathBuf,
}

impl SourceFetcher {
    #[must_use]
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

fn download(url: &str) -> Result<String> {
    let req = ureq::get(url).set("User-Agent", "devpush-cli");
    match req.call() {
        Ok(resp) => resp.into_string().context("reading manifest response"),
        Err(ureq::Error::Status(code, _)) => anyhow::bail!("cannot fetch {url}: HTTP {code}"),
        Err(e) => Err(e).with_context(|| format!("cannot fetch {url}")),
    }
}

impl ManifestFetcher for SourceFetcher {
    async fn fetch(&self, source: &str) -> Result<String> {
        if is_url(source) {
            let url = source.to_string();
            return tokio::task::spawn_blocking(move || download(&url))
                .await
                .context("manifest download task panicked")?;
        }
        let path = self.base_dir.join(source);
        let display = path.display().to_string();
        tokio::task::spawn_blocking(move || std::fs::read_to_string(path))
            .await
            .context("manifest read task panicked")?
            .with_context(|| format!("cannot read manifest {display}"))
    }
}
