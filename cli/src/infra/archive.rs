//! Infrastructure implementation of the `SourceArchiver` port.
//!
//! `TarArchiver` writes a tar stream from a blocking task into a bounded
//! channel, so the transport can start sending before the walk finishes.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, ensure};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tokio::sync::mpsc;
use tracing::debug;

use crate::application::ports::{ArchiveRequest, ArchiveStream, ArchiveWriter, SourceArchiver};
use crate::domain::sync::relative_to_root;

/// Per-directory ignore file merged with the configured exclusions.
pub const IGNORE_FILE: &str = ".devpushignore";

const CHUNK_SIZE: usize = 64 * 1024;
const CHANNEL_DEPTH: usize = 8;

/// Tar archiver backed by the `tar` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarArchiver;

impl SourceArchiver for TarArchiver {
    fn archive(&self, request: ArchiveRequest) -> Result<ArchiveStream> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let handle = tokio::task::spawn_blocking(move || {
            let result = write_archive(ChannelWriter::new(tx), &request).map(|_| ());
            match result {
                // The reader went away; whatever stopped it reports the failure.
                Err(e) if is_broken_pipe(&e) => {
                    debug!("archive reader closed early");
                    Ok(())
                }
                other => other,
            }
        });
        Ok(ArchiveStream {
            chunks: rx,
            writer: ArchiveWriter::new(handle),
        })
    }
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|e| e.kind() == io::ErrorKind::BrokenPipe)
}

/// `Write` adapter that batches bytes into channel messages.
struct ChannelWriter {
    tx: mpsc::Sender<Vec<u8>>,
    buf: Vec<u8>,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        self.tx
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive reader dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Write the archive described by `request` into `out` and return `out`.
///
/// Entry names are relative to `request.root` and always `/`-separated.
/// Symbolic links are stored as links. Listed paths that no longer exist
/// are skipped.
///
/// # Errors
///
/// Returns an error if an exclusion pattern is invalid, a listed path lies
/// outside the root (lexically or through a symlinked directory), or
/// reading a file or writing to `out` fails.
pub fn write_archive<W: Write>(out: W, request: &ArchiveRequest) -> Result<W> {
    let root = request.root.as_path();
    let matcher = exclusions(root, &request.exclude)?;
    let mut builder = tar::Builder::new(out);
    builder.follow_symlinks(false);

    match &request.files {
        None => append_children(&mut builder, root, root, &matcher)?,
        Some(files) => {
            let real_root = root
                .canonicalize()
                .with_context(|| format!("cannot resolve {}", root.display()))?;
            for file in files {
                let relative = listed_relative(root, &real_root, file)?;
                let path = real_root.join(&relative);
                let Ok(meta) = path.symlink_metadata() else {
                    debug!(path = %path.display(), "skipping vanished path");
                    continue;
                };
                if relative.as_os_str().is_empty() {
                    append_children(&mut builder, root, root, &matcher)?;
                } else if !is_excluded(&matcher, &relative, meta.is_dir()) {
                    append_entry(&mut builder, &real_root, &path, meta.is_dir(), &matcher)?;
                }
            }
        }
    }

    for (name, data) in &request.payloads {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mtime(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
        );
        builder
            .append_data(&mut header, name, data.as_slice())
            .with_context(|| format!("appending {name}"))?;
    }

    let mut out = builder.into_inner().context("finishing archive")?;
    out.flush().context("flushing archive")?;
    Ok(out)
}

/// Resolve a listed path to a relative path that really lives under the root.
///
/// Absolute paths may be spelled against either `root` or its canonical
/// form. The parent directory is canonicalized so a symlinked directory
/// cannot lead outside.
fn listed_relative(root: &Path, real_root: &Path, file: &Path) -> Result<PathBuf> {
    let relative =
        relative_to_root(root, file).or_else(|_| relative_to_root(real_root, file))?;
    if relative.as_os_str().is_empty() {
        return Ok(relative);
    }
    if let Some(parent) = real_root.join(&relative).parent()
        && let Ok(real_parent) = parent.canonicalize()
    {
        ensure!(
            real_parent.starts_with(real_root),
            "{} is outside {}",
            file.display(),
            root.display()
        );
    }
    Ok(relative)
}

fn exclusions(root: &Path, patterns: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(root);
    for pattern in patterns {
        builder
            .add_line(None, pattern)
            .with_context(|| format!("invalid exclude pattern '{pattern}'"))?;
    }
    let ignore_file = root.join(IGNORE_FILE);
    if ignore_file.is_file() {
        if let Some(e) = builder.add(&ignore_file) {
            return Err(e).with_context(|| format!("cannot read {}", ignore_file.display()));
        }
    }
    builder.build().context("building exclusion matcher")
}

fn is_excluded(matcher: &Gitignore, relative: &Path, is_dir: bool) -> bool {
    matcher
        .matched_path_or_any_parents(relative, is_dir)
        .is_ignore()
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn append_entry<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    path: &Path,
    is_dir: bool,
    matcher: &Gitignore,
) -> Result<()> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let name = entry_name(relative);
    if is_dir {
        builder
            .append_dir(&name, path)
            .with_context(|| format!("appending {}", path.display()))?;
        append_children(builder, root, path, matcher)
    } else {
        builder
            .append_path_with_name(path, &name)
            .with_context(|| format!("appending {}", path.display()))
    }
}

fn append_children<W: Write>(
    builder: &mut tar::Builder<W>,
    root: &Path,
    dir: &Path,
    matcher: &Gitignore,
) -> Result<()> {
    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("cannot read {}", dir.display()))?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        let is_dir = entry
            .file_type()
            .with_context(|| format!("cannot stat {}", path.display()))?
            .is_dir();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        if is_excluded(matcher, relative, is_dir) {
            continue;
        }
        append_entry(builder, root, &path, is_dir, matcher)?;
    }
    Ok(())
}
