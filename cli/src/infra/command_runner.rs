//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` is the production implementation that uses tokio
//! for async process execution with guaranteed timeout and kill on all platforms.

use std::collections::VecDeque;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use crate::application::ports::CommandRunner;

/// Default timeout for short `kubectl` calls (get, create, replace, delete).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Lines of each stream kept in the output returned by `run_relaying`.
const RELAY_TAIL_LINES: usize = 50;

/// Production `CommandRunner`: uses tokio for async process execution
/// with guaranteed timeout and kill on all platforms.
///
/// On Windows, `tokio::time::timeout` around `.output().await` does NOT kill
/// the child process when the timeout fires, the future is dropped but the
/// OS process keeps running. This implementation uses `tokio::select!` with
/// explicit `child.kill()` to guarantee the process is terminated.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn spawn(program: &str, args: &[&str], stdin: bool) -> Result<Child> {
    Command::new(program)
        .args(args)
        .stdin(if stdin { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))
}

async fn read_all(handle: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

/// Completes after `limit`; never completes without one.
async fn expiry(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}

fn timed_out(program: &str, limit: Option<Duration>) -> anyhow::Error {
    anyhow::anyhow!(
        "{program} timed out after {}s",
        limit.unwrap_or_default().as_secs()
    )
}

/// Wait for `child` while draining its output, killing it once `limit`
/// elapses.
async fn collect(mut child: Child, program: &str, limit: Option<Duration>) -> Result<Output> {
    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();

    tokio::select! {
        result = async {
            let (status, stdout, stderr) = tokio::join!(
                child.wait(),
                read_all(stdout_handle),
                read_all(stderr_handle),
            );
            Ok(Output {
                status: status.with_context(|| format!("waiting for {program}"))?,
                stdout,
                stderr,
            })
        } => result,
        () = expiry(limit) => {
            let _ = child.kill().await;
            Err(timed_out(program, limit))
        }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, Some(self.timeout)).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        limit: Option<Duration>,
    ) -> Result<Output> {
        collect(spawn(program, args, false)?, program, limit).await
    }

    async fn run_with_stdin(&self, program: &str, args: &[&str], input: &[u8]) -> Result<Output> {
        let mut child = spawn(program, args, true)?;
        let stdin_handle = child.stdin.take();
        let input_owned = input.to_vec();
        let stdin_task = tokio::spawn(async move {
            if let Some(mut stdin) = stdin_handle {
                let _ = stdin.write_all(&input_owned).await;
            }
        });

        let output = collect(child, program, Some(self.timeout)).await;
        let _ = stdin_task.await;
        output
    }

    async fn run_with_stdin_stream(
        &self,
        program: &str,
        args: &[&str],
        mut chunks: mpsc::Receiver<Vec<u8>>,
        limit: Option<Duration>,
    ) -> Result<Output> {
        let mut child = spawn(program, args, true)?;
        let stdin_handle = child.stdin.take();
        // Dropping stdin after the last chunk signals end of input.
        let stdin_task = tokio::spawn(async move {
            let Some(mut stdin) = stdin_handle else {
                return;
            };
            while let Some(chunk) = chunks.recv().await {
                if stdin.write_all(&chunk).await.is_err() {
                    break;
                }
            }
            let _ = stdin.shutdown().await;
        });

        let output = collect(child, program, limit).await;
        stdin_task.abort();
        output
    }

    async fn run_relaying(
        &self,
        program: &str,
        args: &[&str],
        limit: Option<Duration>,
        on_line: &dyn Fn(&str),
    ) -> Result<Output> {
        let mut child = spawn(program, args, false)?;
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();

        // Both streams feed one channel so lines are relayed in arrival order.
        let (tx, mut rx) = mpsc::channel::<(Stream, String)>(64);
        let out_task = tokio::spawn(forward_lines(stdout_handle, Stream::Stdout, tx.clone()));
        let err_task = tokio::spawn(forward_lines(stderr_handle, Stream::Stderr, tx));

        let mut stdout = Tail::default();
        let mut stderr = Tail::default();
        let status: Result<ExitStatus> = tokio::select! {
            status = async {
                while let Some((stream, line)) = rx.recv().await {
                    on_line(&line);
                    match stream {
                        Stream::Stdout => stdout.push(line),
                        Stream::Stderr => stderr.push(line),
                    }
                }
                child.wait().await
            } => status.with_context(|| format!("waiting for {program}")),
            () = expiry(limit) => {
                let _ = child.kill().await;
                out_task.abort();
                err_task.abort();
                return Err(timed_out(program, limit));
            }
        };

        Ok(Output {
            status: status?,
            stdout: stdout.into_bytes(),
            stderr: stderr.into_bytes(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// The last [`RELAY_TAIL_LINES`] lines of a relayed stream.
#[derive(Default)]
struct Tail(VecDeque<String>);

impl Tail {
    fn push(&mut self, line: String) {
        if self.0.len() == RELAY_TAIL_LINES {
            self.0.pop_front();
        }
        self.0.push_back(line);
    }

    fn into_bytes(self) -> Vec<u8> {
        let mut out = Vec::new();
        for line in self.0 {
            out.extend_from_slice(line.as_bytes());
            out.push(b'\n');
        }
        out
    }
}

async fn forward_lines(
    handle: Option<impl AsyncRead + Unpin>,
    stream: Stream,
    tx: mpsc::Sender<(Stream, String)>,
) {
    let Some(h) = handle else {
        return;
    };
    let mut lines = BufReader::new(h).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send((stream, line)).await.is_err() {
            break;
        }
    }
}
