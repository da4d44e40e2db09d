//! Byte plumbing between the bridge and a gdb4hpc process.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::Result;

/// Interactive prompt gdb4hpc prints in front of its output.
pub const PROMPT: &str = "dbg all> ";
const COLOR_CODES: [&str; 2] = ["\x1b[0m", "\x1b[30;1m"];

/// Outbound half of the connection. Writes are fire-and-forget; replies come
/// back through [`crate::session::DebugSession::feed`].
pub trait Transport: Send + Sync {
    fn write(&self, text: &str) -> Result<()>;
}

/// Reassembles arbitrary output chunks into clean lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and returns every line it completed. A trailing
    /// partial line is kept for the next call.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.pending.push_str(chunk);

        let Some(cut) = self.pending.rfind('\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(cut + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split('\n')
            .map(sanitize)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Returns the unterminated remainder, if any, and clears it.
    pub fn flush(&mut self) -> Option<String> {
        let line = sanitize(&std::mem::take(&mut self.pending));
        (!line.is_empty()).then_some(line)
    }
}

fn sanitize(line: &str) -> String {
    let mut line = line.replace(PROMPT, "");
    for code in COLOR_CODES {
        line = line.replace(code, "");
    }
    line.trim().to_string()
}

/// A spawned gdb4hpc child. Stdin is fed by a writer task so [`Transport::write`]
/// never blocks the caller.
pub struct ProcessTransport {
    child: Mutex<Child>,
    queue: mpsc::UnboundedSender<String>,
    writer_task: JoinHandle<()>,
}

/// Stdout of a spawned gdb4hpc child, read line by line.
pub struct ProcessOutput {
    reader: BufReader<ChildStdout>,
    buf: Vec<u8>,
}

impl ProcessTransport {
    pub fn spawn(config: &BridgeConfig) -> Result<(Self, ProcessOutput)> {
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|source| BridgeError::Spawn {
            program: config.program.clone(),
            source,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| BridgeError::Transport("missing stdin pipe for gdb4hpc".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BridgeError::Transport("missing stdout pipe for gdb4hpc".into()))?;

        tracing::info!(program = %config.program, pid = ?child.id(), "spawned gdb4hpc");

        let (queue, rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(writer_loop(stdin, rx));

        Ok((
            Self {
                child: Mutex::new(child),
                queue,
                writer_task,
            },
            ProcessOutput {
                reader: BufReader::new(stdout),
                buf: Vec::new(),
            },
        ))
    }

    /// Gives the child `grace` to exit on its own, then kills it.
    pub async fn shutdown(&self, grace: Duration) {
        let mut child = self.child.lock().await;
        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => tracing::info!(%status, "gdb4hpc exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for gdb4hpc"),
            Err(_) => {
                tracing::info!(?grace, "gdb4hpc still running, killing it");
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "gdb4hpc already gone");
                }
            }
        }
        self.writer_task.abort();
    }
}

impl Transport for ProcessTransport {
    fn write(&self, text: &str) -> Result<()> {
        self.queue
            .send(text.to_string())
            .map_err(|_| BridgeError::Transport("gdb4hpc stdin is closed".into()))
    }
}

async fn writer_loop(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(text) = rx.recv().await {
        tracing::trace!(text = text.trim_end(), "-> gdb4hpc");
        if let Err(e) = stdin.write_all(text.as_bytes()).await {
            tracing::warn!(error = %e, "failed to write to gdb4hpc");
            break;
        }
        if let Err(e) = stdin.flush().await {
            tracing::warn!(error = %e, "failed to flush gdb4hpc stdin");
            break;
        }
    }
}

impl ProcessOutput {
    /// Next chunk of output, or `None` once the child closed stdout.
    pub async fn next_chunk(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&self.buf).into_owned()))
    }
}
