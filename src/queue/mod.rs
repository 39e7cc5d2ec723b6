//! Serialized command delivery over a named FIFO.
//!
//! A long-running serve loop owns the read end of a Unix named pipe and
//! executes commands strictly in arrival order. Writers enqueue a single
//! JSON line each; when no reader is attached the enqueue reports `false`
//! (rather than blocking or erroring) so the caller can execute the
//! command directly instead.

use std::io::ErrorKind;
use std::os::unix::fs::FileTypeExt;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::stat::Mode;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;

use crate::dispatch::CommandRequest;
use crate::error::QueueError;

/// Pause before re-checking the FIFO when the path disappears under a
/// running server.
const RECREATE_DELAY: Duration = Duration::from_millis(200);

/// Command executor the serve loop hands decoded requests to.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn execute(&self, request: &CommandRequest) -> anyhow::Result<()>;
}

pub struct CommandQueue {
    path: PathBuf,
}

impl CommandQueue {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Try to hand a command to a running serve loop. `Ok(false)` means no
    /// reader is attached (no FIFO, or a stale one left by a dead server)
    /// and the caller should execute directly. A stale FIFO is removed so
    /// the next server start recreates it cleanly.
    pub async fn enqueue(&self, request: &CommandRequest) -> Result<bool, QueueError> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');

        let sender = match pipe::OpenOptions::new().open_sender(&self.path) {
            Ok(sender) => sender,
            Err(err) if err.raw_os_error() == Some(nix::libc::ENXIO) => {
                // FIFO exists but nothing is reading: a serve loop died
                // without cleaning up.
                tracing::debug!(path = %self.path.display(), "removing stale queue FIFO");
                if let Err(err) = std::fs::remove_file(&self.path) {
                    if err.kind() != ErrorKind::NotFound {
                        return Err(err.into());
                    }
                }
                return Ok(false);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
            Err(err) => return Err(err.into()),
        };

        let mut sender = sender;
        sender.write_all(line.as_bytes()).await?;
        tracing::debug!(path = %self.path.display(), "command enqueued");
        Ok(true)
    }

    /// Create the FIFO if needed; refuse to serve from a path occupied by
    /// anything else.
    fn ensure_fifo(&self) -> Result<(), QueueError> {
        match std::fs::metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => Ok(()),
            Ok(_) => Err(QueueError::Occupied {
                path: self.path.clone(),
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                nix::unistd::mkfifo(&self.path, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| {
                    QueueError::Create {
                        path: self.path.clone(),
                        reason: errno.to_string(),
                    }
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run forever, executing queued commands one at a time in arrival
    /// order. Command failures are logged and do not stop the loop; only
    /// FIFO-level problems end it.
    ///
    /// The FIFO is opened read-write: holding a write end ourselves means
    /// the reader never sees EOF between clients, and a client's
    /// `open_sender` cannot hit ENXIO while this loop is alive.
    pub async fn serve(&self, sink: &dyn CommandSink) -> Result<(), QueueError> {
        tracing::info!(path = %self.path.display(), "command queue serving");

        loop {
            self.ensure_fifo()?;
            let receiver = match pipe::OpenOptions::new()
                .read_write(true)
                .open_receiver(&self.path)
            {
                Ok(receiver) => receiver,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    // Path vanished between creation and open. Recreate.
                    tokio::time::sleep(RECREATE_DELAY).await;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };
            let mut lines = BufReader::new(receiver).lines();
            while let Some(line) = lines.next_line().await? {
                self.handle_line(sink, &line).await;
            }
        }
    }

    async fn handle_line(&self, sink: &dyn CommandSink, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        let request: CommandRequest = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(%err, %line, "discarding malformed queue entry");
                return;
            }
        };
        tracing::debug!(verb = ?request.verb, args = ?request.args, "executing queued command");
        if let Err(err) = sink.execute(&request).await {
            tracing::error!(error = %format!("{err:#}"), "queued command failed");
        }
    }
}
