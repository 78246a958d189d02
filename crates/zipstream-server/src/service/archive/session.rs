//! Streaming session: one archiver process feeding one response body.

use std::io;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::TRACING_TARGET;
use super::delay::ChunkDelay;
use super::metrics::{SessionGuard, SessionOutcome};

/// Time granted to the archiver to exit on its own after closing its output.
pub(super) const EXIT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Amount of standard error kept for logging; the rest is discarded.
const DIAGNOSTICS_LIMIT: u64 = 64 * 1024;

/// Reasons a session stops before the archiver reaches end of output.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The response body was dropped, usually because the client went away.
    #[error("client disconnected")]
    Interrupted,
    /// The server is shutting down.
    #[error("server is shutting down")]
    Shutdown,
    /// Reading the archiver output failed.
    #[error("failed to read archiver output")]
    Read(#[source] io::Error),
}

/// Archive bytes in the order the archiver produced them.
///
/// Dropping the stream stops the session and terminates the archiver.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct ArchiveStream {
    inner: ReceiverStream<io::Result<Bytes>>,
}

impl ArchiveStream {
    pub(crate) fn new(receiver: mpsc::Receiver<io::Result<Bytes>>) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
        }
    }
}

impl Stream for ArchiveStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// State owned by the task that relays archiver output.
pub(crate) struct ArchiveSession {
    archive_id: String,
    child: Child,
    stdout: ChildStdout,
    diagnostics: JoinHandle<Vec<u8>>,
    chunk_size: usize,
    delay: Arc<dyn ChunkDelay>,
    shutdown: CancellationToken,
    guard: SessionGuard,
    chunks_sent: u64,
    bytes_sent: u64,
}

impl ArchiveSession {
    /// Takes ownership of a freshly spawned archiver.
    ///
    /// Starts draining standard error right away so a chatty archiver can
    /// never block on a full pipe.
    pub(crate) fn new(
        archive_id: String,
        mut child: Child,
        chunk_size: usize,
        delay: Arc<dyn ChunkDelay>,
        shutdown: CancellationToken,
        guard: SessionGuard,
    ) -> io::Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("archiver stdout is not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("archiver stderr is not piped"))?;

        Ok(Self {
            archive_id,
            child,
            stdout,
            diagnostics: tokio::spawn(drain_diagnostics(stderr)),
            chunk_size,
            delay,
            shutdown,
            guard,
            chunks_sent: 0,
            bytes_sent: 0,
        })
    }

    /// Relays the archive into `sender` and always reaps the archiver.
    pub(crate) async fn run(mut self, sender: mpsc::Sender<io::Result<Bytes>>) {
        let result = self.relay(&sender).await;

        let grace = result.is_ok().then_some(EXIT_GRACE_PERIOD);
        let status = self.terminate(grace).await;
        let diagnostics = self.collect_diagnostics().await;

        let outcome = match (result, status) {
            (Ok(()), Ok(status)) if status.success() => {
                tracing::info!(
                    target: TRACING_TARGET,
                    archive_id = %self.archive_id,
                    chunks = self.chunks_sent,
                    bytes = self.bytes_sent,
                    "archive sent"
                );
                SessionOutcome::Completed
            }
            (Ok(()), Ok(status)) => {
                // Headers are already out, the client keeps whatever it got.
                tracing::warn!(
                    target: TRACING_TARGET,
                    archive_id = %self.archive_id,
                    exit_status = %status,
                    bytes = self.bytes_sent,
                    diagnostics = %String::from_utf8_lossy(&diagnostics).trim(),
                    "archiver exited abnormally"
                );
                SessionOutcome::Failed
            }
            (Ok(()), Err(err)) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    archive_id = %self.archive_id,
                    error = %err,
                    "failed to reap archiver"
                );
                SessionOutcome::Failed
            }
            (Err(err @ (StreamError::Interrupted | StreamError::Shutdown)), _) => {
                tracing::info!(
                    target: TRACING_TARGET,
                    archive_id = %self.archive_id,
                    reason = %err,
                    bytes = self.bytes_sent,
                    "download was interrupted"
                );
                SessionOutcome::Interrupted
            }
            (Err(StreamError::Read(err)), _) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    archive_id = %self.archive_id,
                    error = %err,
                    bytes = self.bytes_sent,
                    "archive stream failed"
                );

                // Abort the body so the client sees a truncated transfer.
                let abort = io::Error::new(err.kind(), "archive stream aborted");
                let _ = time::timeout(EXIT_GRACE_PERIOD, sender.send(Err(abort))).await;
                SessionOutcome::Failed
            }
        };

        self.guard.record(outcome);
    }

    /// Copies archiver output to the channel chunk by chunk until end of output.
    async fn relay(&mut self, sender: &mpsc::Sender<io::Result<Bytes>>) -> Result<(), StreamError> {
        let mut buffer = vec![0; self.chunk_size];

        loop {
            let read = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Err(StreamError::Shutdown),
                () = sender.closed() => return Err(StreamError::Interrupted),
                read = self.stdout.read(&mut buffer) => read.map_err(StreamError::Read)?,
            };

            if read == 0 {
                return Ok(());
            }

            tracing::debug!(
                target: TRACING_TARGET,
                archive_id = %self.archive_id,
                chunk_size = read,
                "sending archive chunk"
            );

            let chunk = Bytes::copy_from_slice(&buffer[..read]);
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return Err(StreamError::Shutdown),
                sent = sender.send(Ok(chunk)) => sent.map_err(|_| StreamError::Interrupted)?,
            }

            self.chunks_sent += 1;
            self.bytes_sent += read as u64;

            if let Some(delay) = self.delay.next_delay() {
                tokio::select! {
                    biased;
                    () = self.shutdown.cancelled() => return Err(StreamError::Shutdown),
                    () = sender.closed() => return Err(StreamError::Interrupted),
                    () = time::sleep(delay) => {}
                }
            }
        }
    }

    /// Waits up to `grace` for a voluntary exit, then kills and reaps.
    async fn terminate(&mut self, grace: Option<Duration>) -> io::Result<ExitStatus> {
        if let Some(grace) = grace
            && let Ok(status) = time::timeout(grace, self.child.wait()).await
        {
            return status;
        }

        if let Err(err) = self.child.start_kill() {
            tracing::trace!(
                target: TRACING_TARGET,
                archive_id = %self.archive_id,
                error = %err,
                "archiver already exited"
            );
        }

        self.child.wait().await
    }

    /// Joins the stderr drain task.
    ///
    /// Grandchildren of the archiver may keep the pipe open after it was
    /// reaped, so the drain is abandoned after the grace period.
    async fn collect_diagnostics(&mut self) -> Vec<u8> {
        match time::timeout(EXIT_GRACE_PERIOD, &mut self.diagnostics).await {
            Ok(joined) => joined.unwrap_or_default(),
            Err(_) => {
                self.diagnostics.abort();
                Vec::new()
            }
        }
    }
}

/// Reads standard error to the end, keeping the first [`DIAGNOSTICS_LIMIT`] bytes.
async fn drain_diagnostics(mut stderr: ChildStderr) -> Vec<u8> {
    let mut kept = Vec::new();

    if let Err(err) = (&mut stderr).take(DIAGNOSTICS_LIMIT).read_to_end(&mut kept).await {
        tracing::trace!(target: TRACING_TARGET, error = %err, "archiver stderr closed");
        return kept;
    }

    if let Err(err) = tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await {
        tracing::trace!(target: TRACING_TARGET, error = %err, "archiver stderr closed");
    }

    kept
}
