//! On-demand ZIP archives of directories under the archive root.
//!
//! Every download spawns its own archiver process whose standard output is
//! relayed to the client chunk by chunk. The process never outlives the
//! download: it is reaped when the archive is complete, when the client goes
//! away, and when the server shuts down.

mod command;
mod delay;
mod metrics;
mod session;

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use self::command::{ArchiveCommand, ArchiveMode, DEFAULT_ARCHIVER};
pub use self::delay::{ChunkDelay, DEFAULT_JITTER_MAX_SECS, NoDelay, RandomJitter};
pub use self::metrics::{SessionMetrics, SessionOutcome};
use self::session::ArchiveSession;
pub use self::session::{ArchiveStream, StreamError};
use crate::{Error, Result};

/// Tracing target for archive sessions.
pub(crate) const TRACING_TARGET: &str = "zipstream_server::service::archive";

/// Default number of bytes read from the archiver per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

#[derive(Debug, Clone)]
struct Inner {
    root: PathBuf,
    chunk_size: usize,
    command: ArchiveCommand,
    delay: Arc<dyn ChunkDelay>,
}

/// Streams ZIP archives of subdirectories of a fixed root.
///
/// Cloning is cheap; all clones share configuration, metrics and the
/// shutdown signal.
#[derive(Debug, Clone)]
pub struct ArchiveService {
    inner: Arc<Inner>,
    metrics: SessionMetrics,
    shutdown: CancellationToken,
}

impl ArchiveService {
    /// Creates a service archiving subdirectories of `root` with the default
    /// archiver and no delay between chunks.
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                chunk_size,
                command: ArchiveCommand::default(),
                delay: Arc::new(NoDelay),
            }),
            metrics: SessionMetrics::new(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Replaces the archiver binding.
    pub fn with_command(self, command: ArchiveCommand) -> Self {
        self.map_inner(|inner| inner.command = command)
    }

    /// Replaces the post-chunk delay strategy.
    pub fn with_delay(self, delay: impl ChunkDelay) -> Self {
        self.map_inner(|inner| inner.delay = Arc::new(delay))
    }

    fn map_inner(self, f: impl FnOnce(&mut Inner)) -> Self {
        let mut inner = Inner::clone(&self.inner);
        f(&mut inner);

        Self {
            inner: Arc::new(inner),
            ..self
        }
    }

    /// Returns the directory holding one subdirectory per archive.
    #[inline]
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Returns the maximum size of a relayed chunk.
    #[inline]
    pub fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    /// Returns the archiver binding.
    #[inline]
    pub fn command(&self) -> &ArchiveCommand {
        &self.inner.command
    }

    /// Returns the post-chunk delay strategy.
    #[inline]
    pub(crate) fn delay(&self) -> &dyn ChunkDelay {
        self.inner.delay.as_ref()
    }

    /// Returns the session counters shared by all clones.
    #[inline]
    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Returns the backing directory of `archive_id` if it exists.
    ///
    /// Identifiers must be a single plain path component; anything that could
    /// escape the root (separators, `.` or `..`) is treated as missing.
    pub async fn resolve(&self, archive_id: &str) -> Option<PathBuf> {
        if !is_plain_identifier(archive_id) {
            tracing::debug!(
                target: TRACING_TARGET,
                archive_id = %archive_id,
                "rejected archive identifier"
            );
            return None;
        }

        let path = self.inner.root.join(archive_id);
        match fs::try_exists(&path).await {
            Ok(exists) => exists.then_some(path),
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET,
                    path = %path.display(),
                    error = %err,
                    "failed to check archive directory"
                );
                None
            }
        }
    }

    /// Spawns the archiver for a resolved `archive_id` and returns its output.
    ///
    /// Callers check the identifier with [`resolve`] first. Must be called
    /// from within a Tokio runtime.
    ///
    /// [`resolve`]: Self::resolve
    pub fn open(&self, archive_id: &str) -> Result<ArchiveStream> {
        let mut command = self.inner.command.command(&self.inner.root, archive_id);
        let child = command.spawn().map_err(|err| {
            Error::process(
                self.inner.command.program().display().to_string(),
                "failed to spawn archiver",
            )
            .with_source(err)
        })?;

        let guard = self.metrics.begin();
        tracing::info!(
            target: TRACING_TARGET,
            archive_id = %archive_id,
            pid = child.id(),
            mode = %self.inner.command.mode(),
            "archiver started"
        );

        let session = ArchiveSession::new(
            archive_id.to_owned(),
            child,
            self.inner.chunk_size,
            Arc::clone(&self.inner.delay),
            self.shutdown.child_token(),
            guard,
        )
        .map_err(|err| Error::internal("archive", "archiver pipes unavailable").with_source(err))?;

        let (sender, receiver) = mpsc::channel(1);
        tokio::spawn(session.run(sender).in_current_span());

        Ok(ArchiveStream::new(receiver))
    }

    /// Stops every running session and the ones opened afterwards.
    pub fn shutdown(&self) {
        tracing::info!(
            target: TRACING_TARGET,
            active_sessions = self.metrics.active(),
            "cancelling archive sessions"
        );
        self.shutdown.cancel();
    }
}

/// Returns whether `archive_id` names exactly one entry directly under the root.
fn is_plain_identifier(archive_id: &str) -> bool {
    if archive_id.contains(['/', '\\']) {
        return false;
    }

    let mut components = Path::new(archive_id).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use std::fmt::Write;
    use std::future::Future;
    use std::time::Duration;

    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::time;
    use tokio_stream::StreamExt;

    use super::*;

    /// Runs `script` with `sh -c` in place of the archiver.
    fn fake_archiver(script: &str) -> ArchiveCommand {
        ArchiveCommand::new("sh").with_leading_args(["-c", script, "zip"])
    }

    fn archive_root() -> anyhow::Result<TempDir> {
        let root = tempfile::tempdir()?;
        std::fs::create_dir(root.path().join("7kna"))?;
        std::fs::write(root.path().join("7kna/a.jpg"), b"first")?;
        Ok(root)
    }

    async fn eventually(condition: impl Fn() -> bool) -> bool {
        let poll = async {
            while !condition() {
                time::sleep(Duration::from_millis(10)).await;
            }
        };
        time::timeout(Duration::from_secs(5), poll).await.is_ok()
    }

    async fn collect(mut stream: ArchiveStream) -> anyhow::Result<Vec<Bytes>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk?);
        }
        Ok(chunks)
    }

    async fn with_timeout<F: Future>(future: F) -> F::Output {
        time::timeout(Duration::from_secs(10), future)
            .await
            .expect("archive session did not finish in time")
    }

    #[derive(Debug)]
    struct FixedDelay(Duration);

    impl ChunkDelay for FixedDelay {
        fn next_delay(&self) -> Option<Duration> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn resolve_finds_existing_directory() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), DEFAULT_CHUNK_SIZE);

        assert_eq!(service.resolve("7kna").await, Some(root.path().join("7kna")));
        assert_eq!(service.resolve("missing").await, None);
        Ok(())
    }

    #[tokio::test]
    async fn resolve_rejects_identifiers_escaping_root() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path().join("7kna"), DEFAULT_CHUNK_SIZE);

        // `..` exists as a directory entry but would archive the parent.
        for archive_id in ["..", ".", "", "../7kna", "7kna/..", "a\\b", "/etc"] {
            assert_eq!(service.resolve(archive_id).await, None, "{archive_id:?}");
        }
        Ok(())
    }

    #[tokio::test]
    async fn chunks_never_exceed_chunk_size() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), 1000)
            .with_command(fake_archiver("head -c 5000 /dev/zero"));

        let chunks = with_timeout(collect(service.open("7kna")?)).await?;

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|chunk| !chunk.is_empty() && chunk.len() <= 1000));
        assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), 5000);
        assert!(eventually(|| service.metrics().completed() == 1).await);
        Ok(())
    }

    #[tokio::test]
    async fn chunks_preserve_archiver_order() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service =
            ArchiveService::new(root.path(), 512).with_command(fake_archiver("seq 1 20000"));

        let chunks = with_timeout(collect(service.open("7kna")?)).await?;
        let body: Vec<u8> = chunks.concat();

        let mut expected = String::new();
        for n in 1..=20000 {
            writeln!(expected, "{n}")?;
        }
        assert_eq!(body, expected.as_bytes());
        Ok(())
    }

    #[tokio::test]
    async fn dropped_stream_reaps_archiver() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), 1024)
            .with_command(fake_archiver("exec cat /dev/zero"));

        let mut stream = service.open("7kna")?;
        let first = with_timeout(stream.next()).await;
        assert!(matches!(first, Some(Ok(chunk)) if !chunk.is_empty()));
        assert_eq!(service.metrics().active(), 1);

        drop(stream);

        assert!(eventually(|| service.metrics().active() == 0).await);
        assert_eq!(service.metrics().interrupted(), 1);
        assert_eq!(service.metrics().completed(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_stream_interrupts_pending_delay() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), 1024)
            .with_command(fake_archiver("exec cat /dev/zero"))
            .with_delay(FixedDelay(Duration::from_secs(3600)));

        let mut stream = service.open("7kna")?;
        assert!(with_timeout(stream.next()).await.is_some());
        drop(stream);

        assert!(eventually(|| service.metrics().active() == 0).await);
        assert_eq!(service.metrics().interrupted(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_ends_running_sessions() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), 1024)
            .with_command(fake_archiver("exec cat /dev/zero"));

        let stream = service.open("7kna")?;
        service.shutdown();

        // Whatever was already queued is delivered, then the stream ends.
        let chunks = with_timeout(collect(stream)).await?;
        assert!(chunks.len() <= 2);
        assert!(eventually(|| service.metrics().active() == 0).await);
        assert_eq!(service.metrics().interrupted(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn failing_archiver_keeps_partial_output() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), DEFAULT_CHUNK_SIZE).with_command(
            fake_archiver("printf partial; echo 'zip error: Nothing to do!' >&2; exit 12"),
        );

        let chunks = with_timeout(collect(service.open("7kna")?)).await?;

        assert_eq!(chunks.concat(), b"partial");
        assert!(eventually(|| service.metrics().failed() == 1).await);
        assert_eq!(service.metrics().active(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn archiver_lingering_after_output_is_killed() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), DEFAULT_CHUNK_SIZE)
            .with_command(fake_archiver("printf x; exec >&-; exec sleep 100"));
        let deadline = session::EXIT_GRACE_PERIOD + Duration::from_secs(5);
        let started = time::Instant::now();

        let chunks = time::timeout(deadline, collect(service.open("7kna")?)).await??;
        assert_eq!(chunks.concat(), b"x");

        let reaped = async {
            while service.metrics().active() != 0 {
                time::sleep(Duration::from_millis(10)).await;
            }
        };
        time::timeout(deadline.saturating_sub(started.elapsed()), reaped).await?;

        assert!(started.elapsed() >= session::EXIT_GRACE_PERIOD);
        assert_eq!(service.metrics().failed(), 1);
        assert_eq!(service.metrics().completed(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn chatty_archiver_does_not_block_on_stderr() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), DEFAULT_CHUNK_SIZE).with_command(
            fake_archiver("head -c 1000000 /dev/zero >&2; printf done"),
        );

        let chunks = with_timeout(collect(service.open("7kna")?)).await?;

        assert_eq!(chunks.concat(), b"done");
        assert!(eventually(|| service.metrics().completed() == 1).await);
        Ok(())
    }

    #[tokio::test]
    async fn missing_archiver_fails_before_spawning() -> anyhow::Result<()> {
        let root = archive_root()?;
        let service = ArchiveService::new(root.path(), DEFAULT_CHUNK_SIZE)
            .with_command(ArchiveCommand::new("/nonexistent/zipstream-archiver"));

        let error = service.open("7kna").expect_err("spawn must fail");

        assert_eq!(error.kind(), crate::ErrorKind::Process);
        assert_eq!(service.metrics().started(), 0);
        Ok(())
    }
}
