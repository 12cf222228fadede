//! `pg_dump` process runner.

use async_trait::async_trait;
use std::future::Future;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::process::Stdio;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ConnectionParams, DumpError, DumpProducer};
use crate::storage::ByteSource;

/// First bytes of every custom-format (`-Fc`) dump.
pub const PGDUMP_MAGIC: &[u8] = b"PGDMP";

/// Longest stderr excerpt kept in error messages.
const STDERR_LIMIT: usize = 4096;

/// Tail of the process's stderr, collected in the background.
type StderrTail = JoinHandle<Vec<u8>>;

/// Runs `<pgdump_path>/pg_dump -Fc -Z1` and streams its output.
///
/// Connection settings are passed through the standard `PG*` environment
/// variables so the password never appears on the command line.
#[derive(Debug, Clone, Default)]
pub struct PgDumpProducer;

impl PgDumpProducer {
    pub fn new() -> Self {
        Self
    }

    fn command(&self, params: &ConnectionParams) -> Command {
        let program = params.pgdump_path.join("pg_dump");
        let mut command = Command::new(&program);
        command
            .arg("-Fc")
            .arg("-Z1")
            .args(&params.extra_args)
            .env("PGDATABASE", &params.database)
            .env("PGPORT", params.port.to_string())
            .env("PGCONNECT_TIMEOUT", params.connect_timeout.as_secs().to_string())
            .env("LD_LIBRARY_PATH", &params.pgdump_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(host) = &params.host {
            command.env("PGHOST", host);
        }
        if let Some(user) = &params.user {
            command.env("PGUSER", user);
        }
        if let Some(password) = &params.password {
            command.env("PGPASSWORD", password.expose_secret());
        }

        command
    }
}

#[async_trait]
impl DumpProducer for PgDumpProducer {
    async fn start(&self, params: &ConnectionParams) -> Result<ByteSource, DumpError> {
        let mut command = self.command(params);
        let program = params.pgdump_path.join("pg_dump").display().to_string();
        debug!(program = %program, args = ?params.extra_args, "Spawning pg_dump");

        let mut child = command.spawn().map_err(|source| DumpError::Spawn { program, source })?;

        let mut stdout =
            child.stdout.take().ok_or_else(|| DumpError::other("pg_dump stdout was not captured"))?;
        let stderr =
            child.stderr.take().ok_or_else(|| DumpError::other("pg_dump stderr was not captured"))?;
        // pg_dump may write more than a pipe buffer of stderr before its first
        // stdout byte, so stderr is drained from the start.
        let stderr = tokio::spawn(collect_stderr_tail(stderr));

        let mut header = Vec::with_capacity(PGDUMP_MAGIC.len());
        (&mut stdout)
            .take(PGDUMP_MAGIC.len() as u64)
            .read_to_end(&mut header)
            .await
            .map_err(DumpError::Io)?;

        if header.is_empty() {
            let report = wait_for_exit(&mut child, stderr).await;
            return Err(DumpError::EarlyExit { status: report.status, stderr: report.stderr });
        }

        if header != PGDUMP_MAGIC {
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill pg_dump after unexpected output");
            }
            return Err(DumpError::UnexpectedOutput {
                found: String::from_utf8_lossy(&header).into_owned(),
            });
        }

        info!(database = %params.database, "pg_dump process started");

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(supervise(child, stderr, cancel_rx, exit_tx));

        Ok(Box::pin(DumpStream {
            inner: Box::pin(Cursor::new(header).chain(stdout)),
            exit: exit_rx,
            _cancel: cancel_tx,
            finished: false,
        }))
    }
}

#[derive(Debug)]
struct ExitReport {
    success: bool,
    status: String,
    stderr: String,
}

/// Read `stderr` to the end, keeping only the last [`STDERR_LIMIT`] bytes.
async fn collect_stderr_tail<R: AsyncRead + Unpin>(mut stderr: R) -> Vec<u8> {
    let mut tail = Vec::with_capacity(STDERR_LIMIT);
    let mut chunk = [0u8; 1024];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > STDERR_LIMIT {
                    let excess = tail.len() - STDERR_LIMIT;
                    tail.drain(..excess);
                }
            }
            Err(e) => {
                debug!(error = %e, "Failed to read pg_dump stderr");
                break;
            }
        }
    }
    tail
}

async fn wait_for_exit(child: &mut Child, stderr: StderrTail) -> ExitReport {
    let status = child.wait().await;
    let captured = stderr.await.unwrap_or_else(|e| {
        debug!(error = %e, "pg_dump stderr reader stopped");
        Vec::new()
    });

    match status {
        Ok(status) => ExitReport {
            success: status.success(),
            status: status.to_string(),
            stderr: stderr_excerpt(&captured),
        },
        Err(e) => ExitReport {
            success: false,
            status: format!("wait failed: {}", e),
            stderr: stderr_excerpt(&captured),
        },
    }
}

/// Waits for the child to exit and reports the outcome, or kills it when
/// the stream is dropped first.
async fn supervise(
    mut child: Child,
    stderr: StderrTail,
    cancel: oneshot::Receiver<()>,
    exit: oneshot::Sender<ExitReport>,
) {
    let report = tokio::select! {
        report = wait_for_exit(&mut child, stderr) => Some(report),
        _ = cancel => None,
    };

    match report {
        Some(report) => {
            if report.success {
                debug!(status = %report.status, "pg_dump exited");
            } else {
                warn!(status = %report.status, stderr = %report.stderr, "pg_dump failed");
            }
            let _ = exit.send(report);
        }
        None => {
            debug!("Dump stream dropped before pg_dump exited, killing process");
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to kill pg_dump");
            }
        }
    }
}

fn stderr_excerpt(bytes: &[u8]) -> String {
    let start = bytes.len().saturating_sub(STDERR_LIMIT);
    let text = String::from_utf8_lossy(&bytes[start..]).trim().to_string();
    if text.is_empty() {
        "no error output".to_string()
    } else {
        text
    }
}

/// pg_dump output, with the already consumed header put back in front.
/// End of stream is only reported once the process has exited successfully.
struct DumpStream {
    inner: ByteSource,
    exit: oneshot::Receiver<ExitReport>,
    // dropping this tells the supervisor to kill the process
    _cancel: oneshot::Sender<()>,
    finished: bool,
}

impl AsyncRead for DumpStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(this.inner.as_mut().poll_read(cx, buf)).map_err(|e| DumpError::Io(e).into_io())?;
        if buf.filled().len() > before || buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let report = ready!(Pin::new(&mut this.exit).poll(cx));
        this.finished = true;
        match report {
            Ok(report) if report.success => Poll::Ready(Ok(())),
            Ok(report) => Poll::Ready(Err(DumpError::Failed {
                status: report.status,
                stderr: report.stderr,
            }
            .into_io())),
            Err(_) => Poll::Ready(Err(DumpError::other(
                "pg_dump supervisor stopped without reporting an exit status",
            )
            .into_io())),
        }
    }
}
