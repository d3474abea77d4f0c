//! Child process management for script runs.
//!
//! Two modes share the same spawn setup (see [`ShellCommand::to_command`]):
//!
//! - [`run_collect`] waits for completion and returns stdout and stderr as
//!   two independent buffers.
//! - [`stream_lines`] hands the child one pipe for both stdout and stderr and
//!   yields merged output one line at a time.
//!
//! Every child runs as the leader of its own process group. Dropping a run
//! before the child has been reaped (client disconnect, timeout, handler
//! cancellation) sends `SIGKILL` to the whole group so nothing the script
//! started is left behind.

use std::io;
use std::os::fd::OwnedFd;
use std::process::Stdio;
use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::Child;

use crate::error::{CoreError, CoreResult};

use super::executor::{CollectedOutput, OutputEvent};
use super::shell::ShellCommand;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Ordered, merged output of a running script. Ends after the child exits.
pub type OutputStream = BoxStream<'static, OutputEvent>;

/// Kills a child's process group on drop unless disarmed.
///
/// Disarm only after the child has been reaped.
struct ProcessGroupGuard {
    pgid: Option<libc::pid_t>,
}

impl ProcessGroupGuard {
    fn new(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|id| id as libc::pid_t),
        }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        // SAFETY: killpg has no memory-safety preconditions. `pgid` is the
        // group of a child we spawned with `process_group(0)`; the guard is
        // disarmed once that group has been waited on and drained.
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc == 0 {
            tracing::debug!(pgid, "Killed script process group");
        } else {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!(pgid, error = %err, "Failed to kill script process group");
            }
        }
    }
}

fn spawn(command: &ShellCommand, cmd: &mut tokio::process::Command) -> CoreResult<Child> {
    cmd.spawn().map_err(|source| {
        tracing::error!(program = %command.program(), error = %source, "Failed to spawn script");
        CoreError::SpawnFailed {
            program: command.program(),
            source,
        }
    })
}

/// Spawn `command`, wait for it, and capture stdout and stderr separately.
///
/// A non-zero exit is returned as data. Only spawn failure, wait failure
/// or an expired `timeout` produce an error. The timeout covers the whole
/// run, including draining pipes still held open by background children;
/// on expiry the process group is killed.
pub async fn run_collect(
    command: &ShellCommand,
    timeout: Option<Duration>,
) -> CoreResult<CollectedOutput> {
    let mut cmd = command.to_command();
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let program = command.program();
    let start = Instant::now();
    let mut child = spawn(command, &mut cmd)?;
    let mut guard = ProcessGroupGuard::new(&child);

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let run = async {
        // Read both pipes alongside the wait so a chatty stream cannot block
        // the child.
        let (status, stdout, stderr) = tokio::join!(
            child.wait(),
            read_stream(stdout, &program, "stdout"),
            read_stream(stderr, &program, "stderr"),
        );
        status.map(|status| (status, stdout, stderr))
    };

    let (status, stdout_bytes, stderr_bytes) = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(result) => result?,
            Err(_elapsed) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                tracing::warn!(%program, elapsed_ms, "Script timed out, killing");
                return Err(CoreError::Timeout { elapsed_ms });
            }
        },
        None => run.await?,
    };
    guard.disarm();

    Ok(CollectedOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

/// Read an output stream to EOF, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// Output past the cap is read and discarded so the writer never sees a
/// closed pipe.
async fn read_stream<R: AsyncRead + Unpin>(
    handle: Option<R>,
    program: &str,
    stream: &'static str,
) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut h) = handle else {
        return buf;
    };

    if let Err(e) = (&mut h)
        .take(MAX_OUTPUT_BYTES as u64)
        .read_to_end(&mut buf)
        .await
    {
        tracing::warn!(%program, stream, error = %e, "Error reading script output");
        return buf;
    }

    if buf.len() >= MAX_OUTPUT_BYTES {
        match tokio::io::copy(&mut h, &mut tokio::io::sink()).await {
            Ok(0) => {}
            Ok(dropped) => {
                tracing::warn!(%program, stream, dropped, "Script output truncated")
            }
            Err(e) => {
                tracing::warn!(%program, stream, error = %e, "Error draining script output")
            }
        }
    }
    buf
}

/// Spawn `command` with stdout and stderr merged and stream its output.
///
/// Each item is one line; the stream ends only after the pipe reaches EOF
/// and the child has been waited on. Dropping the stream early kills the
/// process group. Must be called from within a tokio runtime.
pub fn stream_lines(command: &ShellCommand) -> CoreResult<OutputStream> {
    let (reader, writer) = io::pipe()?;

    // The command keeps its copies of the write end until dropped, so it
    // must not outlive this block or EOF would never be observed.
    let child = {
        let mut cmd = command.to_command();
        let stderr_writer = writer.try_clone()?;
        cmd.stdout(Stdio::from(writer))
            .stderr(Stdio::from(stderr_writer));
        spawn(command, &mut cmd)?
    };
    let guard = ProcessGroupGuard::new(&child);
    let receiver = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;

    tracing::debug!(program = %command.program(), pid = ?child.id(), "Streaming script output");

    let state = LineReader {
        reader: BufReader::new(receiver),
        child,
        guard,
        program: command.program(),
        lines: 0,
    };

    Ok(stream::unfold(state, |mut state| async move {
        match state.next_event().await {
            Some(event) => Some((event, state)),
            None => {
                state.finish().await;
                None
            }
        }
    })
    .boxed())
}

struct LineReader {
    reader: BufReader<pipe::Receiver>,
    child: Child,
    guard: ProcessGroupGuard,
    program: String,
    lines: u64,
}

impl LineReader {
    async fn next_event(&mut self) -> Option<OutputEvent> {
        let mut buf = Vec::new();
        match self.reader.read_until(b'\n', &mut buf).await {
            Ok(0) => None,
            Ok(_) => {
                self.lines += 1;
                Some(OutputEvent::from_bytes(&buf))
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Error reading script output");
                None
            }
        }
    }

    /// Wait for the child after EOF so the stream never ends while it runs.
    async fn finish(mut self) {
        match self.child.wait().await {
            Ok(status) => {
                self.guard.disarm();
                tracing::info!(
                    program = %self.program,
                    exit_code = status.code().unwrap_or(-1),
                    lines = self.lines,
                    "Streamed script exited"
                );
            }
            Err(e) => {
                tracing::warn!(program = %self.program, error = %e, "Failed to wait for streamed script");
            }
        }
    }
}
