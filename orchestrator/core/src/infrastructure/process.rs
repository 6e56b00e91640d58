// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent subprocess plumbing: start, supervise with a deadline and a
//! cancellation token, capture bounded output, kill.
//!
//! Output is drained concurrently while the child runs so a chatty agent
//! cannot deadlock on a full pipe. Bytes beyond the limit are discarded but
//! still read.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cap on stored stdout.
pub const OUTPUT_LIMIT_BYTES: usize = 1024 * 1024;

/// Cap on stored stderr; only the tail is kept for error messages.
pub const STDERR_LIMIT_BYTES: usize = 64 * 1024;

/// How long output readers may run once the process has exited.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Killable handle to a running agent, stored in the coordinator's runtime
/// map. `kill` is idempotent and a no-op once the child has been reaped.
#[derive(Debug, Clone)]
pub struct OsProcessHandle {
    pid: Option<i32>,
    exited: Arc<AtomicBool>,
    killed: Arc<AtomicBool>,
}

impl OsProcessHandle {
    fn new(pid: Option<i32>) -> Self {
        Self {
            pid,
            exited: Arc::new(AtomicBool::new(false)),
            killed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// SIGKILL the agent's process group.
    pub fn kill(&self) -> io::Result<()> {
        let Some(pid) = self.pid else {
            return Ok(());
        };
        if self.has_exited() || self.killed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        signal_kill(pid)
    }

    fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

#[cfg(unix)]
fn signal_kill(pid: i32) -> io::Result<()> {
    // SAFETY: plain syscalls on a pid we spawned; the group id equals the pid
    // because the child was started with `process_group(0)`.
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let rc = unsafe { libc::kill(pid, libc::SIGKILL) };
    if rc == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(err)
}

#[cfg(not(unix))]
fn signal_kill(_pid: i32) -> io::Result<()> {
    Ok(())
}

/// SIGKILL whatever is left of the group after its leader exited.
#[cfg(unix)]
fn kill_group(pid: i32) {
    // SAFETY: see `signal_kill`.
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            debug!(pid, error = %err, "failed to signal leftover process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: i32) {}

/// A started agent subprocess.
pub struct RunningProcess {
    pub child: Child,
    pub handle: OsProcessHandle,
}

/// Spawn `cmd` with piped output, null stdin and its own process group.
pub fn start(mut cmd: Command) -> io::Result<RunningProcess> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn()?;
    let pid = child.id().and_then(|p| i32::try_from(p).ok());
    debug!(?pid, "spawned agent subprocess");
    Ok(RunningProcess {
        child,
        handle: OsProcessHandle::new(pid),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    Exited,
    TimedOut,
    Cancelled,
}

#[derive(Debug)]
pub struct ProcessOutcome {
    pub kind: ExitKind,
    pub status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
    pub stdout_truncated: usize,
}

impl ProcessOutcome {
    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }

    pub fn succeeded(&self) -> bool {
        self.kind == ExitKind::Exited && self.status.is_some_and(|s| s.success())
    }

    /// Last `max` characters of stderr, trimmed.
    pub fn stderr_tail(&self, max: usize) -> String {
        let trimmed = self.stderr.trim();
        let count = trimmed.chars().count();
        if count <= max {
            return trimmed.to_string();
        }
        trimmed.chars().skip(count - max).collect()
    }
}

/// Wait for the child to exit, its deadline to pass or `cancel` to fire.
/// On deadline or cancellation the process group is killed and reaped.
pub async fn supervise(
    running: RunningProcess,
    timeout: Duration,
    cancel: CancellationToken,
    output_limit_bytes: usize,
) -> io::Result<ProcessOutcome> {
    let RunningProcess { mut child, handle } = running;

    let stdout_task = child
        .stdout
        .take()
        .map(|out| tokio::spawn(read_limited(out, output_limit_bytes)));
    let stderr_task = child
        .stderr
        .take()
        .map(|err| tokio::spawn(read_limited(err, STDERR_LIMIT_BYTES)));

    let (kind, status) = tokio::select! {
        status = child.wait() => {
            let status = status?;
            // Descendants left behind would hold the output pipes open.
            if let Some(pid) = handle.pid() {
                kill_group(pid);
            }
            (ExitKind::Exited, Some(status))
        }
        _ = tokio::time::sleep(timeout) => {
            warn!(timeout_secs = timeout.as_secs(), pid = ?handle.pid(), "agent timed out, killing");
            (ExitKind::TimedOut, reap(&mut child, &handle).await)
        }
        _ = cancel.cancelled() => {
            debug!(pid = ?handle.pid(), "agent cancelled, killing");
            (ExitKind::Cancelled, reap(&mut child, &handle).await)
        }
    };
    handle.mark_exited();

    let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    let (stdout, stdout_truncated) = join_output(stdout_task, drain_deadline).await;
    let (stderr, _) = join_output(stderr_task, drain_deadline).await;
    if stdout_truncated > 0 {
        warn!(stdout_truncated, "agent output truncated");
    }

    Ok(ProcessOutcome {
        kind,
        status,
        stdout,
        stderr,
        stdout_truncated,
    })
}

async fn reap(child: &mut Child, handle: &OsProcessHandle) -> Option<ExitStatus> {
    if let Err(e) = handle.kill() {
        warn!(error = %e, "failed to signal agent process group");
    }
    if let Err(e) = child.start_kill() {
        debug!(error = %e, "start_kill after group kill");
    }
    child.wait().await.ok()
}

async fn join_output(task: Option<JoinHandle<io::Result<(Vec<u8>, usize)>>>, deadline: Instant) -> (String, usize) {
    let Some(mut task) = task else {
        return (String::new(), 0);
    };
    let joined = match tokio::time::timeout_at(deadline, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            warn!("agent output pipe still open after exit; abandoning reader");
            task.abort();
            return (String::new(), 0);
        }
    };
    match joined {
        Ok(Ok((bytes, truncated))) => (String::from_utf8_lossy(&bytes).into_owned(), truncated),
        Ok(Err(e)) => {
            warn!(error = %e, "failed to read agent output");
            (String::new(), 0)
        }
        Err(e) => {
            warn!(error = %e, "output reader task failed");
            (String::new(), 0)
        }
    }
}

async fn read_limited<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> io::Result<(Vec<u8>, usize)> {
    let mut kept = Vec::new();
    let mut truncated = 0usize;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        let take = room.min(n);
        kept.extend_from_slice(&buf[..take]);
        truncated += n - take;
    }
    Ok((kept, truncated))
}
