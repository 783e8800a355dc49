//! Child process execution with captured output and a deadline.
//!
//! Stdout and stderr are drained on helper threads so a child that writes a
//! lot can never block on a full pipe while we poll for its exit.

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Output of a finished child.
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    /// Stdout followed by stderr, for error reports.
    pub fn combined(&self) -> String {
        combine(&self.stdout, &self.stderr)
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to start: {0}")]
    Spawn(#[source] io::Error),
    #[error("failed waiting for exit: {0}")]
    Wait(#[source] io::Error),
    #[error("timed out after {}s", .after.as_secs())]
    TimedOut {
        after: Duration,
        stdout: String,
        stderr: String,
    },
}

impl RunError {
    /// Whatever the child wrote before it was killed; empty otherwise.
    pub fn captured(&self) -> String {
        match self {
            RunError::TimedOut { stdout, stderr, .. } => combine(stdout, stderr),
            RunError::Spawn(_) | RunError::Wait(_) => String::new(),
        }
    }
}

/// How long to keep reading pipes after the child is gone. Grandchildren that
/// inherited stdout or stderr can hold them open indefinitely.
const PIPE_GRACE: Duration = Duration::from_secs(2);

/// Kills and reaps the child (and its process group) unless it already exited.
struct ChildGuard(Child);

impl ChildGuard {
    fn kill(&mut self) {
        kill_process_group(&self.0);
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if let Ok(Some(_)) = self.0.try_wait() {
            return;
        }
        self.kill();
    }
}

/// The child leads its own group (see `run_with_deadline`), so this also
/// reaches anything it forked.
#[cfg(unix)]
fn kill_process_group(child: &Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // SAFETY: plain syscall; a stale or foreign id only yields ESRCH/EPERM.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

/// A pipe being read on a helper thread into a shared buffer.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: JoinHandle<()>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(mut reader: R) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => match sink.lock() {
                        Ok(mut b) => b.extend_from_slice(&chunk[..n]),
                        Err(poisoned) => poisoned.into_inner().extend_from_slice(&chunk[..n]),
                    },
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });
        Self { buf, handle }
    }

    /// Waits for EOF until `until`, then returns whatever was read. A thread
    /// still blocked on a pipe held open by a grandchild is left behind.
    fn finish(self, until: Instant) -> String {
        while !self.handle.is_finished() && Instant::now() < until {
            thread::sleep(POLL_INTERVAL);
        }
        if self.handle.is_finished() {
            let _ = self.handle.join();
        }
        let bytes = match self.buf.lock() {
            Ok(b) => b.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

fn finish_lossy(drain: Option<Drain>, until: Instant) -> String {
    drain.map(|d| d.finish(until)).unwrap_or_default()
}

fn combine(stdout: &str, stderr: &str) -> String {
    match (stdout.is_empty(), stderr.is_empty()) {
        (true, _) => stderr.to_string(),
        (false, true) => stdout.to_string(),
        (false, false) => format!("{}\n{}", stdout.trim_end(), stderr),
    }
}

/// Runs `cmd` to completion, killing it if `timeout` elapses first.
///
/// Stdin is closed; stdout and stderr are captured. On Unix the child gets its
/// own process group and the whole group is killed on timeout. A non-zero exit
/// status is not an error here; callers decide what it means.
pub fn run_with_deadline(cmd: &mut Command, timeout: Duration) -> Result<CapturedOutput, RunError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = ChildGuard(cmd.spawn().map_err(RunError::Spawn)?);
    let stdout = child.0.stdout.take().map(Drain::start);
    let stderr = child.0.stderr.take().map(Drain::start);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.0.try_wait().map_err(RunError::Wait)? {
            Some(status) => break Some(status),
            None if Instant::now() >= deadline => break None,
            None => thread::sleep(POLL_INTERVAL),
        }
    };

    match status {
        Some(status) => {
            let until = Instant::now() + PIPE_GRACE;
            Ok(CapturedOutput {
                status,
                stdout: finish_lossy(stdout, until),
                stderr: finish_lossy(stderr, until),
            })
        }
        None => {
            // Kill before reading so the pipes close.
            child.kill();
            let until = Instant::now() + PIPE_GRACE;
            Err(RunError::TimedOut {
                after: timeout,
                stdout: finish_lossy(stdout, until),
                stderr: finish_lossy(stderr, until),
            })
        }
    }
}
