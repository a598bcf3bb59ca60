// Process execution engine.
//
// Runs one invocation recipe against one test case's stdin under a wall
// clock deadline, capturing stdout, stderr and the exit status. Every
// failure mode is folded into the returned record: the runner itself never
// returns an error.

use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{interval, sleep};
use tracing::{debug, warn};

use arbiter_common::types::{EXIT_SPAWN_FAILED, EXIT_TIMED_OUT};

use crate::toolchain::InvocationRecipe;

/// How often the child's peak RSS is sampled from /proc while it runs.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(20);

/// Diagnostic line guaranteed to appear in stderr for a timed-out run,
/// even when the process wrote nothing to stderr itself.
pub const TIMEOUT_DIAGNOSTIC: &str = "Execution timed out.";

/// Exit classification for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitKind {
    /// The process ran to completion. Signal deaths are mapped to the
    /// shell convention 128 + signal number.
    Code(i32),
    /// Killed by the wall-clock deadline.
    TimedOut,
    /// The executable never started.
    SpawnFailed(String),
}

impl ExitKind {
    /// Collapse the classification into the wire exit code.
    pub fn code(&self) -> i32 {
        match self {
            ExitKind::Code(code) => *code,
            ExitKind::TimedOut => EXIT_TIMED_OUT,
            ExitKind::SpawnFailed(_) => EXIT_SPAWN_FAILED,
        }
    }
}

/// Raw captured output of one run. Whatever was written before a timeout
/// kill is retained.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub stdout: String,
    /// stderr split into non-empty lines, in order. For a timed-out run the
    /// last line is always [`TIMEOUT_DIAGNOSTIC`].
    pub stderr_lines: Vec<String>,
    pub exit: ExitKind,
    /// Wall-clock time from spawn to termination.
    pub duration_ms: u64,
    /// Best-effort peak resident set of the child (VmHWM), in kB. `None`
    /// when no sample could be taken, never a fabricated zero.
    pub peak_rss_kb: Option<u64>,
}

/// Run one invocation recipe to completion or deadline.
///
/// The entire `stdin_data` is fed to the child and the pipe closed so the
/// child sees EOF. On deadline expiry the child's whole process group is
/// killed, catching forked children.
pub async fn run_command(
    recipe: &InvocationRecipe,
    stdin_data: &str,
    dir: &Path,
    timeout: Duration,
) -> RunOutput {
    let started = Instant::now();

    let mut child = match Command::new(&recipe.program)
        .args(&recipe.args)
        .current_dir(dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            warn!(program = %recipe.program, error = %e, "failed to spawn process");
            return RunOutput {
                stdout: String::new(),
                stderr_lines: vec![format!("Failed to start process: {e}")],
                exit: ExitKind::SpawnFailed(e.to_string()),
                duration_ms: started.elapsed().as_millis() as u64,
                peak_rss_kb: None,
            };
        }
    };

    let pid = child.id();

    // Feed stdin from a task: a child that never reads must not block the
    // deadline loop on a full pipe buffer. Broken pipe just means the child
    // exited without consuming its input.
    if let Some(mut handle) = child.stdin.take() {
        let payload = stdin_data.as_bytes().to_vec();
        tokio::spawn(async move {
            if handle.write_all(&payload).await.is_ok() {
                let _ = handle.shutdown().await;
            }
        });
    }

    // Drain both output pipes concurrently so neither can deadlock the
    // child on a full buffer.
    let stdout_task = child.stdout.take().map(|pipe| tokio::spawn(drain(pipe)));
    let stderr_task = child.stderr.take().map(|pipe| tokio::spawn(drain(pipe)));

    let deadline = sleep(timeout);
    tokio::pin!(deadline);
    let mut sampler = interval(MEMORY_SAMPLE_INTERVAL);
    let mut peak_rss_kb: Option<u64> = None;

    let exit = loop {
        tokio::select! {
            status = child.wait() => {
                // The direct child is done; reap any stray group members it
                // forked so the output pipes close and the drain tasks
                // cannot hang on them.
                kill_process_group(pid);
                match status {
                    Ok(status) => break ExitKind::Code(exit_code_of(status)),
                    Err(e) => break ExitKind::SpawnFailed(e.to_string()),
                }
            }
            _ = &mut deadline => {
                debug!(program = %recipe.program, timeout_ms = timeout.as_millis() as u64, "deadline expired, killing process group");
                kill_process_group(pid);
                // Reap so the pipes close and the drain tasks see EOF.
                let _ = child.wait().await;
                break ExitKind::TimedOut;
            }
            _ = sampler.tick() => {
                if let Some(sample) = sample_peak_rss(pid) {
                    peak_rss_kb = Some(peak_rss_kb.map_or(sample, |peak| peak.max(sample)));
                }
            }
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;

    let stdout_bytes = match stdout_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };
    let stderr_bytes = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => Vec::new(),
    };

    let stdout = String::from_utf8_lossy(&stdout_bytes).into_owned();
    let mut stderr_lines: Vec<String> = String::from_utf8_lossy(&stderr_bytes)
        .lines()
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if exit == ExitKind::TimedOut {
        stderr_lines.push(TIMEOUT_DIAGNOSTIC.to_string());
    }

    RunOutput {
        stdout,
        stderr_lines,
        exit,
        duration_ms,
        peak_rss_kb,
    }
}

async fn drain<R: AsyncReadExt + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

/// SIGKILL the child's whole process group. The child was spawned as its
/// own group leader, so the negative pid catches anything it forked.
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

/// Best-effort read of the child's peak resident set (VmHWM, kB).
fn sample_peak_rss(pid: Option<u32>) -> Option<u64> {
    let pid = pid?;
    let status = std::fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    let line = status.lines().find(|line| line.starts_with("VmHWM:"))?;
    line.split_whitespace().nth(1)?.parse().ok()
}
