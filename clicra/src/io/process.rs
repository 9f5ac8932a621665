//! Helpers for running child processes with bounded, concurrently drained output.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// How often a waiting child is checked for operator interrupts.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Shared interrupt state, driven by the Ctrl-C handler.
///
/// While armed (an artifact is running) an interrupt only sets the flag so
/// the child can be killed and reported. Unarmed interrupts are left to the
/// handler, which terminates the process.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<CancelState>);

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    armed: AtomicBool,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_armed(&self) -> bool {
        self.0.armed.load(Ordering::SeqCst)
    }

    /// Arm until the returned guard drops.
    pub fn arm(&self) -> ArmGuard<'_> {
        self.0.armed.store(true, Ordering::SeqCst);
        ArmGuard(self)
    }
}

pub struct ArmGuard<'a>(&'a CancelToken);

impl Drop for ArmGuard<'_> {
    fn drop(&mut self) {
        self.0.0.armed.store(false, Ordering::SeqCst);
    }
}

/// Where to mirror child output while it is being captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    /// Capture only.
    Quiet,
    /// Also write stdout/stderr through to the terminal as they arrive.
    Terminal,
}

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    /// The child was killed because the operator interrupted it.
    pub interrupted: bool,
}

impl CommandOutput {
    /// Exit code, with signal deaths mapped to the shell's `128 + signo` convention.
    pub fn exit_code(&self) -> i32 {
        exit_code(self.status)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(unix)]
fn killed_by_sigint(status: ExitStatus) -> bool {
    use std::os::unix::process::ExitStatusExt;
    const SIGINT: i32 = 2;
    status.signal() == Some(SIGINT)
}

#[cfg(not(unix))]
fn killed_by_sigint(_status: ExitStatus) -> bool {
    false
}

/// Build a `Command` that runs `script` through `shell -c`.
pub fn shell_command(shell: &str, script: &str) -> Command {
    let mut cmd = Command::new(shell);
    cmd.arg("-c").arg(script);
    cmd
}

/// Run a command to completion and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// There is no timeout: the only way to stop the child early is `cancel`, which kills it and
/// marks the output as interrupted.
#[instrument(skip_all, fields(output_limit_bytes, echo = ?echo))]
pub fn run_command(
    mut cmd: Command,
    output_limit_bytes: usize,
    echo: Echo,
    cancel: &CancelToken,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let (stdout_tee, stderr_tee) = match echo {
        Echo::Quiet => (None, None),
        Echo::Terminal => (Some(Stream::Stdout), Some(Stream::Stderr)),
    };
    let stdout_handle =
        thread::spawn(move || read_stream_limited(stdout, output_limit_bytes, stdout_tee));
    let stderr_handle =
        thread::spawn(move || read_stream_limited(stderr, output_limit_bytes, stderr_tee));

    let (status, interrupted) = loop {
        if cancel.is_cancelled() {
            warn!("interrupted, killing child");
            if let Err(e) = child.kill() {
                debug!(err = %e, "kill failed; child likely already exited");
            }
            break (child.wait().context("wait command after kill")?, true);
        }
        if let Some(status) = child
            .wait_timeout(POLL_INTERVAL)
            .context("wait for command")?
        {
            // Ctrl-C reaches the whole process group, so the child may die of
            // SIGINT before the handler thread sets the flag.
            let interrupted =
                cancel.is_cancelled() || (cancel.is_armed() && killed_by_sigint(status));
            break (status, interrupted);
        }
    };

    if interrupted {
        // Grandchildren may still hold the pipes open; the readers are left to
        // finish on their own since interrupted output is discarded anyway.
        debug!(exit_code = ?status.code(), "command interrupted");
        return Ok(CommandOutput {
            status,
            stdout: Vec::new(),
            stderr: Vec::new(),
            stdout_truncated: 0,
            stderr_truncated: 0,
            interrupted,
        });
    }

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        interrupted: false,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn write_through(self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Stdout => {
                let mut out = std::io::stdout().lock();
                out.write_all(bytes)?;
                out.flush()
            }
            Stream::Stderr => {
                let mut err = std::io::stderr().lock();
                err.write_all(bytes)?;
                err.flush()
            }
        }
    }
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    tee: Option<Stream>,
) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        if let Some(stream) = tee
            && let Err(e) = stream.write_through(&chunk[..n])
        {
            warn!(err = %e, "failed to echo child output");
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_stderr_separately() {
        let cmd = shell_command("bash", "echo out; echo err >&2; exit 3");
        let output = run_command(cmd, 1000, Echo::Quiet, &CancelToken::new()).expect("run");
        assert_eq!(output.exit_code(), 3);
        assert_eq!(output.stdout_lossy(), "out\n");
        assert_eq!(output.stderr_lossy(), "err\n");
        assert!(!output.interrupted);
    }

    #[test]
    fn output_beyond_limit_is_counted_not_kept() {
        let cmd = shell_command("bash", "printf 'abcdefghij'");
        let output = run_command(cmd, 4, Echo::Quiet, &CancelToken::new()).expect("run");
        assert_eq!(output.stdout, b"abcd");
        assert_eq!(output.stdout_truncated, 6);
    }

    #[test]
    fn cancelled_token_kills_child() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let cmd = shell_command("bash", "sleep 30");
        let output = run_command(cmd, 1000, Echo::Quiet, &cancel).expect("run");
        assert!(output.interrupted);
        assert!(!output.status.success());
    }

    #[cfg(unix)]
    #[test]
    fn sigint_death_while_armed_is_an_interrupt() {
        let cancel = CancelToken::new();
        let _armed = cancel.arm();
        let cmd = shell_command("bash", "kill -INT $$; sleep 5");
        let output = run_command(cmd, 1000, Echo::Quiet, &cancel).expect("run");
        assert!(output.interrupted);
    }

    #[cfg(unix)]
    #[test]
    fn sigint_death_while_unarmed_is_a_plain_exit() {
        let cmd = shell_command("bash", "kill -INT $$; sleep 5");
        let output = run_command(cmd, 1000, Echo::Quiet, &CancelToken::new()).expect("run");
        assert!(!output.interrupted);
        assert_eq!(output.exit_code(), 130);
    }

    #[test]
    fn arm_guard_disarms_on_drop() {
        let cancel = CancelToken::new();
        {
            let _armed = cancel.arm();
            assert!(cancel.is_armed());
        }
        assert!(!cancel.is_armed());
    }

    #[test]
    fn spawn_failure_is_an_error() {
        let cmd = Command::new("/nonexistent/clicra-shell");
        let err = run_command(cmd, 1000, Echo::Quiet, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("spawn command"));
    }
}
