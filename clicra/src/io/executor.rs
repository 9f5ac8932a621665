//! Executor abstraction for running generated artifacts.
//!
//! The [`ArtifactExecutor`] trait decouples the session from the host shell.
//! Tests wrap or replace it to count invocations without spawning processes.

use std::io::Write;

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::core::extract::strip_prompt_markers;
use crate::core::types::{Artifact, ArtifactKind, ExecutionResult};
use crate::io::process::{CancelToken, CommandOutput, Echo, run_command, shell_command};

/// Result of an executor invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The artifact ran to completion (with any exit code).
    Completed(ExecutionResult),
    /// The operator interrupted the run; no partial result is kept.
    Interrupted,
}

/// Abstraction over artifact execution backends.
pub trait ArtifactExecutor {
    fn execute(&self, artifact: &Artifact, cancel: &CancelToken) -> Result<ExecOutcome>;
}

/// Runs artifacts through the host shell.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    capture_limit_bytes: usize,
    echo: Echo,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>, capture_limit_bytes: usize, echo: Echo) -> Self {
        Self {
            shell: shell.into(),
            capture_limit_bytes,
            echo,
        }
    }

    fn run_command_kind(&self, body: &str, cancel: &CancelToken) -> Result<CommandOutput> {
        run_command(
            shell_command(&self.shell, body),
            self.capture_limit_bytes,
            self.echo,
            cancel,
        )
        .context("run command")
    }

    /// Write the script to a private temp file and run it with the shell.
    ///
    /// The shell interprets the file, so a shebang line is only a comment.
    /// The file is removed when `script` drops, on every return path.
    fn run_script_kind(&self, body: &str, cancel: &CancelToken) -> Result<CommandOutput> {
        let script = write_script(body)?;
        debug!(path = %script.path().display(), "script written");
        let mut cmd = std::process::Command::new(&self.shell);
        cmd.arg(script.path());
        let output = run_command(cmd, self.capture_limit_bytes, self.echo, cancel)
            .context("run script")?;
        if let Err(e) = script.close() {
            warn!(err = %e, "failed to remove script file");
        }
        Ok(output)
    }
}

impl ArtifactExecutor for ShellExecutor {
    #[instrument(skip_all, fields(kind = artifact.kind().as_str(), shell = %self.shell))]
    fn execute(&self, artifact: &Artifact, cancel: &CancelToken) -> Result<ExecOutcome> {
        let body = strip_prompt_markers(artifact.body());
        info!("executing artifact");
        let _armed = cancel.arm();
        let output = match artifact.kind() {
            ArtifactKind::Command => self.run_command_kind(&body, cancel)?,
            ArtifactKind::Script => self.run_script_kind(&body, cancel)?,
        };

        if output.interrupted {
            warn!("artifact interrupted");
            return Ok(ExecOutcome::Interrupted);
        }
        let result = ExecutionResult::new(
            output.exit_code(),
            output.stdout_lossy(),
            output.stderr_lossy(),
        );
        debug!(exit_code = result.exit_code(), "artifact finished");
        Ok(ExecOutcome::Completed(result))
    }
}

fn write_script(body: &str) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("clicra-")
        .suffix(".sh")
        .tempfile()
        .context("create script file")?;
    file.write_all(body.as_bytes())
        .context("write script file")?;
    if !body.ends_with('\n') {
        file.write_all(b"\n").context("write script file")?;
    }
    file.flush().context("flush script file")?;
    Ok(file)
}
