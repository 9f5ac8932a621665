//! Reference-command context for the generation prompt.
//!
//! Context is optional and must never block the primary task: a reference
//! command that cannot be started is reported and replaced by no context.

use std::io::Write;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::clip::truncate_chars;
use crate::core::types::ReferenceContext;
use crate::io::process::{CancelToken, Echo, run_command, shell_command};

/// Reference output is read in full before character truncation; this only
/// guards against unbounded memory.
const REFERENCE_CAPTURE_LIMIT_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Error)]
#[error("reference command `{command}` could not be run: {reason}")]
pub struct ContextCollectionError {
    pub command: String,
    pub reason: String,
}

/// Run `command` through `shell` and keep the first `max_chars` characters
/// of its stdout followed by its stderr.
///
/// A command that runs but exits non-zero still produces context; the exit
/// code is recorded so the prompt can mention it.
#[instrument(skip_all, fields(command = %command, max_chars))]
pub fn collect_reference_context(
    shell: &str,
    command: &str,
    max_chars: usize,
    cancel: &CancelToken,
) -> Result<ReferenceContext, ContextCollectionError> {
    let output = run_command(
        shell_command(shell, command),
        REFERENCE_CAPTURE_LIMIT_BYTES,
        Echo::Quiet,
        cancel,
    )
    .map_err(|e| ContextCollectionError {
        command: command.to_string(),
        reason: format!("{e:#}"),
    })?;

    let mut combined = output.stdout_lossy();
    combined.push_str(&output.stderr_lossy());
    let clipped = truncate_chars(&combined, max_chars);

    debug!(
        exit_code = ?output.status.code(),
        total_chars = combined.chars().count(),
        truncated = clipped.truncated(),
        "reference context collected"
    );
    Ok(ReferenceContext {
        command: command.to_string(),
        output: clipped.text.to_string(),
        exit_code: output.status.code(),
        truncated: clipped.truncated(),
    })
}

/// Collect context if a reference command was given, recovering from failure.
///
/// Failures are written to `warnings` and yield `None` so generation proceeds.
pub fn collect_or_warn(
    shell: &str,
    command: Option<&str>,
    max_chars: usize,
    cancel: &CancelToken,
    warnings: &mut dyn Write,
) -> Option<ReferenceContext> {
    let command = command.map(str::trim).filter(|c| !c.is_empty())?;
    match collect_reference_context(shell, command, max_chars, cancel) {
        Ok(context) => Some(context),
        Err(err) => {
            warn!(err = %err, "continuing without reference context");
            if let Err(e) = writeln!(warnings, "warning: {err}; continuing without context") {
                debug!(err = %e, "failed to write warning");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_command_means_no_context() {
        let mut warnings = Vec::new();
        let context = collect_or_warn("bash", None, 2000, &CancelToken::new(), &mut warnings);
        assert!(context.is_none());
        assert!(warnings.is_empty());
    }

    #[test]
    fn short_output_is_kept_unmodified() {
        let context =
            collect_reference_context("bash", "printf 'a.txt\\nb.txt\\n'", 2000, &CancelToken::new())
                .expect("context");
        assert_eq!(context.output, "a.txt\nb.txt\n");
        assert_eq!(context.exit_code, Some(0));
        assert!(!context.truncated);
    }

    #[test]
    fn long_output_is_cut_to_exactly_max_chars() {
        let context = collect_reference_context(
            "bash",
            "head -c 5000 /dev/zero | tr '\\0' x",
            2000,
            &CancelToken::new(),
        )
        .expect("context");
        assert_eq!(context.output.chars().count(), 2000);
        assert!(context.truncated);
    }

    #[test]
    fn stderr_follows_stdout_and_exit_code_is_kept() {
        let context = collect_reference_context(
            "bash",
            "echo out; echo err >&2; exit 4",
            2000,
            &CancelToken::new(),
        )
        .expect("context");
        assert_eq!(context.output, "out\nerr\n");
        assert_eq!(context.exit_code, Some(4));
    }

    #[test]
    fn unrunnable_command_warns_and_continues() {
        let mut warnings = Vec::new();
        let context = collect_or_warn(
            "/nonexistent/clicra-shell",
            Some("ls"),
            2000,
            &CancelToken::new(),
            &mut warnings,
        );
        assert!(context.is_none());
        let text = String::from_utf8(warnings).expect("utf8");
        assert!(text.contains("could not be run"));
    }
}
