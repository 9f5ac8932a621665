//! Shared deterministic types for the generation loop.
//!
//! Every value here lives for a single invocation. Nothing is persisted.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::extract::ExtractError;

/// What the model is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// A single command line, run with `bash -c`.
    Command,
    /// A multi-line script, written to a temporary file and run from there.
    Script,
}

impl ArtifactKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Command => "command",
            ArtifactKind::Script => "script",
        }
    }
}

/// Optional reasoning preamble placed before the generation directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptStrategy {
    /// "Let's work this out in a step by step way".
    StepByStep,
    /// Three experts reasoning one step at a time.
    TreeOfThought,
}

/// Output of the reference command, bounded for use as prompt context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceContext {
    /// The command that was run.
    pub command: String,
    /// Combined stdout then stderr, truncated to the configured character limit.
    pub output: String,
    /// Exit code of the reference command (`None` when killed by a signal).
    pub exit_code: Option<i32>,
    /// Whether `output` was cut short.
    pub truncated: bool,
}

/// Everything needed to compose one generation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRequest {
    pub task: String,
    pub context: Option<ReferenceContext>,
    pub model: String,
    pub kind: ArtifactKind,
    pub strategy: Option<PromptStrategy>,
}

/// Unprocessed completion text returned by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCompletion(String);

impl RawCompletion {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// A command or script extracted from a completion, ready to run.
///
/// The body is never empty and carries no surrounding model prose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    kind: ArtifactKind,
    body: String,
}

impl Artifact {
    /// Returns `None` when `body` is blank.
    pub fn new(kind: ArtifactKind, body: impl Into<String>) -> Option<Self> {
        let body = body.into();
        if body.trim().is_empty() {
            return None;
        }
        Some(Self { kind, body })
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// Captured result of running an artifact to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
}

impl ExecutionResult {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Diagnosis of a failed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisReport {
    /// Model response, verbatim.
    Available(String),
    /// The analysis round-trip failed; carries the reason.
    Unavailable(String),
}

/// Why a session stopped before anything was executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// The model endpoint could not be reached or errored.
    Transport(String),
    /// The completion held no usable artifact.
    NoArtifact(ExtractError),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::Transport(msg) => write!(f, "{msg}"),
            AbortReason::NoArtifact(err) => write!(f, "{err}"),
        }
    }
}

/// Terminal report of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Artifact generated and shown, not run (operator declined or not asked).
    Staged(Artifact),
    /// Artifact ran to completion. `analysis` is present only for non-zero exits.
    Executed {
        artifact: Artifact,
        result: ExecutionResult,
        analysis: Option<AnalysisReport>,
    },
    /// Strategy mode: the model's reasoning was shown, no artifact extracted.
    Explained(String),
    /// Execution was interrupted by the operator.
    Interrupted { artifact: Artifact },
    /// Generation failed; nothing was executed.
    Aborted(AbortReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_artifact_is_rejected() {
        assert!(Artifact::new(ArtifactKind::Command, "").is_none());
        assert!(Artifact::new(ArtifactKind::Command, " \n\t ").is_none());
    }

    #[test]
    fn artifact_keeps_body_verbatim() {
        let artifact = Artifact::new(ArtifactKind::Script, "for f in *; do\n  echo \"$f\"\ndone")
            .expect("artifact");
        assert_eq!(artifact.body(), "for f in *; do\n  echo \"$f\"\ndone");
        assert_eq!(artifact.kind(), ArtifactKind::Script);
    }

    #[test]
    fn execution_result_success_tracks_exit_code() {
        assert!(ExecutionResult::new(0, "", "").success());
        assert!(!ExecutionResult::new(2, "", "boom").success());
    }
}
