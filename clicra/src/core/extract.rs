//! Extraction of a runnable artifact from model output.
//!
//! The model is asked to answer with a single fenced block. Models do not
//! always comply, so the [`ArtifactParser`] trait keeps the extraction
//! heuristic swappable without touching the session loop.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{Artifact, ArtifactKind, RawCompletion};

const FENCE: &str = "```";

/// Why no artifact could be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("model returned no usable {kind}")]
    Empty { kind: &'static str },
    #[error("model answered in prose instead of a {kind}: {first_line:?}")]
    NotShell {
        kind: &'static str,
        first_line: String,
    },
}

/// Strategy for turning a completion into an artifact.
pub trait ArtifactParser {
    fn parse(&self, raw: &RawCompletion, kind: ArtifactKind) -> Result<Artifact, ExtractError>;
}

/// What to do with a completion that has no fenced block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnfencedPolicy {
    /// Accept the trimmed completion unless it reads like conversation.
    #[default]
    ShellOnly,
    /// Accept the trimmed completion as-is.
    Verbatim,
    /// Never accept a completion without a fenced block.
    Reject,
}

/// Takes the first fenced code block; falls back per [`UnfencedPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FencedBlockParser {
    unfenced: UnfencedPolicy,
}

impl FencedBlockParser {
    pub fn new(unfenced: UnfencedPolicy) -> Self {
        Self { unfenced }
    }
}

impl ArtifactParser for FencedBlockParser {
    fn parse(&self, raw: &RawCompletion, kind: ArtifactKind) -> Result<Artifact, ExtractError> {
        let body = match first_fenced_block(raw.as_str()) {
            Some(block) => block,
            None => {
                let trimmed = raw.as_str().trim();
                match self.unfenced {
                    UnfencedPolicy::Verbatim => trimmed.to_string(),
                    UnfencedPolicy::Reject if !trimmed.is_empty() => {
                        return Err(not_shell(kind, trimmed));
                    }
                    UnfencedPolicy::Reject => String::new(),
                    UnfencedPolicy::ShellOnly => {
                        if looks_like_prose(trimmed) {
                            return Err(not_shell(kind, trimmed));
                        }
                        trimmed.to_string()
                    }
                }
            }
        };

        Artifact::new(kind, body.trim()).ok_or(ExtractError::Empty {
            kind: kind.as_str(),
        })
    }
}

/// Return the content of the first fenced block, if any.
///
/// The opening fence may carry an info string (```` ```bash ````). An
/// unclosed block runs to the end of the text. Content lines are kept
/// verbatim; only the block as a whole is trimmed later.
fn first_fenced_block(text: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.find(|line| is_fence(line))?;

    let mut block = Vec::new();
    for line in lines {
        if is_fence(line) {
            break;
        }
        block.push(line);
    }
    Some(block.join("\n"))
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

fn not_shell(kind: ArtifactKind, text: &str) -> ExtractError {
    ExtractError::NotShell {
        kind: kind.as_str(),
        first_line: text.lines().next().unwrap_or_default().to_string(),
    }
}

/// Heuristic check for conversational text where a command was expected.
fn looks_like_prose(text: &str) -> bool {
    static OPENER: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)^(sure|certainly|of course|here('s| is| are)|i |i'm|i am|sorry|unfortunately|as an ai|you can|to do this|the following)\b",
        )
        .expect("prose opener regex is valid")
    });
    // Punctuation must close a plain word: `app .` or `user@host:` are arguments.
    static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(^|\s)[A-Za-z]+[.:?!]$").expect("sentence end regex is valid")
    });

    let Some(first) = text.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return false;
    };
    if OPENER.is_match(first) {
        return true;
    }
    SENTENCE_END.is_match(first) && first.split_whitespace().count() >= 4
}

/// Drop a leading `$ ` shell-prompt marker from each line.
///
/// Models often echo commands in transcript form (`$ ls -la`).
pub fn strip_prompt_markers(body: &str) -> String {
    body.lines()
        .map(|line| line.strip_prefix("$ ").unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}
