//! Operator confirmation before an artifact is executed.

use std::io::IsTerminal;

use anyhow::{Context, Result};
use dialoguer::Confirm as ConfirmPrompt;
use tracing::debug;

use crate::core::types::Artifact;

/// Gate between displaying an artifact and running it.
pub trait Confirm {
    /// Return `true` only when the operator explicitly approved `artifact`.
    fn confirm(&self, artifact: &Artifact) -> Result<bool>;
}

/// Asks on the terminal, defaulting to "no".
///
/// Without an interactive stdin there is nobody to ask, so nothing runs.
pub struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, artifact: &Artifact) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            debug!("stdin is not a terminal; not running artifact");
            return Ok(false);
        }
        ConfirmPrompt::new()
            .with_prompt(format!("Run this {}?", artifact.kind().as_str()))
            .default(false)
            .interact()
            .context("read confirmation")
    }
}
