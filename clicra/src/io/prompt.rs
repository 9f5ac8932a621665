//! Prompt composition for the generation and analysis round-trips.
//!
//! Prompts are rendered from embedded minijinja templates. Rendering is a
//! pure function of its inputs: the platform identity is detected once by the
//! caller and passed in, so identical requests yield byte-identical prompts.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::debug;

use crate::core::clip::clip_with_notice;
use crate::core::types::{
    Artifact, ArtifactKind, ArtifactRequest, ExecutionResult, PromptStrategy, ReferenceContext,
};

const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const ANALYZE_TEMPLATE: &str = include_str!("prompts/analyze.md");
const CONTEXT_TEMPLATE: &str = include_str!("prompts/context.md");

// ref: https://arxiv.org/pdf/2211.01910
const STEP_BY_STEP: &str =
    "Let's work this out in a step by step way to be sure we have the right answer.";
// ref: https://github.com/dave1010/tree-of-thought-prompting
const TREE_OF_THOUGHT: &str = "Imagine three different experts are answering this question. \
All experts will write down 1 step of their thinking, then share it with the group.\n\
Then all experts will go on to the next step, etc. If any expert realises they're wrong at any point then they leave.";

/// Host identity used to bias the model toward compatible syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
    pub shell: String,
}

impl Platform {
    /// Best-effort detection from the compile target and the executing shell.
    pub fn detect(shell: &str) -> Self {
        let shell_name = Path::new(shell)
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| !name.is_empty())
            .unwrap_or("bash");
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            shell: shell_name.to_string(),
        }
    }
}

/// Reference context as rendered into templates.
#[derive(Debug, Serialize)]
struct ContextView<'a> {
    command: &'a str,
    output: &'a str,
    truncated: bool,
    exit_code: Option<i32>,
}

impl<'a> ContextView<'a> {
    fn from_context(context: &'a ReferenceContext) -> Self {
        Self {
            command: &context.command,
            output: context.output.trim_end(),
            truncated: context.truncated,
            exit_code: context.exit_code,
        }
    }
}

fn directive(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Command => "a command line",
        ArtifactKind::Script => "a script",
    }
}

fn preamble(strategy: Option<PromptStrategy>) -> Option<&'static str> {
    strategy.map(|s| match s {
        PromptStrategy::StepByStep => STEP_BY_STEP,
        PromptStrategy::TreeOfThought => TREE_OF_THOUGHT,
    })
}

/// Builds generation and analysis prompts.
#[derive(Debug)]
pub struct PromptComposer {
    env: Environment<'static>,
    platform: Platform,
    max_chars: usize,
}

impl PromptComposer {
    /// `max_chars` bounds each captured output stream in analysis prompts.
    pub fn new(platform: Platform, max_chars: usize) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        env.add_template("analyze", ANALYZE_TEMPLATE)
            .expect("analyze template should be valid");
        env.add_template("context", CONTEXT_TEMPLATE)
            .expect("context template should be valid");
        Self {
            env,
            platform,
            max_chars,
        }
    }

    /// Prompt asking the model for the artifact itself.
    pub fn generation(&self, request: &ArtifactRequest) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template
            .render(context! {
                preamble => preamble(request.strategy),
                directive => directive(request.kind),
                kind => request.kind.as_str(),
                platform => &self.platform,
                task => request.task.trim(),
                context => request.context.as_ref().map(ContextView::from_context),
            })
            .context("render generation prompt")?;
        debug!(prompt_len = rendered.len(), "generation prompt composed");
        Ok(rendered)
    }

    /// Prompt asking the model to diagnose a failed execution.
    ///
    /// stdout and stderr are each clipped to `max_chars`; empty streams are omitted.
    pub fn analysis(
        &self,
        request: &ArtifactRequest,
        artifact: &Artifact,
        result: &ExecutionResult,
    ) -> Result<String> {
        let stdout = clip_with_notice(result.stdout().trim_end(), self.max_chars);
        let stderr = clip_with_notice(result.stderr().trim_end(), self.max_chars);
        let template = self.env.get_template("analyze")?;
        let rendered = template
            .render(context! {
                kind => artifact.kind().as_str(),
                task => request.task.trim(),
                context => request.context.as_ref().map(ContextView::from_context),
                artifact => artifact.body(),
                exit_code => result.exit_code(),
                stdout => (!stdout.is_empty()).then_some(stdout),
                stderr => (!stderr.is_empty()).then_some(stderr),
            })
            .context("render analysis prompt")?;
        debug!(prompt_len = rendered.len(), "analysis prompt composed");
        Ok(rendered)
    }
}
