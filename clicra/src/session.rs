//! Orchestration for one `clicra` invocation.
//!
//! A session walks the [`Machine`] from `Compose` to a terminal state,
//! performing the I/O each state calls for. Collaborators come in as trait
//! objects or generics so tests can script the model, executor and
//! confirmation gate.

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::analyze::analyze_failure;
use crate::core::extract::ArtifactParser;
use crate::core::machine::{Event, Machine, State};
use crate::core::types::{
    AbortReason, AnalysisReport, Artifact, ArtifactKind, ArtifactRequest, ExecutionResult,
    Outcome, PromptStrategy,
};
use crate::io::confirm::Confirm;
use crate::io::context::collect_or_warn;
use crate::io::executor::{ArtifactExecutor, ExecOutcome};
use crate::io::model::ModelClient;
use crate::io::process::CancelToken;
use crate::io::prompt::PromptComposer;

/// Per-invocation settings, resolved from CLI flags and config.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub task: String,
    pub model: String,
    pub kind: ArtifactKind,
    pub strategy: Option<PromptStrategy>,
    /// Reference command whose output becomes prompt context.
    pub refer: Option<String>,
    pub max_chars: usize,
    /// Shell used for the reference command.
    pub shell: String,
    /// Skip the confirmation gate.
    pub run_immediately: bool,
    /// Echo composed prompts before sending them.
    pub show_prompts: bool,
}

/// Borrowed collaborators for a session.
pub struct Session<'a, M, E, C> {
    pub model: &'a M,
    pub parser: &'a dyn ArtifactParser,
    pub executor: &'a E,
    pub confirm: &'a C,
    pub composer: &'a PromptComposer,
    pub cancel: &'a CancelToken,
}

/// Operator-facing streams.
///
/// `out` carries results: the staged artifact, strategy answers and failure
/// analysis. `err` carries progress: the streamed completion, headers,
/// exit codes and warnings.
pub struct Console<'a> {
    pub out: &'a mut dyn Write,
    pub err: &'a mut dyn Write,
}

/// How a session ended and the states it passed through.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub outcome: Outcome,
    pub trail: Vec<State>,
}

impl<M: ModelClient, E: ArtifactExecutor, C: Confirm> Session<'_, M, E, C> {
    /// Run the loop once.
    ///
    /// Generation failures end in `Abort` and are reported through
    /// [`Outcome::Aborted`]; `Err` is reserved for failures of the session
    /// itself (console writes, prompt rendering, process spawning).
    #[instrument(skip_all, fields(kind = options.kind.as_str(), model = %options.model))]
    pub fn run(&self, options: &SessionOptions, console: &mut Console<'_>) -> Result<SessionReport> {
        let mut machine = Machine::new();

        let context = collect_or_warn(
            &options.shell,
            options.refer.as_deref(),
            options.max_chars,
            self.cancel,
            &mut *console.err,
        );
        let request = ArtifactRequest {
            task: options.task.clone(),
            context,
            model: options.model.clone(),
            kind: options.kind,
            strategy: options.strategy,
        };
        let prompt = self.composer.generation(&request)?;
        if options.show_prompts {
            writeln!(console.err, "-- PROMPT\n{prompt}").context("write prompt")?;
        }
        machine.advance(Event::Composed)?;

        info!("requesting completion");
        let completion = {
            // Strategy answers are the result; artifacts are shown again once extracted.
            let sink: &mut dyn Write = if options.strategy.is_some() {
                &mut *console.out
            } else {
                &mut *console.err
            };
            let streamed = self
                .model
                .complete(&options.model, &prompt, &mut |chunk: &str| {
                    write_chunk(&mut *sink, chunk);
                });
            end_stream(sink)?;
            streamed
        };
        let completion = match completion {
            Ok(completion) => completion,
            Err(err) => {
                warn!(err = %err, "generation failed");
                machine.advance(Event::TransportFailed)?;
                return Ok(finish(machine, Outcome::Aborted(AbortReason::Transport(err.to_string()))));
            }
        };

        if options.strategy.is_some() {
            machine.advance(Event::Explained)?;
            return Ok(finish(machine, Outcome::Explained(completion.into_string())));
        }
        machine.advance(Event::Generated)?;

        let artifact = match self.parser.parse(&completion, options.kind) {
            Ok(artifact) => artifact,
            Err(err) => {
                warn!(err = %err, "no artifact extracted");
                machine.advance(Event::ParseFailed)?;
                return Ok(finish(machine, Outcome::Aborted(AbortReason::NoArtifact(err))));
            }
        };
        debug!(lines = artifact.body().lines().count(), "artifact extracted");
        machine.advance(Event::Parsed {
            run_immediately: options.run_immediately,
        })?;

        if machine.state() == State::Confirm {
            show_artifact(console.err, &artifact)?;
            if self.confirm.confirm(&artifact)? {
                machine.advance(Event::Confirmed)?;
            } else {
                machine.advance(Event::Declined)?;
                writeln!(console.out, "{artifact}").context("write artifact")?;
                return Ok(finish(machine, Outcome::Staged(artifact)));
            }
        } else {
            writeln!(console.err, "-- RUN: {artifact}").context("write artifact")?;
        }

        let result = match self.executor.execute(&artifact, self.cancel)? {
            ExecOutcome::Interrupted => {
                machine.advance(Event::Interrupted)?;
                writeln!(console.err, "-- INTERRUPTED").context("write status")?;
                return Ok(finish(machine, Outcome::Interrupted { artifact }));
            }
            ExecOutcome::Completed(result) => result,
        };
        writeln!(console.err, "-- EXIT CODE: {}", result.exit_code()).context("write status")?;

        if result.success() {
            machine.advance(Event::Succeeded)?;
            return Ok(finish(
                machine,
                Outcome::Executed {
                    artifact,
                    result,
                    analysis: None,
                },
            ));
        }
        machine.advance(Event::Failed)?;

        let analysis = self.analyze(&request, &artifact, &result, options, console)?;
        machine.advance(Event::Analyzed)?;
        Ok(finish(
            machine,
            Outcome::Executed {
                artifact,
                result,
                analysis,
            },
        ))
    }

    fn analyze(
        &self,
        request: &ArtifactRequest,
        artifact: &Artifact,
        result: &ExecutionResult,
        options: &SessionOptions,
        console: &mut Console<'_>,
    ) -> Result<Option<AnalysisReport>> {
        if options.show_prompts
            && let Ok(prompt) = self.composer.analysis(request, artifact, result)
        {
            writeln!(console.err, "-- PROMPT\n{prompt}").context("write prompt")?;
        }
        writeln!(console.err, "-- ANALYSIS").context("write status")?;
        let sink = &mut *console.out;
        let analysis = analyze_failure(
            self.model,
            self.composer,
            request,
            artifact,
            result,
            &mut |chunk: &str| write_chunk(&mut *sink, chunk),
        );
        end_stream(sink)?;
        if let Some(AnalysisReport::Unavailable(reason)) = &analysis {
            writeln!(console.err, "analysis unavailable: {reason}").context("write status")?;
        }
        Ok(analysis)
    }
}

fn finish(machine: Machine, outcome: Outcome) -> SessionReport {
    debug_assert!(machine.state().is_terminal());
    debug!(state = ?machine.state(), "session finished");
    SessionReport {
        outcome,
        trail: machine.trail().to_vec(),
    }
}

fn show_artifact(err: &mut dyn Write, artifact: &Artifact) -> Result<()> {
    let label = artifact.kind().as_str().to_uppercase();
    writeln!(err, "-- {label}:\n{artifact}").context("write artifact")
}

/// Streaming is best effort: a broken terminal must not lose the completion.
fn write_chunk(sink: &mut dyn Write, chunk: &str) {
    if let Err(e) = sink.write_all(chunk.as_bytes()).and_then(|()| sink.flush()) {
        debug!(err = %e, "failed to stream chunk");
    }
}

fn end_stream(sink: &mut dyn Write) -> Result<()> {
    writeln!(sink).context("write newline")?;
    sink.flush().context("flush output")
}
