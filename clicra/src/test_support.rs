//! Test-only collaborators with scripted behavior.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

use anyhow::Result;

use crate::core::types::{Artifact, RawCompletion};
use crate::io::confirm::Confirm;
use crate::io::executor::{ArtifactExecutor, ExecOutcome};
use crate::io::model::{ChunkSink, ModelClient, TransportError};
use crate::io::process::CancelToken;

/// Model client that replays canned replies in order.
///
/// `Err` replies surface as [`TransportError::Endpoint`]. Running out of
/// replies is also a transport error, so an unexpected extra call fails loudly.
pub struct ScriptedModel {
    replies: RefCell<VecDeque<Result<String, String>>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }
}

impl ModelClient for ScriptedModel {
    fn complete(
        &self,
        _model: &str,
        prompt: &str,
        on_chunk: ChunkSink<'_>,
    ) -> Result<RawCompletion, TransportError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(text)) => {
                on_chunk(&text);
                Ok(RawCompletion::new(text))
            }
            Some(Err(reason)) => Err(TransportError::Endpoint(reason)),
            None => Err(TransportError::Endpoint("no scripted reply left".to_string())),
        }
    }
}

/// Wraps an executor and records every artifact it is asked to run.
pub struct RecordingExecutor<E> {
    inner: E,
    seen: RefCell<Vec<Artifact>>,
}

impl<E> RecordingExecutor<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn seen(&self) -> Vec<Artifact> {
        self.seen.borrow().clone()
    }
}

impl<E: ArtifactExecutor> ArtifactExecutor for RecordingExecutor<E> {
    fn execute(&self, artifact: &Artifact, cancel: &CancelToken) -> Result<ExecOutcome> {
        self.seen.borrow_mut().push(artifact.clone());
        self.inner.execute(artifact, cancel)
    }
}

/// Executor that never spawns anything and always reports an interrupt.
pub struct InterruptingExecutor;

impl ArtifactExecutor for InterruptingExecutor {
    fn execute(&self, _artifact: &Artifact, cancel: &CancelToken) -> Result<ExecOutcome> {
        cancel.cancel();
        Ok(ExecOutcome::Interrupted)
    }
}

/// Confirmation gate with a fixed answer.
pub struct ScriptedConfirm {
    answer: bool,
    asked: Cell<usize>,
}

impl ScriptedConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: Cell::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.get()
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _artifact: &Artifact) -> Result<bool> {
        self.asked.set(self.asked.get() + 1);
        Ok(self.answer)
    }
}
