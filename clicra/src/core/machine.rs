//! Finite state machine for one generate → confirm → execute → analyze pass.
//!
//! The session drives I/O and reports what happened as [`Event`]s; this module
//! decides which state follows. Illegal moves are errors, so an orchestration
//! bug surfaces instead of silently executing something.

use thiserror::Error;

/// Loop state. `Done`, `Abort` and `Interrupted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Compose,
    Generate,
    Parse,
    Confirm,
    Execute,
    Analyze,
    Done,
    Abort,
    Interrupted,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Done | State::Abort | State::Interrupted)
    }
}

/// Something that happened while in a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Prompt built.
    Composed,
    /// Model returned a completion.
    Generated,
    /// Strategy mode: the completion is the answer, nothing to extract.
    Explained,
    /// The model endpoint could not be reached or errored.
    TransportFailed,
    /// An artifact was extracted.
    Parsed { run_immediately: bool },
    /// No usable artifact in the completion.
    ParseFailed,
    Confirmed,
    Declined,
    /// Artifact exited with status 0.
    Succeeded,
    /// Artifact exited non-zero.
    Failed,
    /// Operator interrupted the running artifact.
    Interrupted,
    /// Analysis finished, whether or not a report was available.
    Analyzed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal transition: {event:?} in state {from:?}")]
pub struct TransitionError {
    pub from: State,
    pub event: Event,
}

/// Compute the state that follows `event` in `from`.
pub fn next(from: State, event: Event) -> Result<State, TransitionError> {
    let to = match (from, event) {
        (State::Compose, Event::Composed) => State::Generate,
        (State::Generate, Event::Generated) => State::Parse,
        (State::Generate, Event::Explained) => State::Done,
        (State::Generate, Event::TransportFailed) => State::Abort,
        (State::Parse, Event::Parsed { run_immediately }) => {
            if run_immediately {
                State::Execute
            } else {
                State::Confirm
            }
        }
        (State::Parse, Event::ParseFailed) => State::Abort,
        (State::Confirm, Event::Confirmed) => State::Execute,
        (State::Confirm, Event::Declined) => State::Done,
        (State::Execute, Event::Succeeded) => State::Done,
        (State::Execute, Event::Failed) => State::Analyze,
        (State::Execute, Event::Interrupted) => State::Interrupted,
        (State::Analyze, Event::Analyzed) => State::Done,
        _ => return Err(TransitionError { from, event }),
    };
    Ok(to)
}

/// Current state plus the path taken to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    state: State,
    trail: Vec<State>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self {
            state: State::Compose,
            trail: vec![State::Compose],
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Every state visited, starting with `Compose`.
    pub fn trail(&self) -> &[State] {
        &self.trail
    }

    pub fn advance(&mut self, event: Event) -> Result<State, TransitionError> {
        let to = next(self.state, event)?;
        self.state = to;
        self.trail.push(to);
        Ok(to)
    }
}
