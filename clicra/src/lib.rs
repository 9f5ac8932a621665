//! Local-model command generation loop.
//!
//! `clicra` turns a natural-language task into a shell command or script by
//! asking a locally hosted model, shows the result, optionally runs it, and
//! asks the model to explain failures. The architecture keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (truncation, artifact extraction,
//!   the session state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (config, model transport, process
//!   execution, terminal confirmation). Behind traits so tests can script them.
//!
//! [`session`] drives one pass of the loop; [`analyze`] handles the failure
//! round-trip.

pub mod analyze;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
