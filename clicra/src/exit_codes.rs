//! Stable exit codes for the `clicra` CLI.
//!
//! After an artifact runs, `clicra` exits with the artifact's own exit code
//! instead; these cover every other ending.

/// Artifact staged or explained, or it ran and succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, or an internal failure.
pub const INVALID: i32 = 1;
/// The model could not be reached or returned no usable artifact.
pub const ABORTED: i32 = 2;
/// The operator interrupted with Ctrl-C.
pub const INTERRUPTED: i32 = 130;
