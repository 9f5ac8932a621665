//! Deterministic, pure logic shared by the generation loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values and return deterministic outputs suitable for tests.

pub mod clip;
pub mod extract;
pub mod machine;
pub mod types;
