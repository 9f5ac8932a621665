//! I/O helpers for the generation loop.

pub mod config;
pub mod confirm;
pub mod context;
pub mod executor;
pub mod model;
pub mod process;
pub mod prompt;
