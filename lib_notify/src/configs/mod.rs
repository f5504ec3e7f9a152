//! # Configuration Modules
//!
//! Engine-level settings shared by the library and the server binary. File,
//! environment and command-line sources are merged by the binary, which then
//! builds an `EngineSettings` from the result.

/// Validated cycle, pacing and concurrency settings.
pub mod engine;

pub use engine::{ConfigError, EngineSettings};
