//! API conformance harness
//!
//! Exercises a live HTTP API through real requests: an environment store of
//! shared values, `{{placeholder}}` templates, a request builder, composable
//! fixtures with dependency resolution, and a scenario runner that checks
//! responses against named assertions.

pub mod cli;
pub mod commands;
pub mod common;
pub mod env;
pub mod fixture;
pub mod http;
pub mod scenario;
pub mod template;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use env::Environment;
