//! Error types for the conformance harness
//!
//! Construction errors (undefined variables, broken fixtures, transport
//! failures) abort a scenario. Assertion failures are recorded per assertion
//! and never abort their siblings; they only travel as `Error` values when a
//! caller asks for a single assertion outcome.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the conformance harness
#[derive(Error, Debug)]
pub enum Error {
    // === Template Errors ===
    #[error("Undefined variable '{0}'. Seed it in the config [variables] table or produce it from a fixture or capture")]
    UndefinedVariable(String),

    #[error("Malformed template at byte {offset}: {reason} (in '{template}')")]
    MalformedTemplate {
        template: String,
        offset: usize,
        reason: String,
    },

    // === Fixture Errors ===
    #[error("Fixture '{name}' failed: {reason}")]
    FixtureFailed { name: String, reason: String },

    #[error("Fixture dependency cycle: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Unknown fixture '{0}'. Use 'conformance fixtures' to list registered fixtures")]
    UnknownFixture(String),

    // === HTTP Errors ===
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Scenario Errors ===
    #[error("Scenario timed out after {0} ms")]
    Timeout(u64),

    #[error("Assertion failed: {0}")]
    AssertionFailure(String),

    #[error("Invalid scenario '{path}': {reason}")]
    ScenarioParse { path: String, reason: String },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a fixture failed error
    pub fn fixture_failed(name: &str, reason: impl Into<String>) -> Self {
        Self::FixtureFailed {
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a malformed template error
    pub fn malformed_template(template: &str, offset: usize, reason: &str) -> Self {
        Self::MalformedTemplate {
            template: template.to_string(),
            offset,
            reason: reason.to_string(),
        }
    }

    /// Create a scenario parse error
    pub fn scenario_parse(path: &str, reason: impl Into<String>) -> Self {
        Self::ScenarioParse {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an assertion failure
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailure(message.into())
    }

    /// Whether retrying the same request could succeed
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            Error::InvalidRequest(e.to_string())
        } else {
            Error::Transport(e.to_string())
        }
    }
}
