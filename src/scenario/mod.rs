//! Scenarios: setup, action, assertions and teardown for one behavior
//!
//! Scenarios are usually loaded from YAML files, but every part can also be
//! built in code (see [`ConditionalCache`] for a reusable shape).

mod assertion;
mod cache;
mod check;
mod config;
mod report;
mod runner;
mod suite;

pub use assertion::{evaluate, CapturedResponse};
pub use cache::{ConditionalCache, ETAG_KEY};
pub use check::{check_scenarios, Finding};
pub use config::{
    Assertion, EnvExpectation, HeaderExpectation, JsonExpectation, RequestStep, Scenario,
    ScenarioTemplate, StatusExpectation,
};
pub use report::{AssertionOutcome, Exchange, PhaseFailure, ScenarioReport, SuiteReport};
pub use runner::{ScenarioRunner, ScenarioState};
pub use suite::{filter_scenarios, load_scenarios, LoadedScenario, Suite};
