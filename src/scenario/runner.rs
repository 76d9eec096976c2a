//! Scenario runner
//!
//! Drives one scenario through its lifecycle:
//!
//! ```text
//! Idle → Setup → Acting → Asserting → Teardown → Done
//!          ╰────────┴──────────┴→ Failed → Teardown → Done
//! ```
//!
//! Errors in Setup or Acting abort the scenario. Assertion failures are
//! recorded individually and never stop sibling assertions. Teardown is
//! always attempted and its errors are logged, never propagated.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::env::Environment;
use crate::fixture::Orchestrator;
use crate::http::{HttpClient, Response, RetryPolicy, StatusClass};

use super::assertion::{evaluate, CapturedResponse};
use super::config::{RequestStep, Scenario, StatusExpectation};
use super::report::{AssertionOutcome, Exchange, PhaseFailure, ScenarioReport};

const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(120);

/// Lifecycle states of a scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScenarioState {
    Idle,
    Setup,
    Acting,
    Asserting,
    Teardown,
    Done,
    Failed,
}

impl ScenarioState {
    /// Whether moving to `next` is a legal transition
    pub fn can_transition_to(self, next: ScenarioState) -> bool {
        use ScenarioState::*;
        matches!(
            (self, next),
            (Idle, Setup)
                | (Setup, Acting)
                | (Acting, Asserting)
                | (Asserting, Teardown)
                | (Setup | Acting | Asserting, Failed)
                | (Failed, Teardown)
                | (Teardown, Done)
        )
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScenarioState::Idle => "idle",
            ScenarioState::Setup => "setup",
            ScenarioState::Acting => "acting",
            ScenarioState::Asserting => "asserting",
            ScenarioState::Teardown => "teardown",
            ScenarioState::Done => "done",
            ScenarioState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Mutable record of one run
struct Run<'a> {
    scenario: &'a str,
    trace: Vec<ScenarioState>,
    exchanges: Vec<Exchange>,
}

impl<'a> Run<'a> {
    fn new(scenario: &'a str) -> Self {
        Self {
            scenario,
            trace: vec![ScenarioState::Idle],
            exchanges: Vec::new(),
        }
    }

    fn state(&self) -> ScenarioState {
        self.trace
            .last()
            .copied()
            .unwrap_or(ScenarioState::Idle)
    }

    fn transition(&mut self, next: ScenarioState) {
        let current = self.state();
        if !current.can_transition_to(next) {
            tracing::error!(
                scenario = self.scenario,
                from = %current,
                to = %next,
                "Invalid scenario state transition"
            );
            debug_assert!(false, "invalid transition {} -> {}", current, next);
        }
        tracing::debug!(scenario = self.scenario, from = %current, to = %next, "State");
        self.trace.push(next);
    }
}

/// Runs scenarios against one server
pub struct ScenarioRunner {
    orchestrator: Arc<Orchestrator>,
    timeout: Duration,
}

impl ScenarioRunner {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            timeout: DEFAULT_SCENARIO_TIMEOUT,
        }
    }

    /// Create a runner using the configured scenario timeout
    pub fn from_config(orchestrator: Arc<Orchestrator>, config: &Config) -> Self {
        Self::new(orchestrator).with_timeout(Duration::from_secs(config.runner.scenario_timeout_secs))
    }

    /// Default timeout for scenarios that don't set their own
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    fn client(&self) -> &HttpClient {
        self.orchestrator.client()
    }

    /// Run a scenario against an environment
    ///
    /// Never returns an error: every failure ends up in the report.
    pub async fn run(&self, scenario: &Scenario, env: &Environment) -> ScenarioReport {
        let started = Instant::now();
        let timeout = scenario
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.timeout);
        let mut run = Run::new(&scenario.name);

        tracing::info!(
            scenario = %scenario.name,
            namespace = env.namespace(),
            "Running scenario"
        );

        let mut assertions = Vec::new();
        let failure =
            match tokio::time::timeout(timeout, self.run_phases(scenario, env, &mut run)).await {
                Ok(Ok(outcomes)) => {
                    assertions = outcomes;
                    None
                }
                Ok(Err(error)) => Some(PhaseFailure {
                    phase: run.state(),
                    error,
                }),
                // The in-flight phase is dropped here; its response, if any, is discarded
                Err(_) => Some(PhaseFailure {
                    phase: run.state(),
                    error: Error::Timeout(timeout.as_millis() as u64),
                }),
            };

        if let Some(failure) = &failure {
            tracing::warn!(
                scenario = %scenario.name,
                phase = %failure.phase,
                error = %failure.error,
                "Scenario aborted"
            );
            run.transition(ScenarioState::Failed);
        }

        run.transition(ScenarioState::Teardown);
        let teardown_errors = self.teardown(scenario, env, &mut run).await;
        run.transition(ScenarioState::Done);

        let report = ScenarioReport {
            name: scenario.name.clone(),
            path: None,
            trace: run.trace,
            failure,
            assertions,
            exchanges: run.exchanges,
            teardown_errors,
            duration: started.elapsed(),
        };
        tracing::info!(
            scenario = %scenario.name,
            passed = report.passed(),
            elapsed_ms = report.duration.as_millis() as u64,
            "Scenario finished"
        );
        report
    }

    async fn run_phases(
        &self,
        scenario: &Scenario,
        env: &Environment,
        run: &mut Run<'_>,
    ) -> Result<Vec<AssertionOutcome>> {
        let retry = self.retry_policy(scenario);

        run.transition(ScenarioState::Setup);
        if !scenario.fixtures.is_empty() {
            self.orchestrator
                .run_all_with_retry(env, &scenario.fixtures, retry)
                .await?;
        }
        for (index, step) in scenario.setup.iter().enumerate() {
            let label = step.label("setup", index);
            let expect = step
                .expect
                .unwrap_or(StatusExpectation::Class(StatusClass::Success));
            let response = self
                .client()
                .execute_with_retry(&step.request, env, retry)
                .await
                .map_err(|e| Error::fixture_failed(&label, e.to_string()))?;
            run.exchanges
                .push(Exchange::record(ScenarioState::Setup, &label, &response));
            if !expect.matches(response.status) {
                return Err(Error::fixture_failed(
                    &label,
                    format!(
                        "{} {} returned {}, expected {}",
                        response.request.method, response.url, response.status, expect
                    ),
                ));
            }
            apply_captures(step, &label, &response, env);
        }

        run.transition(ScenarioState::Acting);
        let mut responses = Vec::with_capacity(scenario.actions.len());
        for (index, step) in scenario.actions.iter().enumerate() {
            let label = step.label("action", index);
            let response = self
                .client()
                .execute_with_retry(&step.request, env, retry)
                .await?;
            run.exchanges
                .push(Exchange::record(ScenarioState::Acting, &label, &response));
            if let Some(expect) = step.expect {
                if !expect.matches(response.status) {
                    tracing::debug!(
                        action = %label,
                        status = response.status,
                        %expect,
                        "Action returned an unexpected status"
                    );
                }
            }
            apply_captures(step, &label, &response, env);
            responses.push(CapturedResponse { label, response });
        }

        run.transition(ScenarioState::Asserting);
        let frozen = env.frozen();
        let outcomes: Vec<AssertionOutcome> = scenario
            .assertions
            .iter()
            .map(|assertion| evaluate(assertion, &responses, &frozen))
            .collect();
        for outcome in outcomes.iter().filter(|o| !o.passed) {
            tracing::debug!(
                scenario = %scenario.name,
                assertion = %outcome.name,
                message = outcome.message.as_deref().unwrap_or(""),
                "Assertion failed"
            );
        }

        Ok(outcomes)
    }

    async fn teardown(
        &self,
        scenario: &Scenario,
        env: &Environment,
        run: &mut Run<'_>,
    ) -> Vec<String> {
        let mut errors = Vec::new();
        for (index, step) in scenario.teardown.iter().enumerate() {
            let label = step.label("teardown", index);
            match self.client().execute(&step.request, env).await {
                Ok(response) => {
                    run.exchanges
                        .push(Exchange::record(ScenarioState::Teardown, &label, &response));
                    let expect = step
                        .expect
                        .unwrap_or(StatusExpectation::Class(StatusClass::Success));
                    if !expect.matches(response.status) {
                        let message = format!(
                            "{}: {} {} returned {}",
                            label, response.request.method, response.url, response.status
                        );
                        tracing::warn!(scenario = %scenario.name, "Teardown step failed: {}", message);
                        errors.push(message);
                    }
                }
                Err(e) => {
                    tracing::warn!(scenario = %scenario.name, step = %label, error = %e, "Teardown step failed");
                    errors.push(format!("{}: {}", label, e));
                }
            }
        }
        errors
    }

    fn retry_policy(&self, scenario: &Scenario) -> RetryPolicy {
        match scenario.retries {
            Some(max_retries) => RetryPolicy {
                max_retries,
                ..self.client().retry_policy()
            },
            None => self.client().retry_policy(),
        }
    }
}

/// Write captured response values into the environment
///
/// A missing source unsets the key, dropping any value left by an earlier
/// step or scenario; any later use of it fails with `UndefinedVariable`.
fn apply_captures(step: &RequestStep, label: &str, response: &Response, env: &Environment) {
    for (key, source) in &step.capture {
        match response.capture(source) {
            Some(value) => env.set(key.clone(), value),
            None => {
                tracing::warn!(
                    step = %label,
                    key = %key,
                    source = %source,
                    "Capture source not found in response, unsetting key"
                );
                env.remove(key);
            }
        }
    }
}
