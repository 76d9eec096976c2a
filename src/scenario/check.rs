//! Static checks over loaded scenarios
//!
//! Walks scenarios in run order and tracks which environment keys would be
//! set at each point: seeds, fixture outputs, and captures from earlier
//! steps or earlier scenarios. Any placeholder that nothing provides is
//! reported before a single request is sent.

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::fixture::Orchestrator;
use crate::template::Template;

use super::config::{Assertion, RequestStep};
use super::suite::LoadedScenario;

/// One problem found by [`check_scenarios`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub scenario: String,
    /// Where in the scenario (`fixtures`, `action#2`, an assertion name)
    pub location: String,
    pub problem: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.scenario, self.location, self.problem)
    }
}

struct Checker<'a> {
    available: HashSet<String>,
    findings: Vec<Finding>,
    scenario: &'a str,
}

impl Checker<'_> {
    fn report(&mut self, location: &str, problem: String) {
        self.findings.push(Finding {
            scenario: self.scenario.to_string(),
            location: location.to_string(),
            problem,
        });
    }

    fn require(&mut self, location: &str, key: &str) {
        if !self.available.contains(key) {
            self.report(location, format!("'{{{{{}}}}}' is never set before this point", key));
        }
    }

    fn require_text(&mut self, location: &str, text: &str) {
        match Template::parse(text) {
            Ok(template) => {
                let keys: Vec<String> = template.placeholders().map(str::to_string).collect();
                for key in keys {
                    self.require(location, &key);
                }
            }
            Err(e) => self.report(location, e.to_string()),
        }
    }

    fn step(&mut self, step: &RequestStep, location: &str) {
        match step.request.placeholders() {
            Ok(keys) => {
                for key in keys {
                    self.require(location, &key);
                }
            }
            Err(e) => self.report(location, e.to_string()),
        }
        self.available.extend(step.capture.keys().cloned());
    }

    fn assertion(&mut self, assertion: &Assertion) {
        let location = assertion.name.as_str();
        if let Some(json) = &assertion.json {
            if let Some(Value::String(text)) = &json.equals {
                self.require_text(location, text);
            }
            if let Some(text) = &json.contains {
                self.require_text(location, text);
            }
        }
        if let Some(Some(text)) = assertion.header.as_ref().map(|h| &h.equals) {
            self.require_text(location, text);
        }
        if let Some(Some(Value::String(text))) = assertion.env.as_ref().map(|e| &e.equals) {
            self.require_text(location, text);
        }
    }
}

/// Check every scenario against the keys available when it would run
///
/// `seeded` holds the keys present before the first scenario (config
/// tokens, variables and `server`).
pub fn check_scenarios(
    scenarios: &[LoadedScenario],
    seeded: &HashSet<String>,
    orchestrator: &Orchestrator,
) -> Vec<Finding> {
    let mut available = seeded.clone();
    let mut findings = Vec::new();

    for loaded in scenarios {
        let scenario = &loaded.scenario;
        let mut checker = Checker {
            available,
            findings: Vec::new(),
            scenario: &scenario.name,
        };

        match orchestrator.plan(&scenario.fixtures) {
            Ok(plan) => {
                for call in plan {
                    let Some(fixture) = orchestrator.get(&call.name) else {
                        continue;
                    };
                    let location = format!("fixture {}", call.name);
                    for key in fixture.required_keys() {
                        checker.require(&location, &key);
                    }
                    checker.available.extend(fixture.outputs());
                }
            }
            Err(e) => checker.report("fixtures", e.to_string()),
        }

        for (index, step) in scenario.setup.iter().enumerate() {
            checker.step(step, &step.label("setup", index));
        }
        for (index, step) in scenario.actions.iter().enumerate() {
            checker.step(step, &step.label("action", index));
        }
        for assertion in &scenario.assertions {
            checker.assertion(assertion);
        }
        for (index, step) in scenario.teardown.iter().enumerate() {
            checker.step(step, &step.label("teardown", index));
        }

        findings.append(&mut checker.findings);
        available = checker.available;
    }
    findings
}
