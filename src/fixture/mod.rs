//! Fixtures: named, composable setup builds
//!
//! A fixture performs real side-effecting requests against the system under
//! test and produces a set of declared output keys (an event ID, a paid
//! order). Fixtures declare their dependencies explicitly; the
//! [`Orchestrator`] resolves them in dependency order, builds each identity
//! once per resolution and commits outputs to the environment only when a
//! build succeeds.

mod declarative;
mod orchestrator;
pub mod ticketing;

pub use declarative::{load_fixture_dir, DeclarativeFixture, FixtureStep};
pub use orchestrator::Orchestrator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::common::{truncate_for_display, Error, Result};
use crate::env::{render_value, Environment};
use crate::http::{HttpClient, RequestTemplate, Response, StatusClass};

/// Fixture parameters, kept sorted so identities are canonical
pub type Params = BTreeMap<String, Value>;

/// A request to build a fixture with specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureCall {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

impl FixtureCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Name plus canonical parameters; equal identities are the same build
    pub fn identity(&self) -> String {
        if self.params.is_empty() {
            return self.name.clone();
        }
        let params = serde_json::to_string(&self.params).unwrap_or_default();
        format!("{}{}", self.name, params)
    }
}

/// Values produced by a fixture build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs(BTreeMap<String, Value>);

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Output rendered the way templates see it
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.0.get(key).map(render_value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keep only the given keys
    pub fn retain_declared(&mut self, declared: &[String]) {
        self.0.retain(|key, _| declared.iter().any(|d| d == key));
    }
}

impl FromIterator<(String, Value)> for Outputs {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A named setup build
#[async_trait]
pub trait Fixture: Send + Sync {
    /// Registry name
    fn name(&self) -> &str;

    /// One-line description for listings
    fn description(&self) -> &str {
        ""
    }

    /// Fixtures that must be built first, given this build's parameters
    fn dependencies(&self, _params: &Params) -> Vec<FixtureCall> {
        Vec::new()
    }

    /// Environment keys that must already be set (tokens, seed IDs)
    fn required_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Keys this fixture guarantees to set on success
    fn outputs(&self) -> Vec<String>;

    /// Perform the build
    ///
    /// `ctx.env()` already contains the parameters and every dependency's
    /// outputs.
    async fn build(&self, ctx: &FixtureContext, params: &Params) -> Result<Outputs>;
}

/// Per-build context handed to [`Fixture::build`]
///
/// The context owns an isolated environment scope: keys written here are
/// visible to later stages of the same build but never leak to the caller.
/// Only declared outputs are committed by the orchestrator.
pub struct FixtureContext {
    name: String,
    client: HttpClient,
    env: Environment,
}

impl FixtureContext {
    pub fn new(name: impl Into<String>, client: HttpClient, env: Environment) -> Self {
        Self {
            name: name.into(),
            client,
            env,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// Set a build-local value for later stages
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.env.set(key, value);
    }

    /// Send a request and require a status class
    ///
    /// Every failure, including substitution and transport errors, becomes
    /// `FixtureFailed` naming this fixture and the stage.
    pub async fn request(
        &self,
        stage: &str,
        template: &RequestTemplate,
        expect: StatusClass,
    ) -> Result<Response> {
        let response = self
            .client
            .execute(template, &self.env)
            .await
            .map_err(|e| Error::fixture_failed(&self.name, format!("{}: {}", stage, e)))?;

        if !expect.contains(response.status) {
            return Err(Error::fixture_failed(
                &self.name,
                format!(
                    "{}: {} {} returned {}, expected {} (body: {})",
                    stage,
                    response.request.method,
                    response.url,
                    response.status,
                    expect,
                    truncate_for_display(&response.body_text(), 300)
                ),
            ));
        }
        Ok(response)
    }

    /// Extract a value from a stage's response, failing the build if absent
    pub fn extract(&self, stage: &str, response: &Response, source: &str) -> Result<Value> {
        response.capture(source).ok_or_else(|| {
            Error::fixture_failed(
                &self.name,
                format!("{}: response has no value at '{}'", stage, source),
            )
        })
    }

    /// Collect the given keys from the build scope as outputs
    pub fn outputs(&self, keys: &[&str]) -> Result<Outputs> {
        let mut outputs = Outputs::new();
        for key in keys {
            let value = self.env.get(key).map_err(|_| {
                Error::fixture_failed(&self.name, format!("output '{}' was never set", key))
            })?;
            outputs.insert(*key, value);
        }
        Ok(outputs)
    }
}
