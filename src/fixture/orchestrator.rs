//! Fixture orchestrator
//!
//! Resolves a set of fixture calls into a dependency-ordered build plan,
//! runs it, and commits declared outputs to the caller's environment. The
//! outputs of a plan are committed together once every entry has built; a
//! failure anywhere in the plan writes nothing.
//!
//! Concurrent requests for the same fixture identity in the same
//! environment namespace share one in-flight build. Finished builds are
//! forgotten, so calling a fixture again creates fresh resources.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::common::{Error, Result};
use crate::env::Environment;
use crate::http::{HttpClient, RetryPolicy};

use super::{ticketing, Fixture, FixtureCall, FixtureContext, Outputs, Params};

/// Guard against unbounded parameterized recursion
const MAX_DEPENDENCY_DEPTH: usize = 32;

/// Cloneable failure shared between coalesced waiters
#[derive(Debug, Clone)]
struct BuildFailure {
    name: String,
    reason: String,
}

impl BuildFailure {
    fn from_error(name: &str, error: Error) -> Self {
        match error {
            Error::FixtureFailed { name, reason } => Self { name, reason },
            other => Self {
                name: name.to_string(),
                reason: other.to_string(),
            },
        }
    }

    fn into_error(self) -> Error {
        Error::FixtureFailed {
            name: self.name,
            reason: self.reason,
        }
    }
}

type BuildCell = Arc<OnceCell<std::result::Result<Outputs, BuildFailure>>>;

/// Removes an in-flight entry once its build has finished or been abandoned
///
/// Runs on drop, so a waiter cancelled by a timeout still cleans up.
struct Inflight<'a> {
    map: &'a Mutex<HashMap<String, BuildCell>>,
    key: String,
    cell: BuildCell,
}

impl Drop for Inflight<'_> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        let ours = map.get(&self.key).is_some_and(|c| Arc::ptr_eq(c, &self.cell));
        // With no other waiter left, only the map and this guard hold the cell
        if ours && (self.cell.initialized() || Arc::strong_count(&self.cell) <= 2) {
            map.remove(&self.key);
        }
    }
}

/// Registry and executor for fixtures
pub struct Orchestrator {
    client: HttpClient,
    fixtures: HashMap<String, Arc<dyn Fixture>>,
    inflight: Mutex<HashMap<String, BuildCell>>,
    owners: Mutex<HashMap<String, String>>,
}

impl Orchestrator {
    /// Create an orchestrator with no fixtures registered
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            fixtures: HashMap::new(),
            inflight: Mutex::new(HashMap::new()),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// Create an orchestrator with the built-in ticketing fixtures
    pub fn with_builtin(client: HttpClient) -> Self {
        let mut orchestrator = Self::new(client);
        ticketing::register(&mut orchestrator);
        orchestrator
    }

    /// Register a fixture, replacing any fixture with the same name
    pub fn register<F: Fixture + 'static>(&mut self, fixture: F) {
        self.register_arc(Arc::new(fixture));
    }

    pub fn register_arc(&mut self, fixture: Arc<dyn Fixture>) {
        let name = fixture.name().to_string();
        if self.fixtures.insert(name.clone(), fixture).is_some() {
            tracing::debug!(fixture = %name, "Replaced registered fixture");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Fixture>> {
        self.fixtures.get(name).cloned()
    }

    /// Registered fixtures sorted by name
    pub fn fixtures(&self) -> Vec<Arc<dyn Fixture>> {
        let mut all: Vec<_> = self.fixtures.values().cloned().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Dependency-ordered build plan for the given calls
    ///
    /// Every identity appears once, after all of its dependencies. Cycles
    /// and unknown fixtures are reported before anything is built.
    pub fn plan(&self, calls: &[FixtureCall]) -> Result<Vec<FixtureCall>> {
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut stack: Vec<(String, String)> = Vec::new();
        for call in calls {
            self.visit(call, &mut stack, &mut done, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        call: &FixtureCall,
        stack: &mut Vec<(String, String)>,
        done: &mut HashSet<String>,
        order: &mut Vec<FixtureCall>,
    ) -> Result<()> {
        let identity = call.identity();
        if done.contains(&identity) {
            return Ok(());
        }
        if let Some(pos) = stack.iter().position(|(id, _)| *id == identity) {
            let mut path: Vec<String> = stack[pos..].iter().map(|(_, n)| n.clone()).collect();
            path.push(call.name.clone());
            return Err(Error::DependencyCycle(path));
        }
        if stack.len() >= MAX_DEPENDENCY_DEPTH {
            let mut path: Vec<String> = stack.iter().map(|(_, n)| n.clone()).collect();
            path.push(call.name.clone());
            return Err(Error::DependencyCycle(path));
        }

        let fixture = self
            .get(&call.name)
            .ok_or_else(|| Error::UnknownFixture(call.name.clone()))?;

        stack.push((identity.clone(), call.name.clone()));
        for dependency in fixture.dependencies(&call.params) {
            self.visit(&dependency, stack, done, order)?;
        }
        stack.pop();

        done.insert(identity);
        order.push(call.clone());
        Ok(())
    }

    /// Build one fixture (and its dependencies)
    pub async fn run(&self, env: &Environment, name: &str, params: Params) -> Result<Outputs> {
        let call = FixtureCall {
            name: name.to_string(),
            params,
        };
        let mut outputs = self.run_all(env, std::slice::from_ref(&call)).await?;
        outputs
            .pop()
            .ok_or_else(|| Error::Internal(format!("no outputs recorded for '{}'", name)))
    }

    /// Build several fixtures as one resolution
    ///
    /// Dependencies shared between the calls are built once. Returns the
    /// outputs of each requested call, in order.
    pub async fn run_all(&self, env: &Environment, calls: &[FixtureCall]) -> Result<Vec<Outputs>> {
        self.run_all_with_retry(env, calls, self.client.retry_policy())
            .await
    }

    /// Like [`Orchestrator::run_all`], sending fixture requests with `retry`
    pub async fn run_all_with_retry(
        &self,
        env: &Environment,
        calls: &[FixtureCall],
        retry: RetryPolicy,
    ) -> Result<Vec<Outputs>> {
        let plan = self.plan(calls)?;
        tracing::debug!(
            plan = ?plan.iter().map(FixtureCall::identity).collect::<Vec<_>>(),
            "Fixture plan"
        );

        let mut built: HashMap<String, Outputs> = HashMap::new();
        let mut pending: Vec<(String, Outputs)> = Vec::with_capacity(plan.len());
        for call in &plan {
            let fixture = self
                .get(&call.name)
                .ok_or_else(|| Error::UnknownFixture(call.name.clone()))?;

            let mut dependency_outputs = Vec::new();
            for dependency in fixture.dependencies(&call.params) {
                let outputs = built.get(&dependency.identity()).ok_or_else(|| {
                    Error::Internal(format!(
                        "dependency '{}' of '{}' missing from plan",
                        dependency.name, call.name
                    ))
                })?;
                dependency_outputs.push(outputs.clone());
            }

            let outputs = self
                .build_coalesced(env, &fixture, call, dependency_outputs, retry)
                .await?;
            pending.push((fixture.name().to_string(), outputs.clone()));
            built.insert(call.identity(), outputs);
        }

        self.commit(env, &pending);

        calls
            .iter()
            .map(|call| {
                built.get(&call.identity()).cloned().ok_or_else(|| {
                    Error::Internal(format!("fixture '{}' missing from plan", call.name))
                })
            })
            .collect()
    }

    async fn build_coalesced(
        &self,
        env: &Environment,
        fixture: &Arc<dyn Fixture>,
        call: &FixtureCall,
        dependency_outputs: Vec<Outputs>,
        retry: RetryPolicy,
    ) -> Result<Outputs> {
        let key = format!("{}::{}", env.namespace(), call.identity());
        let cell: BuildCell = self.inflight.lock().entry(key.clone()).or_default().clone();
        let inflight = Inflight {
            map: &self.inflight,
            key,
            cell,
        };

        let result = inflight
            .cell
            .get_or_init(|| self.build_one(env, fixture, call, dependency_outputs, retry))
            .await
            .clone();
        drop(inflight);

        result.map_err(BuildFailure::into_error)
    }

    async fn build_one(
        &self,
        env: &Environment,
        fixture: &Arc<dyn Fixture>,
        call: &FixtureCall,
        dependency_outputs: Vec<Outputs>,
        retry: RetryPolicy,
    ) -> std::result::Result<Outputs, BuildFailure> {
        let name = fixture.name();

        let scope = env.isolated(format!("fixture:{}", name));
        for outputs in &dependency_outputs {
            scope.merge(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        scope.merge(call.params.clone());

        // Dependency outputs are not committed until the plan finishes, so
        // requirements are checked against the build scope
        for key in fixture.required_keys() {
            if !scope.has(&key) {
                return Err(BuildFailure {
                    name: name.to_string(),
                    reason: format!("required environment key '{}' is not set", key),
                });
            }
        }

        tracing::info!(fixture = %name, params = ?call.params, "Building fixture");
        let client = self.client.clone().with_retry(retry);
        let ctx = FixtureContext::new(name, client, scope);
        let mut outputs = fixture
            .build(&ctx, &call.params)
            .await
            .map_err(|e| BuildFailure::from_error(name, e))?;

        let declared = fixture.outputs();
        if let Some(missing) = declared.iter().find(|key| !outputs.contains(key)) {
            return Err(BuildFailure {
                name: name.to_string(),
                reason: format!("declared output '{}' was not produced", missing),
            });
        }
        outputs.retain_declared(&declared);

        tracing::info!(fixture = %name, outputs = ?outputs, "Fixture built");
        Ok(outputs)
    }

    /// Write a finished plan's outputs in one batch and record key ownership
    fn commit(&self, env: &Environment, built: &[(String, Outputs)]) {
        {
            let mut owners = self.owners.lock();
            for (fixture, outputs) in built {
                for key in outputs.keys() {
                    let owner_key = format!("{}::{}", env.namespace(), key);
                    if let Some(previous) = owners.insert(owner_key, fixture.clone()) {
                        if previous != *fixture {
                            tracing::warn!(
                                key,
                                previous = %previous,
                                fixture = %fixture,
                                "Fixture overwrote a key owned by another fixture"
                            );
                        }
                    }
                }
            }
        }
        env.merge(built.iter().flat_map(|(_, outputs)| {
            outputs.iter().map(|(k, v)| (k.clone(), v.clone()))
        }));
    }

    /// Fixture that last wrote `key` in the given environment, if any
    pub fn owner_of(&self, env: &Environment, key: &str) -> Option<String> {
        self.owners
            .lock()
            .get(&format!("{}::{}", env.namespace(), key))
            .cloned()
    }
}
