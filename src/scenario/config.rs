//! Scenario definitions
//!
//! Defines the data structures for deserializing YAML scenarios.
//!
//! ```yaml
//! name: OrgMember - Update External Event To Be Sold Out
//! actions:
//!   - id: update
//!     method: PUT
//!     path: /events/{{external_event_id}}
//!     auth: org_member
//!     body: |
//!       {"name": "It's my party", "override_status": "SoldOut"}
//! assertions:
//!   - name: should be 200
//!     status: 200
//!   - name: override status is SoldOut
//!     json: { pointer: /override_status, equals: SoldOut }
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::{Error, Result};
use crate::fixture::FixtureCall;
use crate::http::{RequestTemplate, StatusClass};

use super::cache::ConditionalCache;

/// A complete scenario loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
pub struct Scenario {
    /// Name of the scenario
    pub name: String,
    /// Optional description of what the scenario verifies
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Parallel lane; scenarios without a group share the root environment
    pub group: Option<String>,
    /// Overrides the runner's scenario timeout
    pub timeout_secs: Option<u64>,
    /// Opt-in transport retries for requests in this scenario
    pub retries: Option<u32>,
    /// Fixtures built during setup
    #[serde(default)]
    pub fixtures: Vec<FixtureCall>,
    /// Preparatory requests; each must meet its expectation (default 2xx)
    #[serde(default)]
    pub setup: Vec<RequestStep>,
    /// Requests under test
    #[serde(default)]
    pub actions: Vec<RequestStep>,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    /// Cleanup requests, always attempted
    #[serde(default)]
    pub teardown: Vec<RequestStep>,
    /// Reusable scenario shape expanded at load time
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub template: Option<ScenarioTemplate>,
}

/// Reusable scenario shapes
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioTemplate {
    ConditionalCache(ConditionalCache),
}

/// A request within a scenario phase
#[derive(Deserialize, Debug, Clone)]
pub struct RequestStep {
    /// Label that assertions use to pick this response
    pub id: Option<String>,
    #[serde(flatten)]
    pub request: RequestTemplate,
    /// Status requirement; enforced for setup, informational elsewhere
    pub expect: Option<StatusExpectation>,
    /// Environment key → response source (`/pointer`, `header:<name>`, `status`)
    #[serde(default)]
    pub capture: BTreeMap<String, String>,
}

impl RequestStep {
    pub fn new(request: RequestTemplate) -> Self {
        Self {
            id: None,
            request,
            expect: None,
            capture: BTreeMap::new(),
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn expect(mut self, expect: StatusExpectation) -> Self {
        self.expect = Some(expect);
        self
    }

    pub fn capture(mut self, key: impl Into<String>, source: impl Into<String>) -> Self {
        self.capture.insert(key.into(), source.into());
        self
    }

    /// Label used in reports: the id, or the phase name and position
    pub fn label(&self, phase: &str, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}#{}", phase, index + 1))
    }
}

/// Exact status or status class
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(untagged)]
pub enum StatusExpectation {
    Code(u16),
    Class(StatusClass),
}

impl StatusExpectation {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            StatusExpectation::Code(code) => *code == status,
            StatusExpectation::Class(class) => class.contains(status),
        }
    }
}

impl std::fmt::Display for StatusExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusExpectation::Code(code) => write!(f, "{}", code),
            StatusExpectation::Class(class) => write!(f, "{}", class),
        }
    }
}

/// A named assertion; every check that is set must hold
#[derive(Deserialize, Debug, Clone)]
pub struct Assertion {
    pub name: String,
    /// Action id to read; defaults to the last action
    pub response: Option<String>,
    /// Expected exact status
    pub status: Option<u16>,
    /// Expected status class
    pub status_class: Option<StatusClass>,
    /// Whether the body should be empty
    pub body_empty: Option<bool>,
    pub json: Option<JsonExpectation>,
    pub header: Option<HeaderExpectation>,
    /// Check a value in the environment as frozen after the action phase
    pub env: Option<EnvExpectation>,
}

/// Assertion on a JSON pointer in the body
#[derive(Deserialize, Debug, Clone)]
pub struct JsonExpectation {
    pub pointer: String,
    /// Expected value; string values may contain placeholders
    pub equals: Option<Value>,
    pub exists: Option<bool>,
    /// Substring of the rendered value
    pub contains: Option<String>,
}

/// Assertion on a response header
#[derive(Deserialize, Debug, Clone)]
pub struct HeaderExpectation {
    pub name: String,
    pub equals: Option<String>,
    pub present: Option<bool>,
}

/// Assertion on an environment key
#[derive(Deserialize, Debug, Clone)]
pub struct EnvExpectation {
    pub key: String,
    pub equals: Option<Value>,
    pub present: Option<bool>,
}

impl Assertion {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            response: None,
            status: None,
            status_class: None,
            body_empty: None,
            json: None,
            header: None,
            env: None,
        }
    }

    /// Expect an exact status
    pub fn status(name: impl Into<String>, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::named(name)
        }
    }

    /// Expect an empty (or non-empty) body
    pub fn body_empty(name: impl Into<String>, empty: bool) -> Self {
        Self {
            body_empty: Some(empty),
            ..Self::named(name)
        }
    }

    /// Expect a JSON pointer to equal a value
    pub fn json_equals(name: impl Into<String>, pointer: &str, value: impl Into<Value>) -> Self {
        Self {
            json: Some(JsonExpectation {
                pointer: pointer.to_string(),
                equals: Some(value.into()),
                exists: None,
                contains: None,
            }),
            ..Self::named(name)
        }
    }

    /// Expect a header to be present
    pub fn header_present(name: impl Into<String>, header: &str) -> Self {
        Self {
            header: Some(HeaderExpectation {
                name: header.to_string(),
                equals: None,
                present: Some(true),
            }),
            ..Self::named(name)
        }
    }

    /// Read the response of the action with this id
    pub fn on(mut self, action_id: impl Into<String>) -> Self {
        self.response = Some(action_id.into());
        self
    }

    fn has_checks(&self) -> bool {
        self.status.is_some()
            || self.status_class.is_some()
            || self.body_empty.is_some()
            || self.json.is_some()
            || self.header.is_some()
            || self.env.is_some()
    }
}

impl Scenario {
    /// Create an empty scenario
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            tags: Vec::new(),
            group: None,
            timeout_secs: None,
            retries: None,
            fixtures: Vec::new(),
            setup: Vec::new(),
            actions: Vec::new(),
            assertions: Vec::new(),
            teardown: Vec::new(),
            template: None,
        }
    }

    /// Load a scenario file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_yaml(&content, &path.display().to_string())
    }

    /// Parse, expand templates and validate a scenario document
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        let mut scenario: Scenario = serde_yaml::from_str(content)
            .map_err(|e| Error::scenario_parse(origin, e.to_string()))?;
        scenario.expand_template();
        scenario
            .validate()
            .map_err(|reason| Error::scenario_parse(origin, reason))?;
        Ok(scenario)
    }

    fn expand_template(&mut self) {
        if let Some(template) = self.template.take() {
            match template {
                ScenarioTemplate::ConditionalCache(cache) => cache.expand_into(self),
            }
        }
    }

    /// Check internal consistency
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.actions.is_empty() {
            return Err(format!("scenario '{}' has no actions", self.name));
        }
        let mut ids: Vec<&str> = Vec::new();
        for action in &self.actions {
            if let Some(id) = &action.id {
                if ids.contains(&id.as_str()) {
                    return Err(format!("duplicate action id '{}'", id));
                }
                ids.push(id);
            }
        }
        for assertion in &self.assertions {
            if !assertion.has_checks() {
                return Err(format!("assertion '{}' checks nothing", assertion.name));
            }
            if let Some(target) = &assertion.response {
                if !ids.contains(&target.as_str()) {
                    return Err(format!(
                        "assertion '{}' reads unknown action '{}'",
                        assertion.name, target
                    ));
                }
            }
        }
        Ok(())
    }

    /// Whether the scenario matches a name/tag filter
    pub fn matches_filter(&self, filter: &str) -> bool {
        let filter = filter.to_lowercase();
        self.name.to_lowercase().contains(&filter)
            || self.tags.iter().any(|t| t.to_lowercase() == filter)
    }
}
