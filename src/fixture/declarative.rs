//! Fixtures defined in YAML
//!
//! ```yaml
//! name: publish_event
//! description: Create and publish an event
//! depends_on:
//!   - name: create_event
//!     params: { name: "cache fixture" }
//! requires: [org_member_token]
//! steps:
//!   - name: publish
//!     request:
//!       method: POST
//!       path: /events/{{event_id}}/publish
//!       auth: org_member
//!     expect: 2xx
//!     extract:
//!       published_at: /published_at
//! outputs: [event_id, published_at]
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::common::paths::collect_yaml_files;
use crate::common::{Error, Result};
use crate::http::{RequestTemplate, StatusClass};

use super::{Fixture, FixtureCall, FixtureContext, Outputs, Params};

/// A fixture loaded from a YAML document
#[derive(Debug, Clone, Deserialize)]
pub struct DeclarativeFixture {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<FixtureCall>,
    /// Environment keys that must be set before building
    #[serde(default)]
    pub requires: Vec<String>,
    /// Parameter defaults; call parameters take precedence
    #[serde(default)]
    pub params: Params,
    pub steps: Vec<FixtureStep>,
    pub outputs: Vec<String>,
}

/// One request within a declarative fixture
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureStep {
    pub name: String,
    pub request: RequestTemplate,
    #[serde(default = "default_expect")]
    pub expect: StatusClass,
    /// Build-scope key → response source (`/pointer`, `header:<name>`, `status`)
    #[serde(default)]
    pub extract: BTreeMap<String, String>,
}

fn default_expect() -> StatusClass {
    StatusClass::Success
}

impl DeclarativeFixture {
    /// Parse a fixture document
    pub fn from_yaml(content: &str, origin: &str) -> Result<Self> {
        let fixture: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::scenario_parse(origin, e.to_string()))?;
        if fixture.steps.is_empty() {
            return Err(Error::scenario_parse(
                origin,
                format!("fixture '{}' has no steps", fixture.name),
            ));
        }
        Ok(fixture)
    }
}

#[async_trait]
impl Fixture for DeclarativeFixture {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }

    fn dependencies(&self, _params: &Params) -> Vec<FixtureCall> {
        self.depends_on.clone()
    }

    fn required_keys(&self) -> Vec<String> {
        self.requires.clone()
    }

    fn outputs(&self) -> Vec<String> {
        self.outputs.clone()
    }

    async fn build(&self, ctx: &FixtureContext, params: &Params) -> Result<Outputs> {
        for (key, value) in &self.params {
            if !params.contains_key(key) {
                ctx.set(key.clone(), value.clone());
            }
        }

        for step in &self.steps {
            let response = ctx.request(&step.name, &step.request, step.expect).await?;
            for (key, source) in &step.extract {
                let value = ctx.extract(&step.name, &response, source)?;
                ctx.set(key.clone(), value);
            }
        }

        let keys: Vec<&str> = self.outputs.iter().map(String::as_str).collect();
        ctx.outputs(&keys)
    }
}

/// Load every fixture document under a directory
pub fn load_fixture_dir(dir: &Path) -> Result<Vec<DeclarativeFixture>> {
    let mut fixtures = Vec::new();
    for path in collect_yaml_files(&[dir.to_path_buf()])? {
        let content = std::fs::read_to_string(&path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        fixtures.push(DeclarativeFixture::from_yaml(
            &content,
            &path.display().to_string(),
        )?);
    }
    Ok(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PUBLISH: &str = r#"
name: publish_event
description: Create and publish an event
depends_on:
  - name: create_event
    params: { name: "cache fixture" }
requires: [org_member_token]
params:
  visibility: Always
steps:
  - name: publish
    request:
      method: POST
      path: /events/{{event_id}}/publish
      auth: org_member
    extract:
      published_at: /published_at
outputs: [event_id, published_at]
"#;

    #[test]
    fn test_parse_declarative_fixture() {
        let fixture = DeclarativeFixture::from_yaml(PUBLISH, "publish.yaml").unwrap();
        assert_eq!(fixture.name(), "publish_event");
        assert_eq!(fixture.steps[0].expect, StatusClass::Success);
        assert_eq!(
            fixture.dependencies(&Params::new()),
            vec![FixtureCall::new("create_event").param("name", "cache fixture")]
        );
        assert_eq!(fixture.required_keys(), vec!["org_member_token"]);
        assert_eq!(fixture.params.get("visibility"), Some(&json!("Always")));
    }

    #[test]
    fn test_fixture_without_steps_rejected() {
        let err = DeclarativeFixture::from_yaml("name: x\nsteps: []\noutputs: []\n", "x.yaml")
            .unwrap_err();
        assert!(matches!(err, Error::ScenarioParse { .. }));
    }

    #[test]
    fn test_load_fixture_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("publish.yaml"), PUBLISH).unwrap();
        let fixtures = load_fixture_dir(dir.path()).unwrap();
        assert_eq!(fixtures.len(), 1);
        assert_eq!(fixtures[0].outputs, vec!["event_id", "published_at"]);
    }
}
