//! Configuration file handling
//!
//! The configuration points the harness at an environment: base URL, bearer
//! tokens for each role, and seed identifiers referenced by placeholders.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};
use crate::env::Environment;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Bearer tokens per role
    #[serde(default)]
    pub tokens: Tokens,

    /// Fixed seed values, written into the environment as-is
    #[serde(default)]
    pub variables: BTreeMap<String, toml::Value>,

    /// Runner settings
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Server settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Base URL every request path is appended to
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8088".to_string()
}
fn default_request_timeout() -> u64 {
    30
}

/// Pre-provisioned bearer tokens
///
/// Each token is seeded as `<role>_token`, which is also what the `auth:`
/// request shorthand expands to.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Tokens {
    /// Organization member
    pub org_member: Option<String>,
    /// Box-office operator
    pub org_boxoffice: Option<String>,
    /// End user
    pub user: Option<String>,
}

/// Runner settings
#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// Timeout for one whole scenario
    #[serde(default = "default_scenario_timeout")]
    pub scenario_timeout_secs: u64,

    /// Run grouped scenarios in concurrent lanes
    #[serde(default)]
    pub parallel: bool,

    /// Retries on transport errors only
    #[serde(default)]
    pub transport_retries: u32,

    /// Delay between transport retries
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            scenario_timeout_secs: default_scenario_timeout(),
            parallel: false,
            transport_retries: 0,
            retry_backoff_ms: default_retry_backoff(),
        }
    }
}

fn default_scenario_timeout() -> u64 {
    120
}
fn default_retry_backoff() -> u64 {
    250
}

const ENV_SERVER: &str = "CONFORMANCE_SERVER";
const ENV_TOKENS: [(&str, &str); 3] = [
    ("CONFORMANCE_ORG_MEMBER_TOKEN", "org_member"),
    ("CONFORMANCE_ORG_BOXOFFICE_TOKEN", "org_boxoffice"),
    ("CONFORMANCE_USER_TOKEN", "user"),
];

impl Config {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, the default config file is
    /// used when present, otherwise defaults. Environment overrides are
    /// applied last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse config text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(server) = std::env::var(ENV_SERVER) {
            self.server.base_url = server;
        }
        for (var, role) in ENV_TOKENS {
            if let Ok(token) = std::env::var(var) {
                *self.tokens.slot(role) = Some(token);
            }
        }
    }

    /// Request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Write server URL, tokens and seed variables into the environment
    pub fn seed(&self, env: &Environment) -> Result<()> {
        env.set("server", self.server.base_url.clone());
        for (role, token) in self.tokens.iter() {
            env.set(format!("{role}_token"), token.to_string());
        }
        for (key, value) in &self.variables {
            let value = serde_json::to_value(value)?;
            env.set(key.clone(), value);
        }
        Ok(())
    }
}

impl Tokens {
    fn slot(&mut self, role: &str) -> &mut Option<String> {
        match role {
            "org_member" => &mut self.org_member,
            "org_boxoffice" => &mut self.org_boxoffice,
            _ => &mut self.user,
        }
    }

    /// Iterate over the configured (role, token) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("org_member", self.org_member.as_deref()),
            ("org_boxoffice", self.org_boxoffice.as_deref()),
            ("user", self.user.as_deref()),
        ]
        .into_iter()
        .filter_map(|(role, token)| token.map(|t| (role, t)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_when_sections_missing() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.base_url, "http://localhost:8088");
        assert_eq!(config.runner.transport_retries, 0);
        assert_eq!(config.runner.scenario_timeout_secs, 120);
        assert!(!config.runner.parallel);
    }

    #[test]
    fn test_seed_writes_tokens_and_variables() {
        let config = Config::parse(
            r#"
            [server]
            base_url = "http://api.test"

            [tokens]
            org_member = "om"
            user = "u"

            [variables]
            organization_id = "org-1"
            ga_ticket_type_id = "tt-9"
            max_per_order = 50
            "#,
        )
        .unwrap();

        let env = Environment::new();
        config.seed(&env).unwrap();

        assert_eq!(env.get_str("server").unwrap(), "http://api.test");
        assert_eq!(env.get_str("org_member_token").unwrap(), "om");
        assert_eq!(env.get_str("user_token").unwrap(), "u");
        assert!(!env.has("org_boxoffice_token"));
        assert_eq!(env.get("max_per_order").unwrap(), json!(50));
        assert_eq!(env.get_str("ga_ticket_type_id").unwrap(), "tt-9");
    }

    #[test]
    fn test_invalid_toml_is_config_parse_error() {
        let err = Config::parse("[server\nbase_url = 1").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let err = Config::load(Some(Path::new("/no/such/config.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
