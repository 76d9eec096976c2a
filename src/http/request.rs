//! Request templates and resolved requests

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::common::Result;
use crate::env::Environment;
use crate::template::Template;

/// HTTP methods used by scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
        }
    }
}

/// Request body as written in a scenario
///
/// Text bodies are substituted as raw text, so a placeholder may stand in
/// for a whole JSON value. Structured bodies are serialized first and then
/// substituted the same way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BodyTemplate {
    Text(String),
    Json(Value),
}

impl BodyTemplate {
    fn text(&self) -> Result<String> {
        Ok(match self {
            BodyTemplate::Text(text) => text.clone(),
            BodyTemplate::Json(value) => serde_json::to_string(value)?,
        })
    }
}

/// An unresolved request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestTemplate {
    pub method: HttpMethod,
    /// Path appended to the server base URL; may contain placeholders
    pub path: String,
    /// Header values may contain placeholders
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Role whose `<role>_token` is sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyTemplate>,
}

impl RequestTemplate {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            auth: None,
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Patch, path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn auth(mut self, role: impl Into<String>) -> Self {
        self.auth = Some(role.into());
        self
    }

    pub fn body(mut self, text: impl Into<String>) -> Self {
        self.body = Some(BodyTemplate::Text(text.into()));
        self
    }

    pub fn json(mut self, value: Value) -> Self {
        self.body = Some(BodyTemplate::Json(value));
        self
    }

    /// Every placeholder key this request references
    pub fn placeholders(&self) -> Result<Vec<String>> {
        fn collect(keys: &mut Vec<String>, text: &str) -> Result<()> {
            keys.extend(Template::parse(text)?.placeholders().map(str::to_string));
            Ok(())
        }

        let mut keys = Vec::new();
        collect(&mut keys, &self.path)?;
        for value in self.headers.values() {
            collect(&mut keys, value)?;
        }
        if let Some(role) = &self.auth {
            keys.push(token_key(role));
        }
        if let Some(body) = &self.body {
            collect(&mut keys, &body.text()?)?;
        }
        Ok(keys)
    }

    /// Resolve every part against the environment
    ///
    /// Path, each header value and the body are substituted independently.
    /// Any unset key fails the whole resolution, so nothing is ever sent with
    /// literal `{{key}}` text in it.
    pub fn resolve(&self, env: &Environment) -> Result<ResolvedRequest> {
        let path = Template::parse(&self.path)?.render(env)?;

        let mut headers: Vec<(String, String)> = Vec::new();
        headers.push(("Accept".to_string(), "application/json".to_string()));
        if self.body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if let Some(role) = &self.auth {
            let token = env.get_str(&token_key(role))?;
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        for (name, value) in &self.headers {
            let value = Template::parse(value)?.render(env)?;
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
            headers.push((name.clone(), value));
        }

        let body = match &self.body {
            Some(body) => Some(Template::parse(&body.text()?)?.render(env)?),
            None => None,
        };

        Ok(ResolvedRequest {
            method: self.method,
            path,
            headers,
            body,
        })
    }
}

/// Environment key holding the bearer token for a role
pub fn token_key(role: &str) -> String {
    format!("{}_token", role)
}

/// A fully substituted request, ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl ResolvedRequest {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
