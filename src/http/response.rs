//! Normalized responses

use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::request::ResolvedRequest;

/// Status code family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum StatusClass {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
}

impl StatusClass {
    pub fn of(status: u16) -> Option<Self> {
        match status {
            100..=199 => Some(StatusClass::Informational),
            200..=299 => Some(StatusClass::Success),
            300..=399 => Some(StatusClass::Redirection),
            400..=499 => Some(StatusClass::ClientError),
            500..=599 => Some(StatusClass::ServerError),
            _ => None,
        }
    }

    pub fn contains(&self, status: u16) -> bool {
        Self::of(status) == Some(*self)
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusClass::Informational => "1xx",
            StatusClass::Success => "2xx",
            StatusClass::Redirection => "3xx",
            StatusClass::ClientError => "4xx",
            StatusClass::ServerError => "5xx",
        };
        f.write_str(s)
    }
}

impl FromStr for StatusClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1xx" => Ok(StatusClass::Informational),
            "2xx" => Ok(StatusClass::Success),
            "3xx" => Ok(StatusClass::Redirection),
            "4xx" => Ok(StatusClass::ClientError),
            "5xx" => Ok(StatusClass::ServerError),
            other => Err(format!("unknown status class '{}', expected 1xx..5xx", other)),
        }
    }
}

impl TryFrom<String> for StatusClass {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A captured response
///
/// Any status is a valid response; only transport failures are errors.
#[derive(Debug, Clone)]
pub struct Response {
    /// The request that produced this response
    pub request: ResolvedRequest,
    /// Full URL the request was sent to
    pub url: String,
    pub status: u16,
    /// Case-insensitive header map
    pub headers: HeaderMap,
    pub raw_body: Vec<u8>,
    /// Parsed body, when it is JSON
    pub json: Option<Value>,
    pub elapsed: Duration,
}

impl Response {
    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `ETag` header, verbatim
    pub fn etag(&self) -> Option<&str> {
        self.header("etag")
    }

    pub fn status_class(&self) -> Option<StatusClass> {
        StatusClass::of(self.status)
    }

    pub fn is_success(&self) -> bool {
        StatusClass::Success.contains(self.status)
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.raw_body)
    }

    /// No content, or an empty JSON container
    pub fn is_body_empty(&self) -> bool {
        if self.body_text().trim().is_empty() {
            return true;
        }
        match &self.json {
            Some(Value::Object(map)) => map.is_empty(),
            Some(Value::Array(items)) => items.is_empty(),
            _ => false,
        }
    }

    /// Look up a JSON pointer (`/data/0/id`) in the body
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.json.as_ref().and_then(|json| json.pointer(pointer))
    }

    /// Pull a value out of the response
    ///
    /// `header:<name>` reads a header, `status` the status code, and anything
    /// else is a JSON pointer into the body (`""` is the whole body).
    pub fn capture(&self, source: &str) -> Option<Value> {
        if let Some(name) = source.strip_prefix("header:") {
            return self.header(name.trim()).map(|v| Value::String(v.to_string()));
        }
        if source == "status" {
            return Some(Value::from(self.status));
        }
        self.pointer(source).cloned()
    }
}

#[cfg(test)]
pub(crate) fn test_response(status: u16, headers: &[(&str, &str)], body: &str) -> Response {
    use reqwest::header::{HeaderName, HeaderValue};

    let mut map = HeaderMap::new();
    for (name, value) in headers {
        map.insert(
            HeaderName::from_bytes(name.as_bytes()).unwrap(),
            HeaderValue::from_str(value).unwrap(),
        );
    }
    Response {
        request: ResolvedRequest {
            method: super::HttpMethod::Get,
            path: "/test".to_string(),
            headers: Vec::new(),
            body: None,
        },
        url: "http://localhost/test".to_string(),
        status,
        headers: map,
        raw_body: body.as_bytes().to_vec(),
        json: serde_json::from_str(body).ok(),
        elapsed: Duration::from_millis(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_class_parse_and_contains() {
        assert_eq!("2xx".parse::<StatusClass>().unwrap(), StatusClass::Success);
        assert_eq!("4XX".parse::<StatusClass>().unwrap(), StatusClass::ClientError);
        assert!("7xx".parse::<StatusClass>().is_err());
        assert!(StatusClass::ClientError.contains(422));
        assert!(!StatusClass::Success.contains(304));
        assert_eq!(StatusClass::of(304), Some(StatusClass::Redirection));
    }

    #[test]
    fn test_etag_is_case_insensitive_and_verbatim() {
        let resp = test_response(200, &[("ETag", "W/\"5f2a\"")], "[]");
        assert_eq!(resp.etag(), Some("W/\"5f2a\""));
        assert_eq!(resp.header("etag"), resp.header("ETAG"));
    }

    #[test]
    fn test_empty_body_detection() {
        assert!(test_response(304, &[], "").is_body_empty());
        assert!(test_response(200, &[], "{}").is_body_empty());
        assert!(!test_response(200, &[], r#"{"data": []}"#).is_body_empty());
        assert!(!test_response(200, &[], "not json").is_body_empty());
    }

    #[test]
    fn test_pointer_lookup() {
        let resp = test_response(200, &[], r#"{"data": [[0, [{"collectible_id": "c1"}]]]}"#);
        assert_eq!(resp.pointer("/data/0/1/0/collectible_id"), Some(&json!("c1")));
        assert!(resp.pointer("/missing").is_none());
    }

    #[test]
    fn test_capture_sources() {
        let resp = test_response(201, &[("ETag", "abc")], r#"{"id": "e1"}"#);
        assert_eq!(resp.capture("header:etag"), Some(json!("abc")));
        assert_eq!(resp.capture("status"), Some(json!(201)));
        assert_eq!(resp.capture("/id"), Some(json!("e1")));
        assert_eq!(resp.capture(""), Some(json!({"id": "e1"})));
        assert_eq!(resp.capture("header:location"), None);
    }
}
