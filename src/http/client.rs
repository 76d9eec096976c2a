//! HTTP client for the system under test
//!
//! Wraps `reqwest` with template resolution, exchange logging and an opt-in
//! transport retry policy. HTTP error statuses are returned as responses;
//! only network failures and substitution errors surface as `Err`.

use std::time::{Duration, Instant};

use crate::common::config::Config;
use crate::common::{truncate_for_display, Error, Result};
use crate::env::Environment;

use super::request::{RequestTemplate, ResolvedRequest};
use super::response::Response;

/// Bounded retries on transport errors
///
/// The default is zero retries so that real failures stay visible.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }
}

/// Client bound to one server base URL
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryPolicy::default(),
        })
    }

    /// Create a client from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryPolicy::new(
            config.runner.transport_retries,
            Duration::from_millis(config.runner.retry_backoff_ms),
        );
        Ok(Self::new(&config.server.base_url, config.request_timeout())?.with_retry(retry))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Resolve a template and send it
    pub async fn execute(&self, template: &RequestTemplate, env: &Environment) -> Result<Response> {
        let request = template.resolve(env)?;
        self.send(&request).await
    }

    /// Resolve a template and send it with an explicit retry policy
    pub async fn execute_with_retry(
        &self,
        template: &RequestTemplate,
        env: &Environment,
        retry: RetryPolicy,
    ) -> Result<Response> {
        let request = template.resolve(env)?;
        self.send_with_retry(&request, retry).await
    }

    /// Send an already resolved request using the client's retry policy
    pub async fn send(&self, request: &ResolvedRequest) -> Result<Response> {
        self.send_with_retry(request, self.retry).await
    }

    async fn send_with_retry(&self, request: &ResolvedRequest, retry: RetryPolicy) -> Result<Response> {
        let mut attempt = 0;
        loop {
            match self.send_once(request).await {
                Err(e) if e.is_transport() && attempt < retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        method = %request.method,
                        path = %request.path,
                        attempt,
                        error = %e,
                        "Transport error, retrying"
                    );
                    tokio::time::sleep(retry.backoff).await;
                }
                result => return result,
            }
        }
    }

    /// Full URL for a resolved path
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn send_once(&self, request: &ResolvedRequest) -> Result<Response> {
        let url = self.url_for(&request.path);
        let mut builder = self.client.request(request.method.into(), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        tracing::debug!(
            method = %request.method,
            %url,
            headers = ?request.headers,
            body = request.body.as_deref().unwrap_or(""),
            "HTTP request"
        );

        let started = Instant::now();
        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let headers = resp.headers().clone();
        let raw_body = resp.bytes().await?.to_vec();
        let elapsed = started.elapsed();

        let json = if raw_body.is_empty() {
            None
        } else {
            serde_json::from_slice(&raw_body).ok()
        };

        let response = Response {
            request: request.clone(),
            url,
            status,
            headers,
            raw_body,
            json,
            elapsed,
        };

        tracing::debug!(
            status,
            elapsed_ms = elapsed.as_millis() as u64,
            etag = response.etag().unwrap_or(""),
            body = %truncate_for_display(&response.body_text(), 2000),
            "HTTP response"
        );

        Ok(response)
    }
}
