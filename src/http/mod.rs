//! HTTP request builder
//!
//! Templates are resolved into [`ResolvedRequest`]s, sent with [`HttpClient`]
//! and normalized into [`Response`]s.

mod client;
mod request;
mod response;

pub use client::{HttpClient, RetryPolicy};
pub use request::{token_key, BodyTemplate, HttpMethod, RequestTemplate, ResolvedRequest};
pub use response::{Response, StatusClass};

#[cfg(test)]
pub(crate) use response::test_response;
