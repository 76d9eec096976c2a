//! Conditional-cache scenario shape
//!
//! Verifies ETag revalidation for a read endpoint:
//!
//! 1. `GET endpoint` returns 200 with an `ETag`, captured as `cached_etag`.
//! 2. `GET endpoint` with `If-None-Match: {{cached_etag}}` returns 304 and an
//!    empty body.
//! 3. `GET other_endpoint` (a different query) with the same `If-None-Match`
//!    returns 200.

use serde::Deserialize;

use crate::http::RequestTemplate;

use super::config::{Assertion, RequestStep, Scenario};

/// Environment key the first response's ETag is captured into
pub const ETAG_KEY: &str = "cached_etag";

const INITIAL: &str = "initial";
const REVALIDATED: &str = "revalidated";
const OTHER_QUERY: &str = "other_query";

/// Parameters of the conditional-cache shape
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConditionalCache {
    /// Endpoint whose response is cached
    pub endpoint: String,
    /// Same resource with a different query
    pub other_endpoint: String,
    /// Role whose token authenticates the requests
    pub auth: Option<String>,
}

impl ConditionalCache {
    pub fn new(endpoint: impl Into<String>, other_endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            other_endpoint: other_endpoint.into(),
            auth: None,
        }
    }

    pub fn auth(mut self, role: impl Into<String>) -> Self {
        self.auth = Some(role.into());
        self
    }

    /// Build a complete scenario of this shape
    pub fn scenario(&self, name: impl Into<String>) -> Scenario {
        let mut scenario = Scenario::new(name);
        self.expand_into(&mut scenario);
        scenario
    }

    /// Append the three requests and four assertions to a scenario
    ///
    /// Anything already in the scenario (fixtures, setup, extra
    /// assertions) is kept; the generated actions run after existing ones.
    pub fn expand_into(&self, scenario: &mut Scenario) {
        let conditional = format!("{{{{{}}}}}", ETAG_KEY);

        scenario.actions.push(
            RequestStep::new(self.request(&self.endpoint))
                .id(INITIAL)
                .capture(ETAG_KEY, "header:etag"),
        );
        scenario.actions.push(
            RequestStep::new(
                self.request(&self.endpoint)
                    .header("If-None-Match", conditional.clone()),
            )
            .id(REVALIDATED),
        );
        scenario.actions.push(
            RequestStep::new(
                self.request(&self.other_endpoint)
                    .header("If-None-Match", conditional),
            )
            .id(OTHER_QUERY),
        );

        scenario.assertions.extend([
            Assertion::status("first response should be 200", 200).on(INITIAL),
            Assertion::status("same query with same etag status should be 304", 304)
                .on(REVALIDATED),
            Assertion::body_empty("same query with same etag response should be empty", true)
                .on(REVALIDATED),
            Assertion::status("different query with same etag should be 200", 200)
                .on(OTHER_QUERY),
        ]);
    }

    fn request(&self, path: &str) -> RequestTemplate {
        let request = RequestTemplate::get(path);
        match &self.auth {
            Some(role) => request.auth(role.clone()),
            None => request,
        }
    }
}
