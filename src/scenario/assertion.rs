//! Assertion evaluation
//!
//! Assertions read the responses captured during the action phase and the
//! environment as it stood when that phase ended. They never send requests
//! and never change state.

use serde_json::Value;

use crate::common::truncate_for_display;
use crate::env::{render_value, Environment};
use crate::http::Response;
use crate::template::Template;

use super::config::{Assertion, EnvExpectation, HeaderExpectation, JsonExpectation};
use super::report::AssertionOutcome;

/// A response labelled with the action that produced it
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub label: String,
    pub response: Response,
}

/// Evaluate one assertion; the first failed check decides the message
pub fn evaluate(
    assertion: &Assertion,
    responses: &[CapturedResponse],
    env: &Environment,
) -> AssertionOutcome {
    match check(assertion, responses, env) {
        Ok(()) => AssertionOutcome::pass(&assertion.name),
        Err(message) => AssertionOutcome::fail(&assertion.name, message),
    }
}

fn check(
    assertion: &Assertion,
    responses: &[CapturedResponse],
    env: &Environment,
) -> std::result::Result<(), String> {
    if let Some(expected) = &assertion.env {
        check_env(expected, env)?;
    }

    let needs_response = assertion.status.is_some()
        || assertion.status_class.is_some()
        || assertion.body_empty.is_some()
        || assertion.json.is_some()
        || assertion.header.is_some();
    if !needs_response {
        return Ok(());
    }

    let response = select(assertion.response.as_deref(), responses)?;

    if let Some(status) = assertion.status {
        if response.status != status {
            return Err(format!(
                "expected status {}, got {} (body: {})",
                status,
                response.status,
                truncate_for_display(&response.body_text(), 200)
            ));
        }
    }
    if let Some(class) = assertion.status_class {
        if !class.contains(response.status) {
            return Err(format!("expected {} status, got {}", class, response.status));
        }
    }
    if let Some(empty) = assertion.body_empty {
        if response.is_body_empty() != empty {
            return Err(if empty {
                format!(
                    "expected empty body, got '{}'",
                    truncate_for_display(&response.body_text(), 200)
                )
            } else {
                "expected a body, got none".to_string()
            });
        }
    }
    if let Some(json) = &assertion.json {
        check_json(json, response, env)?;
    }
    if let Some(header) = &assertion.header {
        check_header(header, response, env)?;
    }
    Ok(())
}

fn select<'a>(
    label: Option<&str>,
    responses: &'a [CapturedResponse],
) -> std::result::Result<&'a Response, String> {
    match label {
        Some(label) => responses
            .iter()
            .find(|r| r.label == label)
            .map(|r| &r.response)
            .ok_or_else(|| format!("no response recorded for action '{}'", label)),
        None => responses
            .last()
            .map(|r| &r.response)
            .ok_or_else(|| "no response recorded".to_string()),
    }
}

/// An expected value, noting whether it was rendered from a template
struct Expected {
    value: Value,
    templated: bool,
}

/// Resolve placeholders inside expected string values
fn expected_value(value: &Value, env: &Environment) -> std::result::Result<Expected, String> {
    match value {
        Value::String(text) if text.contains("{{") => Template::parse(text)
            .and_then(|t| t.render(env))
            .map(|rendered| Expected {
                value: Value::String(rendered),
                templated: true,
            })
            .map_err(|e| format!("cannot resolve expected value: {}", e)),
        other => Ok(Expected {
            value: other.clone(),
            templated: false,
        }),
    }
}

/// Equal, or for templated expectations, equal once both sides are text
///
/// Lets `"{{quantity}}"` match a numeric `6` in the body while a literal
/// `"6"` still only matches the string.
fn values_match(actual: &Value, expected: &Expected) -> bool {
    *actual == expected.value
        || (expected.templated && render_value(actual) == render_value(&expected.value))
}

fn check_json(
    expected: &JsonExpectation,
    response: &Response,
    env: &Environment,
) -> std::result::Result<(), String> {
    let actual = response.pointer(&expected.pointer);

    if let Some(exists) = expected.exists {
        if actual.is_some() != exists {
            return Err(if exists {
                format!("expected a value at '{}'", expected.pointer)
            } else {
                format!("expected nothing at '{}'", expected.pointer)
            });
        }
    }

    if let Some(value) = &expected.equals {
        let value = expected_value(value, env)?;
        match actual {
            Some(actual) if values_match(actual, &value) => {}
            Some(actual) => {
                return Err(format!(
                    "expected {} at '{}', got {}",
                    value.value, expected.pointer, actual
                ))
            }
            // An absent field matches an expected null
            None if value.value.is_null() => {}
            None => {
                return Err(format!(
                    "expected {} at '{}', found nothing",
                    value.value, expected.pointer
                ))
            }
        }
    }

    if let Some(needle) = &expected.contains {
        let needle = Template::parse(needle)
            .and_then(|t| t.render(env))
            .map_err(|e| format!("cannot resolve expected value: {}", e))?;
        let haystack = actual.map(render_value).unwrap_or_default();
        if !haystack.contains(&needle) {
            return Err(format!(
                "expected '{}' to contain '{}'",
                haystack, needle
            ));
        }
    }
    Ok(())
}

fn check_header(
    expected: &HeaderExpectation,
    response: &Response,
    env: &Environment,
) -> std::result::Result<(), String> {
    let actual = response.header(&expected.name);

    if let Some(present) = expected.present {
        if actual.is_some() != present {
            return Err(if present {
                format!("expected header '{}'", expected.name)
            } else {
                format!("unexpected header '{}'", expected.name)
            });
        }
    }

    if let Some(value) = &expected.equals {
        let value = Template::parse(value)
            .and_then(|t| t.render(env))
            .map_err(|e| format!("cannot resolve expected value: {}", e))?;
        if actual != Some(value.as_str()) {
            return Err(format!(
                "expected header '{}: {}', got {:?}",
                expected.name, value, actual
            ));
        }
    }
    Ok(())
}

fn check_env(expected: &EnvExpectation, env: &Environment) -> std::result::Result<(), String> {
    let actual = env.get(&expected.key).ok();

    if let Some(present) = expected.present {
        if actual.is_some() != present {
            return Err(if present {
                format!("expected '{}' to be set", expected.key)
            } else {
                format!("expected '{}' to be unset", expected.key)
            });
        }
    }

    if let Some(value) = &expected.equals {
        let value = expected_value(value, env)?;
        match &actual {
            Some(actual) if values_match(actual, &value) => {}
            Some(actual) => {
                return Err(format!(
                    "expected '{}' to be {}, got {}",
                    expected.key, value.value, actual
                ))
            }
            None => return Err(format!("'{}' is not set", expected.key)),
        }
    }
    Ok(())
}
