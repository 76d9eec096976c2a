//! `{{placeholder}}` templates
//!
//! A template is parsed once into literal and placeholder segments and then
//! rendered against an [`Environment`] in a single pass. Substituted values
//! are never re-scanned, so a value that itself contains `{{` is emitted
//! literally.
//!
//! `{{` cannot appear in valid JSON, so it always opens a placeholder. A bare
//! `}}` (two nested objects closing) is literal text.

use std::fmt;

use crate::common::{Error, Result};
use crate::env::{render_value, Environment};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// One piece of a parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find(OPEN) {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + OPEN.len()..];
            let end = after_open.find(CLOSE).ok_or_else(|| {
                Error::malformed_template(source, offset + start, "'{{' without closing '}}'")
            })?;
            let key = after_open[..end].trim();
            validate_key(key).map_err(|reason| {
                Error::malformed_template(source, offset + start, reason)
            })?;
            segments.push(Segment::Placeholder(key.to_string()));

            let consumed = start + OPEN.len() + end + CLOSE.len();
            rest = &rest[consumed..];
            offset += consumed;
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Original template text
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Keys referenced by this template, in order of appearance
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(key) => Some(key.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Render against the environment
    ///
    /// Fails on the first unset key; nothing partial is returned.
    pub fn render(&self, env: &Environment) -> Result<String> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(key) => out.push_str(&render_value(&env.get(key)?)),
            }
        }
        Ok(out)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn validate_key(key: &str) -> std::result::Result<(), &'static str> {
    if key.is_empty() {
        return Err("empty placeholder");
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err("placeholder names may only contain letters, digits, '_', '-' and '.'");
    }
    Ok(())
}

/// Parse and render in one step
pub fn substitute(template: &str, env: &Environment) -> Result<String> {
    Template::parse(template)?.render(env)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn env() -> Environment {
        let env = Environment::new();
        env.set("event_id", "6f1c");
        env.set("ticket_type_id", "tt-2");
        env.set("org_member_token", "secret");
        env
    }

    #[test]
    fn test_substitutes_path_placeholders() {
        let out = substitute(
            "/events/{{event_id}}/ticket_types/{{ticket_type_id}}",
            &env(),
        )
        .unwrap();
        assert_eq!(out, "/events/6f1c/ticket_types/tt-2");
    }

    #[test]
    fn test_matches_direct_concatenation() {
        let env = env();
        let out = substitute("Bearer {{org_member_token}}", &env).unwrap();
        assert_eq!(out, format!("Bearer {}", env.get_str("org_member_token").unwrap()));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_whitespace_inside_delimiters_is_trimmed() {
        assert_eq!(substitute("{{ event_id }}", &env()).unwrap(), "6f1c");
    }

    #[test]
    fn test_undefined_variable_aborts() {
        let err = substitute("/events/{{event_id}}/{{missing}}", &env()).unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable(ref k) if k == "missing"));
    }

    #[test]
    fn test_placeholder_as_whole_json_value() {
        let env = env();
        env.set("start_date", Value::Null);
        env.set("quantity", json!(51));
        let body = substitute(
            r#"{"start_date": {{start_date}}, "items": [{"quantity": {{quantity}}}]}"#,
            &env,
        )
        .unwrap();
        let parsed: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["start_date"], Value::Null);
        assert_eq!(parsed["items"][0]["quantity"], json!(51));
    }

    #[test]
    fn test_nested_json_closing_braces_are_literal() {
        let tpl = Template::parse(r#"{"a": {"b": "{{event_id}}"}}"#).unwrap();
        assert_eq!(tpl.placeholders().collect::<Vec<_>>(), vec!["event_id"]);
        assert_eq!(tpl.render(&env()).unwrap(), r#"{"a": {"b": "6f1c"}}"#);
    }

    #[test]
    fn test_single_pass_no_rescan() {
        let env = env();
        env.set("sneaky", "{{org_member_token}}");
        assert_eq!(substitute("x={{sneaky}}", &env).unwrap(), "x={{org_member_token}}");
    }

    #[test]
    fn test_unterminated_placeholder_is_malformed() {
        let err = Template::parse("/events/{{event_id").unwrap_err();
        assert!(matches!(err, Error::MalformedTemplate { offset: 8, .. }));
    }

    #[test]
    fn test_invalid_key_is_malformed() {
        assert!(matches!(
            Template::parse("{{}}").unwrap_err(),
            Error::MalformedTemplate { .. }
        ));
        assert!(matches!(
            Template::parse(r#"{{"a": 1}}"#).unwrap_err(),
            Error::MalformedTemplate { .. }
        ));
    }

    #[test]
    fn test_plain_text_is_single_literal() {
        let tpl = Template::parse("/events?query=&page=0&status=Published").unwrap();
        assert_eq!(tpl.segments().len(), 1);
        assert_eq!(tpl.placeholders().count(), 0);
    }
}
