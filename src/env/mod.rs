//! Environment store
//!
//! Run-scoped key/value state that templates are resolved against. An
//! `Environment` is a cheap handle: clones share the same scope. Child scopes
//! created with [`Environment::isolated`] read through to their parent and
//! keep their own writes, which is how concurrent scenario groups and fixture
//! builds avoid clobbering each other's keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::common::{Error, Result};

/// Namespace of the root scope
pub const ROOT_NAMESPACE: &str = "root";

/// Handle to one scope of the environment store
#[derive(Clone)]
pub struct Environment {
    scope: Arc<Scope>,
}

struct Scope {
    namespace: String,
    /// `None` marks a key removed in this scope, hiding any parent value
    values: RwLock<HashMap<String, Option<Value>>>,
    parent: Option<Environment>,
}

impl Environment {
    /// Create an empty root environment
    pub fn new() -> Self {
        Self {
            scope: Arc::new(Scope {
                namespace: ROOT_NAMESPACE.to_string(),
                values: RwLock::new(HashMap::new()),
                parent: None,
            }),
        }
    }

    /// Create a child scope
    ///
    /// Reads fall through to `self` when the child has no value; writes only
    /// land in the child.
    pub fn isolated(&self, namespace: impl Into<String>) -> Self {
        let namespace = format!("{}/{}", self.scope.namespace, namespace.into());
        Self {
            scope: Arc::new(Scope {
                namespace,
                values: RwLock::new(HashMap::new()),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Slash-separated path of this scope, e.g. `root/group-a`
    pub fn namespace(&self) -> &str {
        &self.scope.namespace
    }

    /// Read a value, failing with `UndefinedVariable` when unset
    pub fn get(&self, key: &str) -> Result<Value> {
        self.lookup(key)
            .ok_or_else(|| Error::UndefinedVariable(key.to_string()))
    }

    /// Read a value in the form it is spliced into templates
    ///
    /// Strings come back verbatim; other JSON values as JSON text.
    pub fn get_str(&self, key: &str) -> Result<String> {
        Ok(render_value(&self.get(key)?))
    }

    /// Check whether a key is set in this scope or any parent
    pub fn has(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Set a value, overwriting any previous one
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        tracing::trace!(namespace = %self.scope.namespace, %key, "env set");
        self.scope.values.write().insert(key, Some(value));
    }

    /// Unset a key as seen from this scope
    ///
    /// Later reads through this scope fail with `UndefinedVariable`, even if
    /// a parent scope still holds a value. Parents are not modified.
    pub fn remove(&self, key: &str) {
        tracing::trace!(namespace = %self.scope.namespace, %key, "env remove");
        let mut values = self.scope.values.write();
        match &self.scope.parent {
            Some(parent) if parent.has(key) => {
                values.insert(key.to_string(), None);
            }
            _ => {
                values.remove(key);
            }
        }
    }

    /// Write a batch of values under one lock
    ///
    /// Readers observe either none or all of the batch.
    pub fn merge<I, K>(&self, values: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut guard = self.scope.values.write();
        for (key, value) in values {
            guard.insert(key.into(), Some(value));
        }
    }

    /// Flattened copy of every visible key, child values shadowing parents
    pub fn snapshot(&self) -> HashMap<String, Value> {
        let mut values = match &self.scope.parent {
            Some(parent) => parent.snapshot(),
            None => HashMap::new(),
        };
        for (key, value) in self.scope.values.read().iter() {
            match value {
                Some(value) => values.insert(key.clone(), value.clone()),
                None => values.remove(key),
            };
        }
        values
    }

    /// Freeze the visible state into a new, parentless environment
    pub fn frozen(&self) -> Self {
        let env = Self::new();
        env.merge(self.snapshot());
        env
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(slot) = self.scope.values.read().get(key) {
            return slot.clone();
        }
        self.scope.parent.as_ref().and_then(|p| p.lookup(key))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.snapshot().into_keys().collect();
        keys.sort();
        f.debug_struct("Environment")
            .field("namespace", &self.scope.namespace)
            .field("keys", &keys)
            .finish()
    }
}

/// String form of a value as spliced into templates
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unset_key_is_undefined_variable() {
        let env = Environment::new();
        let err = env.get("event_id").unwrap_err();
        assert!(matches!(err, Error::UndefinedVariable(ref k) if k == "event_id"));
        assert!(!env.has("event_id"));
    }

    #[test]
    fn test_last_write_wins() {
        let env = Environment::new();
        env.set("event_id", "a");
        env.set("event_id", "b");
        assert_eq!(env.get_str("event_id").unwrap(), "b");
    }

    #[test]
    fn test_clones_share_state() {
        let env = Environment::new();
        let other = env.clone();
        other.set("etag", "W/\"abc\"");
        assert_eq!(env.get_str("etag").unwrap(), "W/\"abc\"");
    }

    #[test]
    fn test_get_str_renders_json_values() {
        let env = Environment::new();
        env.set("start", Value::Null);
        env.set("quantity", json!(51));
        env.set("flag", json!(true));
        assert_eq!(env.get_str("start").unwrap(), "null");
        assert_eq!(env.get_str("quantity").unwrap(), "51");
        assert_eq!(env.get_str("flag").unwrap(), "true");
    }

    #[test]
    fn test_isolated_scope_reads_parent_writes_local() {
        let root = Environment::new();
        root.set("server", "http://api");
        let group = root.isolated("group-a");
        group.set("event_id", "e1");

        assert_eq!(group.namespace(), "root/group-a");
        assert_eq!(group.get_str("server").unwrap(), "http://api");
        assert!(group.has("event_id"));
        assert!(!root.has("event_id"));

        group.set("server", "http://shadow");
        assert_eq!(group.get_str("server").unwrap(), "http://shadow");
        assert_eq!(root.get_str("server").unwrap(), "http://api");
    }

    #[test]
    fn test_merge_and_snapshot() {
        let root = Environment::new();
        root.set("a", 1);
        let child = root.isolated("c");
        child.merge([("b", json!(2)), ("a", json!(3))]);

        let snap = child.snapshot();
        assert_eq!(snap.get("a"), Some(&json!(3)));
        assert_eq!(snap.get("b"), Some(&json!(2)));
        assert_eq!(root.snapshot().len(), 1);
    }

    #[test]
    fn test_remove_unsets_key() {
        let env = Environment::new();
        env.set("cached_etag", "W/\"old\"");
        env.remove("cached_etag");
        assert!(!env.has("cached_etag"));
        assert!(matches!(
            env.get("cached_etag").unwrap_err(),
            Error::UndefinedVariable(ref k) if k == "cached_etag"
        ));
        env.remove("never_set");
    }

    #[test]
    fn test_remove_in_child_hides_parent_value() {
        let root = Environment::new();
        root.set("cached_etag", "W/\"root\"");
        let group = root.isolated("group-a");

        group.remove("cached_etag");
        assert!(!group.has("cached_etag"));
        assert!(!group.snapshot().contains_key("cached_etag"));
        assert_eq!(root.get_str("cached_etag").unwrap(), "W/\"root\"");

        group.set("cached_etag", "W/\"group\"");
        assert_eq!(group.get_str("cached_etag").unwrap(), "W/\"group\"");
    }

    #[test]
    fn test_frozen_does_not_observe_later_writes() {
        let env = Environment::new();
        env.set("etag", "one");
        let frozen = env.frozen();
        env.set("etag", "two");
        assert_eq!(frozen.get_str("etag").unwrap(), "one");
    }
}
