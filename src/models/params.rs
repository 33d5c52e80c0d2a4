use serde::Serialize;
use serde_json::{Map, Value};

/// Prefix of params used only for the host's auth dispatch
pub const INTERNAL_PREFIX: &str = "auth_";

/// Marks a signup as a guest registration
pub const GUEST_SIGNUP_MARKER: &str = "auth_guest_signup";

/// Nested entry fields of an auth form: `auth_entry[email]`, `auth_entry[password]`
pub const AUTH_ENTRY_PARAM: &str = "auth_entry";

/// Names the param holding the password, `password` when absent
pub const PASSWORD_FIELD_PARAM: &str = "auth_password_field";
pub const DEFAULT_PASSWORD_FIELD: &str = "password";

/// Prefix of params consumed by the ERP proxy itself (redirect targets)
pub const PROXY_PREFIX: &str = "invader_";

/// Immutable snapshot of request parameters.
///
/// Every transformation returns a new bag, so a bag handed to one operation
/// can never be altered by another.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ParamsBag(Map<String, Value>);

impl ParamsBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Build from decoded form/query pairs.
    ///
    /// Understands one level of bracket nesting: `a[b]=1` and `a[]=1`.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = Map::new();

        for (key, value) in pairs {
            let key = key.as_ref();
            let value = Value::String(value.into());

            match key.split_once('[') {
                Some((root, rest)) if rest.ends_with(']') && !root.is_empty() => {
                    let inner = &rest[..rest.len() - 1];
                    if inner.is_empty() {
                        let slot = map
                            .entry(root.to_string())
                            .or_insert_with(|| Value::Array(Vec::new()));
                        if let Value::Array(items) = slot {
                            items.push(value);
                        } else {
                            *slot = Value::Array(vec![value]);
                        }
                    } else {
                        let slot = map
                            .entry(root.to_string())
                            .or_insert_with(|| Value::Object(Map::new()));
                        if !slot.is_object() {
                            *slot = Value::Object(Map::new());
                        }
                        if let Value::Object(nested) = slot {
                            nested.insert(inner.to_string(), value);
                        }
                    }
                }
                _ => {
                    map.insert(key.to_string(), value);
                }
            }
        }

        Self(map)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Entry field of an auth form: `auth_entry[field]`, else the top-level `field`
    pub fn entry_value(&self, field: &str) -> Option<&Value> {
        self.0
            .get(AUTH_ENTRY_PARAM)
            .and_then(|entry| entry.get(field))
            .or_else(|| self.0.get(field))
    }

    pub fn entry_str(&self, field: &str) -> Option<&str> {
        self.entry_value(field).and_then(Value::as_str)
    }

    pub fn password_field(&self) -> &str {
        self.get_str(PASSWORD_FIELD_PARAM).unwrap_or(DEFAULT_PASSWORD_FIELD)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    pub fn with(&self, key: &str, value: impl Into<Value>) -> Self {
        let mut map = self.0.clone();
        map.insert(key.to_string(), value.into());
        Self(map)
    }

    /// Right-hand values win on conflicting keys
    pub fn merge(&self, other: &ParamsBag) -> Self {
        let mut map = self.0.clone();
        for (key, value) in &other.0 {
            map.insert(key.clone(), value.clone());
        }
        Self(map)
    }

    pub fn without_prefix(&self, prefix: &str) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !key.starts_with(prefix))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn without(&self, keys: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| !keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Drop every `auth_*` key, `auth_entry` included
    pub fn without_internal_keys(&self) -> Self {
        self.without_prefix(INTERNAL_PREFIX)
    }

    pub fn only(&self, keys: &[&str]) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(key, _)| keys.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    /// Flatten into query-string pairs (used for GET/DELETE calls)
    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        for (key, value) in &self.0 {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        pairs.push((format!("{}[]", key), scalar_to_string(item)));
                    }
                }
                Value::Object(nested) => {
                    for (sub, item) in nested {
                        pairs.push((format!("{}[{}]", key, sub), scalar_to_string(item)));
                    }
                }
                other => pairs.push((key.clone(), scalar_to_string(other))),
            }
        }

        pairs
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl From<Map<String, Value>> for ParamsBag {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
