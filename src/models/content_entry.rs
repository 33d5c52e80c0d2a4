use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Content type name that carries ERP customer semantics
pub const CUSTOMERS: &str = "customers";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentType {
    pub name: String,
    pub slug: String,
    /// Declared fields; `ContentEntry::to_hash` reports them even when unset
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ContentType {
    pub fn new(name: &str, slug: &str, fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            slug: slug.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn is_customers(&self) -> bool {
        self.name == CUSTOMERS
    }
}

/// Field-level validation errors attached to an entry
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EntryErrors(BTreeMap<String, Vec<String>>);

impl EntryErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn on(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub content_type: ContentType,
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "EntryErrors::is_empty")]
    pub errors: EntryErrors,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentEntry {
    pub fn new(content_type: ContentType, fields: Map<String, Value>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().simple().to_string(),
            content_type,
            fields,
            errors: EntryErrors::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn email(&self) -> Option<&str> {
        self.fields.get("email").and_then(Value::as_str)
    }

    pub fn content_type_slug(&self) -> &str {
        &self.content_type.slug
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Every declared field (null when unset) merged with the stored values
    pub fn to_hash(&self) -> Map<String, Value> {
        let mut hash: Map<String, Value> = self
            .content_type
            .fields
            .iter()
            .map(|field| (field.clone(), Value::Null))
            .collect();

        for (key, value) in &self.fields {
            hash.insert(key.clone(), value.clone());
        }

        hash
    }

    pub fn apply(&mut self, values: Map<String, Value>) {
        if values.is_empty() {
            return;
        }
        for (key, value) in values {
            self.fields.insert(key, value);
        }
        self.updated_at = Utc::now();
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}
