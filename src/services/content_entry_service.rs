// Content Entry Service
// Adapter over the host content store. The in-memory implementation backs the
// standalone server and the test suite.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::content_entry::{ContentEntry, ContentType};

#[derive(Error, Debug)]
pub enum ContentEntryError {
    #[error("Content entry not found: {slug}/{id}")]
    NotFound { slug: String, id: String },

    #[error("Content store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, ContentEntryError>;

#[async_trait]
pub trait ContentEntryService: Send + Sync {
    async fn create(&self, content_type: &ContentType, fields: Map<String, Value>) -> Result<ContentEntry>;

    async fn find(&self, slug: &str, id: &str) -> Result<Option<ContentEntry>>;

    async fn find_by(&self, slug: &str, field: &str, value: &Value) -> Result<Option<ContentEntry>>;

    /// Apply `values` to the entry in place and persist them
    async fn update_decorated_entry(&self, entry: &mut ContentEntry, values: Map<String, Value>) -> Result<()>;

    /// Returns whether an entry was removed
    async fn delete(&self, slug: &str, id: &str) -> Result<bool>;
}

#[derive(Debug, Default)]
pub struct InMemoryContentEntryService {
    entries: DashMap<(String, String), ContentEntry>,
}

impl InMemoryContentEntryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry as-is (fixtures)
    pub fn insert(&self, entry: ContentEntry) {
        self.entries
            .insert((entry.content_type.slug.clone(), entry.id.clone()), entry);
    }

    pub fn count(&self, slug: &str) -> usize {
        self.entries.iter().filter(|item| item.key().0 == slug).count()
    }

    pub fn contains(&self, slug: &str, id: &str) -> bool {
        self.entries.contains_key(&(slug.to_string(), id.to_string()))
    }
}

#[async_trait]
impl ContentEntryService for InMemoryContentEntryService {
    async fn create(&self, content_type: &ContentType, fields: Map<String, Value>) -> Result<ContentEntry> {
        let entry = ContentEntry::new(content_type.clone(), fields);
        self.insert(entry.clone());
        Ok(entry)
    }

    async fn find(&self, slug: &str, id: &str) -> Result<Option<ContentEntry>> {
        Ok(self
            .entries
            .get(&(slug.to_string(), id.to_string()))
            .map(|item| item.value().clone()))
    }

    async fn find_by(&self, slug: &str, field: &str, value: &Value) -> Result<Option<ContentEntry>> {
        Ok(self
            .entries
            .iter()
            .find(|item| item.key().0 == slug && item.value().get(field) == Some(value))
            .map(|item| item.value().clone()))
    }

    async fn update_decorated_entry(&self, entry: &mut ContentEntry, values: Map<String, Value>) -> Result<()> {
        let key = (entry.content_type.slug.clone(), entry.id.clone());

        let mut stored = self.entries.get_mut(&key).ok_or_else(|| ContentEntryError::NotFound {
            slug: key.0.clone(),
            id: key.1.clone(),
        })?;

        entry.apply(values);
        *stored = entry.clone();
        Ok(())
    }

    async fn delete(&self, slug: &str, id: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(&(slug.to_string(), id.to_string()))
            .is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn customers() -> ContentType {
        ContentType::new("customers", "customers", &["email", "role"])
    }

    fn fields(email: &str) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("email".to_string(), json!(email));
        fields
    }

    #[tokio::test]
    async fn test_create_find_delete() {
        let store = InMemoryContentEntryService::new();
        let entry = store.create(&customers(), fields("a@x.com")).await.unwrap();

        let found = store
            .find_by("customers", "email", &json!("a@x.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, entry.id);

        assert!(store.delete("customers", &entry.id).await.unwrap());
        assert!(!store.delete("customers", &entry.id).await.unwrap());
        assert!(store.find("customers", &entry.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_decorated_entry_persists() {
        let store = InMemoryContentEntryService::new();
        let mut entry = store.create(&customers(), fields("a@x.com")).await.unwrap();

        let mut values = Map::new();
        values.insert("role".to_string(), json!("vip"));
        store.update_decorated_entry(&mut entry, values).await.unwrap();

        assert_eq!(entry.get("role"), Some(&json!("vip")));
        let stored = store.find("customers", &entry.id).await.unwrap().unwrap();
        assert_eq!(stored.get("role"), Some(&json!("vip")));
    }

    #[tokio::test]
    async fn test_update_missing_entry_fails() {
        let store = InMemoryContentEntryService::new();
        let mut entry = ContentEntry::new(customers(), fields("a@x.com"));

        let result = store.update_decorated_entry(&mut entry, Map::new()).await;
        assert!(matches!(result, Err(ContentEntryError::NotFound { .. })));
    }
}
