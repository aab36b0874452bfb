use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use waypoint_common::error::{StoreError, StoreResult};

use crate::document::{Document, DocumentStore};

/// Process-local store. Used when no database is configured, and in tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("memory store lock poisoned".to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> StoreResult<Option<Document>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn set(
        &self,
        collection: &str,
        key: &str,
        fields: Document,
        merge: bool,
    ) -> StoreResult<()> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(key) {
            Some(existing) if merge => existing.extend(fields),
            _ => {
                docs.insert(key.to_string(), fields);
            }
        }
        Ok(())
    }

    async fn list(&self, collection: &str) -> StoreResult<Vec<(String, Document)>> {
        let collections = self.collections.read().map_err(|_| poisoned())?;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn delete(&self, collection: &str, key: &str) -> StoreResult<bool> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        Ok(collections
            .get_mut(collection)
            .map(|docs| docs.remove(key).is_some())
            .unwrap_or(false))
    }

    async fn clear(&self, collection: &str) -> StoreResult<u64> {
        let mut collections = self.collections.write().map_err(|_| poisoned())?;
        Ok(collections
            .remove(collection)
            .map(|docs| docs.len() as u64)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn merge_overlays_top_level_fields() {
        let store = MemoryStore::new();
        store
            .set("status", "current", doc(json!({"city": "Austin", "isSleep": true})), false)
            .await
            .unwrap();
        store
            .set("status", "current", doc(json!({"city": "Dallas"})), true)
            .await
            .unwrap();

        let stored = store.get("status", "current").await.unwrap().unwrap();
        assert_eq!(stored["city"], "Dallas");
        assert_eq!(stored["isSleep"], true);
    }

    #[tokio::test]
    async fn set_without_merge_replaces() {
        let store = MemoryStore::new();
        store
            .set("cities", "1", doc(json!({"name": "Austin", "keywords": ["atx"]})), false)
            .await
            .unwrap();
        store
            .set("cities", "1", doc(json!({"name": "Austin"})), false)
            .await
            .unwrap();

        let stored = store.get("cities", "1").await.unwrap().unwrap();
        assert!(stored.get("keywords").is_none());
    }

    #[tokio::test]
    async fn list_is_key_ordered_and_clear_empties() {
        let store = MemoryStore::new();
        for key in ["b", "a", "c"] {
            store.set("posts", key, Document::new(), false).await.unwrap();
        }
        let keys: Vec<String> = store
            .list("posts")
            .await
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        assert!(store.delete("posts", "a").await.unwrap());
        assert!(!store.delete("posts", "a").await.unwrap());
        assert_eq!(store.clear("posts").await.unwrap(), 2);
        assert!(store.list("posts").await.unwrap().is_empty());
    }
}
